// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The pretty-printer behind `impl Display for Command` (spec.md §6):
//! deterministic, line-oriented, grounded in the original Python's
//! `__str__` delegating to `atomicpp.pformat` (an argv line followed by one
//! binding per line) but with its own stable rendering rather than a literal
//! port, since the distilled spec defers the exact format to this crate.

use std::collections::BTreeMap;
use std::fmt;

use crate::slot::{SlotKey, SlotValue};

pub fn write_command(
    f: &mut fmt::Formatter<'_>,
    argv_template: &[String],
    slots: &BTreeMap<SlotKey, SlotValue>,
) -> fmt::Result {
    writeln!(f, "{}", argv_template.join(" "))?;
    for (key, value) in slots {
        writeln!(f, "  {key} = {}", format_value(value))?;
    }
    Ok(())
}

fn format_value(value: &SlotValue) -> String {
    match value {
        SlotValue::Path(p) => p.display().to_string(),
        SlotValue::Pipe => "PIPE".to_string(),
        SlotValue::Upstream(cmd) => format!("<upstream: {}>", cmd.executables().iter().next().map(String::as_str).unwrap_or("?")),
        SlotValue::Check(_) => "<callable>".to_string(),
    }
}
