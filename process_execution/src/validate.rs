// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Argument Spec Validator (spec.md §4.1). Enforces prefix grammar, type
//! constraints per slot kind, and uniqueness of pipe declarations and output
//! basenames, reporting the *first* violation in the order laid out in the
//! spec.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::SpecError;
use crate::resolve::{render_argv, resolve};
use crate::slot::{Scope, SlotKey, SlotKind, SlotValue};

/// A single raw keyword argument as supplied to `Command::new`, e.g.
/// `("OUT_FILE", RawValue::Path("/dest/out.txt".into()))`.
pub enum RawValue {
    Path(PathBuf),
    Pipe,
    Upstream(std::sync::Arc<crate::command::Command>),
    Check(crate::slot::CheckFn),
    /// `None` is accepted at the API boundary and dropped silently (rule 2),
    /// to ease optional wiring.
    Null,
}

const STREAMS: [&str; 3] = ["STDIN", "STDOUT", "STDERR"];

/// Runs validator rules 1-4 and constructs the typed slot map. Rule 5 (the
/// dry-run templating check) is run separately by the caller once it also
/// has the auto-filled stdout/stderr slots and the executable basename
/// available, since it needs the full, post-auto-fill slot set.
pub fn validate_and_build_slots(
    raw: Vec<(String, RawValue)>,
) -> Result<BTreeMap<SlotKey, SlotValue>, SpecError> {
    // Rule 1 runs first, over the raw key strings, ahead of any per-slot
    // parsing: spec.md §4.1 lists "applied in order", and a malformed,
    // unrelated slot elsewhere in the map must not preempt this check by
    // tripping rule 2 first. Matched by exact raw key rather than through
    // `SlotKey::parse` so a bogus sibling key can't short-circuit it.
    for stream in STREAMS {
        let prefix = if stream == "STDIN" { "IN_" } else { "OUT_" };
        let final_form = format!("{prefix}{stream}");
        let temp_form = format!("TEMP_{final_form}");
        let has_final = raw
            .iter()
            .any(|(k, v)| k == &final_form && !matches!(v, RawValue::Null));
        let has_temp = raw
            .iter()
            .any(|(k, v)| k == &temp_form && !matches!(v, RawValue::Null));
        if has_final && has_temp {
            return Err(SpecError::DuplicatePipe { pipe: stream });
        }
    }

    // Rule 2/3/4: parse, type-check, and drop nulls.
    let mut parsed: Vec<(SlotKey, SlotValue)> = Vec::new();
    for (raw_key, raw_value) in raw {
        if matches!(raw_value, RawValue::Null) {
            continue;
        }
        let key = SlotKey::parse(&raw_key)?;
        let value = typecheck(&key, raw_value)?;
        parsed.push((key, value));
    }

    // Output uniqueness: no two output slots (temp or final) may share a
    // basename.
    let mut by_basename: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in &parsed {
        if key.kind != SlotKind::Out {
            continue;
        }
        if let SlotValue::Path(p) = value {
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                by_basename
                    .entry(name.to_string())
                    .or_default()
                    .push(key.as_string());
            }
        }
    }
    for (basename, slots) in by_basename {
        if slots.len() > 1 {
            return Err(SpecError::DuplicateOutputBasename {
                basename,
                slots: slots.join(", "),
            });
        }
    }

    // Temp basename rule (rule 4, re-checked globally for defense in depth;
    // already enforced per-value in `typecheck`).
    for (key, value) in &parsed {
        if key.scope == Scope::Temp {
            if let SlotValue::Path(p) = value {
                if p.parent().map(|parent| !parent.as_os_str().is_empty()) == Some(true) {
                    return Err(SpecError::TempHasDirectoryComponent {
                        key: key.as_string(),
                        value: p.clone(),
                    });
                }
            }
        }
    }

    Ok(parsed.into_iter().collect())
}

fn typecheck(key: &SlotKey, value: RawValue) -> Result<SlotValue, SpecError> {
    let is_stdout = key.suffix == "STDOUT";
    let is_stdin = key.suffix == "STDIN";

    let result = match (key.kind, is_stdout, is_stdin, value) {
        (SlotKind::Out, true, _, RawValue::Path(p)) => SlotValue::Path(p),
        (SlotKind::Out, true, _, RawValue::Pipe) => SlotValue::Pipe,
        (SlotKind::Out, true, _, other) => {
            return Err(SpecError::BadStdoutType {
                key: key.as_string(),
                found: type_name_of(&other),
            })
        }
        (SlotKind::In, _, true, RawValue::Path(p)) => SlotValue::Path(p),
        (SlotKind::In, _, true, RawValue::Upstream(cmd)) => SlotValue::Upstream(cmd),
        (SlotKind::In, _, true, other) => {
            return Err(SpecError::BadStdinType {
                key: key.as_string(),
                found: type_name_of(&other),
            })
        }
        (SlotKind::Check, _, _, RawValue::Check(f)) => SlotValue::Check(f),
        (SlotKind::Check, _, _, _) => {
            return Err(SpecError::CheckNotCallable {
                suffix: key.suffix.clone(),
            })
        }
        (_, _, _, RawValue::Path(p)) => SlotValue::Path(p),
        (_, _, _, other) => {
            return Err(SpecError::BadPathType {
                key: key.as_string(),
                found: type_name_of(&other),
            })
        }
    };

    // Rule 4: TEMP_* path values may not contain a directory component.
    if key.scope == Scope::Temp {
        if let SlotValue::Path(p) = &result {
            if p.parent().map(|parent| !parent.as_os_str().is_empty()) == Some(true) {
                return Err(SpecError::TempHasDirectoryComponent {
                    key: key.as_string(),
                    value: p.clone(),
                });
            }
        }
    }

    Ok(result)
}

fn type_name_of(v: &RawValue) -> &'static str {
    match v {
        RawValue::Path(_) => "path",
        RawValue::Pipe => "PIPE sentinel",
        RawValue::Upstream(_) => "upstream Command",
        RawValue::Check(_) => "callable",
        RawValue::Null => "null",
    }
}

/// Rule 5: dry-run templating against an empty temp root, catching missing
/// or misspelled placeholder keys at construction time rather than at
/// launch.
pub fn dry_run_templating(
    argv_template: &[String],
    slots: &BTreeMap<SlotKey, SlotValue>,
    set_cwd: bool,
) -> Result<(), SpecError> {
    if argv_template.is_empty() || argv_template[0].is_empty() {
        return Err(SpecError::EmptyArgv);
    }
    let dry_root = PathBuf::from("");
    let resolved = resolve(slots, &dry_root, set_cwd);
    render_argv(argv_template, &resolved, &dry_root).map(|_| ())
}
