// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A small manual-test harness around `process_execution::Command`: reads a
//! JSON command description from stdin, runs it in a fresh (or caller-given)
//! temp directory, and optionally commits it. Grounded in
//! `pantsbuild-pants`' `process_executor` binary (`clap` + `env_logger`
//! wiring around a single library call), scaled down to this crate's single
//! descriptor rather than a remote execution request.
//!
//! Only `path` and `pipe` slot values are expressible in JSON; chaining two
//! commands together (`IN_STDIN` from an upstream `Command`) or `CHECK_*`
//! callables are library-only features this harness doesn't expose.

use std::collections::BTreeMap;
use std::io::Read;

use clap::Parser;
use serde::Deserialize;

use process_execution::{Command, RawValue};

#[derive(Parser)]
#[command(about = "Run a single atomic command described as JSON on stdin")]
struct Args {
    /// Directory to run in; created if it doesn't already exist. Defaults to
    /// a freshly-allocated temporary directory that is removed on exit.
    #[arg(long)]
    temp_dir: Option<std::path::PathBuf>,

    /// Promote declared outputs to their final destinations after a
    /// zero exit code.
    #[arg(long)]
    commit: bool,
}

#[derive(Deserialize)]
struct CommandSpec {
    argv: Vec<String>,
    #[serde(default)]
    set_cwd: bool,
    #[serde(default)]
    slots: BTreeMap<String, SlotSpec>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SlotSpec {
    Path { value: std::path::PathBuf },
    Pipe,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let spec: CommandSpec = serde_json::from_str(&input)?;

    let raw_slots = spec
        .slots
        .into_iter()
        .map(|(key, value)| {
            let raw = match value {
                SlotSpec::Path { value } => RawValue::Path(value),
                SlotSpec::Pipe => RawValue::Pipe,
            };
            (key, raw)
        })
        .collect();

    let command = Command::new(spec.argv, spec.set_cwd, raw_slots)?;
    log::info!("constructed:\n{command}");

    let (temp_dir, _guard);
    match args.temp_dir {
        Some(path) => {
            std::fs::create_dir_all(&path)?;
            temp_dir = path;
            _guard = None;
        }
        None => {
            let dir = tempfile::tempdir()?;
            temp_dir = dir.path().to_path_buf();
            _guard = Some(dir);
        }
    }

    command.run(&temp_dir)?;
    let exit_codes = command.join()?;
    log::info!("exited with {exit_codes:?}");

    if args.commit {
        if exit_codes != [0] {
            anyhow::bail!("refusing to commit: non-zero exit {exit_codes:?}");
        }
        command.commit(&temp_dir)?;
        log::info!("committed");
    }

    Ok(())
}
