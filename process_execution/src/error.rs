// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The error taxonomy of spec.md §7, realized as a `thiserror`-derived enum.

use std::path::PathBuf;

use thiserror::Error;

/// A violation caught at construction time: the command could never have
/// been run, regardless of the temp root it is eventually pointed at.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    #[error("empty command in Command::new")]
    EmptyArgv,

    #[error("argument key '{0}' has no suffix after its prefix")]
    EmptySuffix(String),

    #[error("slot '{key}' has an invalid prefix (expected one of IN_, TEMP_IN_, OUT_, TEMP_OUT_, EXEC_, AUX_, CHECK_)")]
    InvalidPrefix { key: String },

    #[error("{pipe} must be specified at most once (with or without TEMP_), but both '{pipe}' and 'TEMP_{pipe}' were given")]
    DuplicatePipe { pipe: &'static str },

    #[error("same basename ({basename}) is declared for multiple output slots: {slots}")]
    DuplicateOutputBasename { basename: String, slots: String },

    #[error("'{key}' must be a string path or Command::PIPE, not a {found}")]
    BadStdoutType { key: String, found: &'static str },

    #[error("'{key}' must be a string path or an upstream Command, not a {found}")]
    BadStdinType { key: String, found: &'static str },

    #[error("'CHECK_{suffix}' must be a callable")]
    CheckNotCallable { suffix: String },

    #[error("'{key}' must be a string path, not a {found}")]
    BadPathType { key: String, found: &'static str },

    #[error("'{key}' cannot contain a directory component: {value:?}")]
    TempHasDirectoryComponent { key: String, value: PathBuf },

    #[error("error building argv: call = {argv:?}, placeholder '{placeholder}' was not given a value")]
    MissingPlaceholder {
        argv: Vec<String>,
        placeholder: String,
    },
}

/// A violation of the run → join → commit protocol, or of the commit-time
/// filesystem contract.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("calling 'run' on a command that is already running or has already run")]
    AlreadyRan,

    #[error("'{0}' requires the command to have been started with run() first")]
    NotRunning(&'static str),

    #[error("attempting to commit a command before it has completed (call join() first)")]
    NotReady,

    #[error("upstream command has no live stdout pipe to chain (not running, OUT_STDOUT was not declared PIPE, or it was already consumed)")]
    NoStdoutPipe,

    #[error("mismatch between the temp root passed to run() and the one passed to commit(): {0}")]
    TempRootMismatch(PathBuf),

    #[error("expected files not created: {0}")]
    MissingExpectedOutputs(String),

    #[error("commit() called on a command that has already been committed")]
    AlreadyCommitted,
}

/// Top-level error type surfaced to callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("failed to launch process: {0}")]
    Exec(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
