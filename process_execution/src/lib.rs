// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! An atomic external-command executor: runs a child process in a private
//! temp directory and publishes its declared outputs to their final
//! destinations only once the process has succeeded.

mod children;
mod commit;
mod display;
mod error;
mod fileset;
mod managed_child;
mod resolve;
mod slot;
mod validate;

mod command;

pub use command::Command;
pub use error::{Error, Result, SpecError, UsageError};
pub use slot::{CheckFn, SlotKind};
pub use validate::RawValue;
