// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A child process spawned as the leader of its own process group, so that
//! a single signal delivered to `-pgid` reaches it and every descendant it
//! forks (shell wrappers, etc). Grounded in `pantsbuild-pants`'
//! `process_execution::children::ManagedChild::spawn`, which does the same
//! `setsid()`-in-`pre_exec` trick; unlike that type, this one does not own a
//! graceful-shutdown escalation policy (see SPEC_FULL.md's note on why that
//! behavior was not carried over).

use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use nix::unistd::Pid;

pub struct ManagedChild {
    pub child: Child,
    pub pgid: Pid,
}

impl ManagedChild {
    /// Spawn `command`, making the new process a session (and therefore
    /// process group) leader before it execs.
    pub fn spawn(mut command: Command) -> std::io::Result<ManagedChild> {
        // Safety: `setsid` is async-signal-safe and touches no state shared
        // with the parent; it is the only thing that runs between fork and
        // exec here.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_pgid| ())
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }
        let child = command.spawn()?;
        let pgid = Pid::from_raw(child.id() as i32);
        Ok(ManagedChild { child, pgid })
    }
}
