// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `Command`: the Command Descriptor of spec.md §3, and the Process
//! Supervisor operations of §4.4 that move it through its lifecycle. Ties
//! together the validator, resolver, file-set index, and killlist modules;
//! grounded throughout in the original Python's `AtomicCmd` (`run`/`ready`/
//! `join`/`wait`/`terminate`/`commit`/`stdout`) and in `pantsbuild-pants`'
//! `ManagedChild` for process-group spawning.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::children::{self, ChildToken};
use crate::commit;
use crate::error::{Error, Result, UsageError};
use crate::fileset::{self, FileSetIndex};
use crate::managed_child::ManagedChild;
use crate::resolve::{self, ResolvedPaths};
use crate::slot::{CheckFn, Scope, SlotKey, SlotKind, SlotValue};
use crate::validate::{self, RawValue};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A descriptor's position in `Constructed -> Running -> Completed ->
/// Committed | Aborted` (spec.md §3). `Aborted` models the killlist's
/// host-wide `SIGTERM` path, which calls `std::process::exit` directly
/// rather than mutating any single descriptor's state -- it exists here so
/// the type mirrors the full lifecycle named by the data model, even though
/// normal operation never produces it.
enum RunState {
    Constructed,
    Running(RunningState),
    Completed(CompletedState),
    Committed,
    #[allow(dead_code)]
    Aborted,
}

struct RunningState {
    child: std::process::Child,
    token: Arc<ChildToken>,
    temp_root: PathBuf,
    stdout_pipe: Option<ChildStdout>,
}

struct CompletedState {
    exit_code: i32,
    temp_root: PathBuf,
}

/// An external command bound to a namespaced set of input/output/executable/
/// auxiliary/check slots, runnable exactly once against a chosen temp root.
pub struct Command {
    id: u64,
    argv_template: Vec<String>,
    set_cwd: bool,
    slots: std::collections::BTreeMap<SlotKey, SlotValue>,
    fileset: FileSetIndex,
    state: Mutex<RunState>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("argv_template", &self.argv_template)
            .field("set_cwd", &self.set_cwd)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::display::write_command(f, &self.argv_template, &self.slots)
    }
}

impl Command {
    /// The sentinel for declaring a stdout slot as a live pipe rather than a
    /// path, mirroring the original's `AtomicCmd.PIPE`.
    pub const PIPE: RawValue = RawValue::Pipe;

    /// Validates `raw_slots` against `argv_template`, auto-fills the
    /// standard-stream slots if the caller didn't, and dry-run templates the
    /// result -- all of spec.md §4.1, run once here rather than lazily.
    pub fn new(
        argv_template: Vec<String>,
        set_cwd: bool,
        raw_slots: Vec<(String, RawValue)>,
    ) -> Result<Arc<Command>> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let mut slots = validate::validate_and_build_slots(raw_slots)?;

        if argv_template.is_empty() || argv_template[0].is_empty() {
            return Err(crate::error::SpecError::EmptyArgv.into());
        }
        let argv0 = argv_template[0].clone();
        let exec_basename = Path::new(&argv0)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&argv0)
            .to_string();

        auto_fill_stream(&mut slots, &exec_basename, id, "STDOUT", "stdout");
        auto_fill_stream(&mut slots, &exec_basename, id, "STDERR", "stderr");

        validate::dry_run_templating(&argv_template, &slots, set_cwd)?;

        let fileset = fileset::build(&argv0, &slots);

        Ok(Arc::new(Command {
            id,
            argv_template,
            set_cwd,
            slots,
            fileset,
            state: Mutex::new(RunState::Constructed),
        }))
    }

    pub fn input_files(&self) -> &BTreeSet<PathBuf> {
        &self.fileset.input_files
    }

    pub fn output_files(&self) -> &BTreeSet<PathBuf> {
        &self.fileset.output_files
    }

    pub fn executables(&self) -> &BTreeSet<String> {
        &self.fileset.executables
    }

    pub fn auxiliary_files(&self) -> &BTreeSet<PathBuf> {
        &self.fileset.auxiliary_files
    }

    pub fn requirements(&self) -> &[CheckFn] {
        &self.fileset.requirements
    }

    pub fn expected_temp_files(&self) -> &BTreeSet<String> {
        &self.fileset.expected_temp_files
    }

    pub fn optional_temp_files(&self) -> &BTreeSet<String> {
        &self.fileset.optional_temp_files
    }

    /// spec.md §4.4: launches the child in its own process group against
    /// `temp_root`, wiring stdio per the declared slots.
    pub fn run(&self, temp_root: impl AsRef<Path>) -> Result<()> {
        let temp_root = temp_root.as_ref().to_path_buf();
        let mut state = self.state.lock();
        if !matches!(*state, RunState::Constructed) {
            return Err(UsageError::AlreadyRan.into());
        }

        // The physical view: stdio targets are files that live under
        // `temp_root` on disk, opened here in the parent's own cwd, before
        // any chdir the child might perform. This always uses the literal
        // temp root, regardless of `set_cwd` -- mirroring the original's
        // comment that pipe filenames "are always built relative to the
        // current directory, since these are opened before (possibly) CD'ing
        // to the temp directory."
        let physical = resolve::resolve(&self.slots, &temp_root, false);

        let stdin_stdio = self.build_stdin(&physical)?;
        let (stdout_stdio, stdout_is_pipe) = self.build_stream(SlotKind::Out, "STDOUT", &physical)?;
        let (stderr_stdio, _) = self.build_stream(SlotKind::Out, "STDERR", &physical)?;

        // The templating view: what the child itself sees on its argv,
        // which differs from the physical view exactly when `set_cwd` asks
        // the child to run with its cwd already inside the temp root.
        // `abspath(temp_root)` per spec.md §4.4 step 4: a plain syntactic
        // join onto the caller's cwd, not a symlink-resolving canonicalize --
        // the child should see the same path the caller passed to `run`, and
        // a temp root that isn't stat-able yet must not fail the spawn here.
        let argv_root = if self.set_cwd {
            PathBuf::new()
        } else {
            resolve::absolutize(&temp_root)
        };
        let templating = resolve::resolve(&self.slots, &argv_root, self.set_cwd);
        let argv = resolve::render_argv(&self.argv_template, &templating, &argv_root)?;

        let mut os_command = std::process::Command::new(&argv[0]);
        os_command.args(&argv[1..]);
        if self.set_cwd {
            os_command.current_dir(&temp_root);
        }
        if let Some(stdio) = stdin_stdio {
            os_command.stdin(stdio);
        }
        os_command.stdout(stdout_stdio);
        os_command.stderr(stderr_stdio);

        log::debug!(
            "command {}: spawning {:?} in {}",
            self.id,
            argv,
            temp_root.display()
        );

        let mut managed = ManagedChild::spawn(os_command).map_err(Error::Exec)?;
        let token = children::register(managed.pgid);
        let stdout_pipe = if stdout_is_pipe {
            managed.child.stdout.take()
        } else {
            None
        };

        log::debug!(
            "command {}: pid {} pgid {}",
            self.id,
            managed.child.id(),
            managed.pgid
        );

        *state = RunState::Running(RunningState {
            child: managed.child,
            token,
            temp_root,
            stdout_pipe,
        });
        Ok(())
    }

    fn build_stdin(&self, resolved: &ResolvedPaths) -> Result<Option<Stdio>> {
        let final_key = SlotKey {
            kind: SlotKind::In,
            scope: Scope::Final,
            suffix: "STDIN".to_string(),
        };
        let temp_key = SlotKey {
            kind: SlotKind::In,
            scope: Scope::Temp,
            suffix: "STDIN".to_string(),
        };
        let found = self
            .slots
            .get(&final_key)
            .map(|v| (&final_key, v))
            .or_else(|| self.slots.get(&temp_key).map(|v| (&temp_key, v)));
        let Some((key, value)) = found else {
            return Ok(None);
        };
        match value {
            SlotValue::Path(_) => {
                let path = resolved.get(key).expect("resolved stdin path");
                let file = std::fs::File::open(path).map_err(Error::Io)?;
                Ok(Some(Stdio::from(file)))
            }
            SlotValue::Upstream(upstream) => {
                let pipe = upstream.stdout().ok_or(UsageError::NoStdoutPipe)?;
                Ok(Some(Stdio::from(pipe)))
            }
            SlotValue::Pipe | SlotValue::Check(_) => {
                unreachable!("validator restricts IN_STDIN to a path or an upstream Command")
            }
        }
    }

    fn build_stream(
        &self,
        kind: SlotKind,
        suffix: &str,
        resolved: &ResolvedPaths,
    ) -> Result<(Stdio, bool)> {
        let final_key = SlotKey {
            kind,
            scope: Scope::Final,
            suffix: suffix.to_string(),
        };
        let temp_key = SlotKey {
            kind,
            scope: Scope::Temp,
            suffix: suffix.to_string(),
        };
        let (key, value) = self
            .slots
            .get(&final_key)
            .map(|v| (&final_key, v))
            .or_else(|| self.slots.get(&temp_key).map(|v| (&temp_key, v)))
            .expect("auto-fill guarantees a stdout/stderr slot always exists");
        match value {
            SlotValue::Pipe => Ok((Stdio::piped(), true)),
            SlotValue::Path(_) => {
                let path = resolved.get(key).expect("resolved stream path");
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(Error::Io)?;
                Ok((Stdio::from(file), false))
            }
            _ => unreachable!("validator restricts OUT_STDOUT/OUT_STDERR to a path or PIPE"),
        }
    }

    /// spec.md §4.4: non-blocking; true iff the child has exited. Reaps and
    /// records the exit code the first time it observes completion.
    pub fn ready(&self) -> Result<bool> {
        let mut state = self.state.lock();
        match &mut *state {
            RunState::Running(running) => match running.child.try_wait().map_err(Error::Io)? {
                Some(status) => {
                    let exit_code = exit_code_of(status);
                    let temp_root = running.temp_root.clone();
                    children::unregister(&running.token);
                    *state = RunState::Completed(CompletedState {
                        exit_code,
                        temp_root,
                    });
                    Ok(true)
                }
                None => Ok(false),
            },
            RunState::Completed(_) | RunState::Committed => Ok(true),
            RunState::Constructed | RunState::Aborted => Ok(false),
        }
    }

    /// spec.md §4.4: blocks until the child exits, returning the exit code
    /// wrapped in a single-element sequence so callers built against
    /// set-of-commands abstractions can treat a lone `Command` uniformly.
    pub fn join(&self) -> Result<Vec<i32>> {
        let mut state = self.state.lock();
        match &mut *state {
            RunState::Running(running) => {
                let status = running.child.wait().map_err(Error::Io)?;
                let exit_code = exit_code_of(status);
                let temp_root = running.temp_root.clone();
                children::unregister(&running.token);
                log::debug!("command {}: exited with code {exit_code}", self.id);
                *state = RunState::Completed(CompletedState {
                    exit_code,
                    temp_root,
                });
                Ok(vec![exit_code])
            }
            RunState::Completed(completed) => Ok(vec![completed.exit_code]),
            RunState::Constructed | RunState::Aborted | RunState::Committed => {
                Err(UsageError::NotRunning("join").into())
            }
        }
    }

    /// spec.md §4.4: convenience scalar form of `join`, for callers that
    /// don't need the set-of-commands sequence shape.
    pub fn wait(&self) -> Result<i32> {
        self.join().map(|codes| codes[0])
    }

    /// spec.md §4.4: best-effort, idempotent `SIGTERM` to the child's
    /// process group. Never errors: an already-dead target, or a command
    /// that was never run, is simply a no-op.
    pub fn terminate(&self) -> Result<()> {
        let state = self.state.lock();
        if let RunState::Running(running) = &*state {
            match children::terminate(&running.token) {
                Ok(()) => {}
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => log::debug!("command {}: terminate failed: {e}", self.id),
            }
        }
        Ok(())
    }

    /// spec.md §4.4: the live readable end of this command's stdout, if it
    /// declared `OUT_STDOUT`/`TEMP_OUT_STDOUT = PIPE` and is still running.
    /// Consumes the handle: a second call (or a call after the pipe has
    /// already been chained into a consumer's stdin) returns `None`.
    pub fn stdout(&self) -> Option<ChildStdout> {
        let mut state = self.state.lock();
        match &mut *state {
            RunState::Running(running) => running.stdout_pipe.take(),
            _ => None,
        }
    }

    /// spec.md §4.5: promotes this command's declared outputs from
    /// `temp_root` to their final destinations.
    pub fn commit(&self, temp_root: impl AsRef<Path>) -> Result<()> {
        let temp_root = temp_root.as_ref();
        let mut state = self.state.lock();

        let bound_temp_root = match &*state {
            RunState::Completed(completed) => completed.temp_root.clone(),
            RunState::Committed => return Err(UsageError::AlreadyCommitted.into()),
            RunState::Constructed | RunState::Running(_) | RunState::Aborted => {
                return Err(UsageError::NotReady.into())
            }
        };

        if !commit::same_directory(temp_root, &bound_temp_root).map_err(Error::Io)? {
            return Err(UsageError::TempRootMismatch(temp_root.to_path_buf()).into());
        }

        let missing = commit::missing_expected_files(temp_root, &self.fileset.expected_temp_files)
            .map_err(Error::Io)?;
        if !missing.is_empty() {
            return Err(UsageError::MissingExpectedOutputs(missing.join(", ")).into());
        }

        // The commit-time view (spec.md §4.2): always the literal temp
        // root, independent of `set_cwd`, since that's where files actually
        // live on disk.
        let resolved = resolve::resolve(&self.slots, temp_root, false);
        commit::promote_outputs(&self.slots, &resolved)?;

        log::info!("command {}: committed to {}", self.id, temp_root.display());
        *state = RunState::Committed;
        Ok(())
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

fn auto_fill_stream(
    slots: &mut std::collections::BTreeMap<SlotKey, SlotValue>,
    exec_basename: &str,
    id: u64,
    suffix: &str,
    extension: &str,
) {
    let final_key = SlotKey {
        kind: SlotKind::Out,
        scope: Scope::Final,
        suffix: suffix.to_string(),
    };
    let temp_key = SlotKey {
        kind: SlotKind::Out,
        scope: Scope::Temp,
        suffix: suffix.to_string(),
    };
    if slots.contains_key(&final_key) || slots.contains_key(&temp_key) {
        return;
    }
    let filename = format!("pipe_{exec_basename}_{id}.{extension}");
    slots.insert(temp_key, SlotValue::Path(PathBuf::from(filename)));
}
