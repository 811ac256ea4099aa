// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The process-wide killlist and its `SIGTERM` handler (spec.md §4.4.1),
//! grounded in `pantsbuild-pants`' `process_execution::children::ManagedChild`
//! (process-group-leader spawning, `nix::sys::signal::kill` on the negated
//! pgid) and in the original Python's `_PROCS` / `_cleanup_children` /
//! `_add_to_killlist` (weak-reference bookkeeping, reinstalling the handler
//! on the first insertion into an empty set).
//!
//! Rust's `std::sync::Weak` has no finalizer callback (unlike Python's
//! `weakref.ref(obj, callback)`), so instead of the referent *telling* the
//! set to remove it on collection, dead entries are pruned lazily: the
//! `SIGTERM` handler skips `Weak`s that fail to upgrade, and `join()`
//! proactively calls `unregister` once a child is known to be gone. Net
//! effect is the same: the set stays proportional to the number of live
//! children.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// A process-group id, held long enough for the killlist to be able to
/// signal it even after the `Command` that spawned it has moved on.
pub struct ChildToken {
    pgid: Pid,
}

impl ChildToken {
    fn new(pgid: Pid) -> Arc<ChildToken> {
        Arc::new(ChildToken { pgid })
    }

    fn signal(&self) -> nix::Result<()> {
        // A negative pid signals the entire process group.
        signal::kill(Pid::from_raw(-self.pgid.as_raw()), Signal::SIGTERM)
    }
}

static KILLLIST: Mutex<Vec<Weak<ChildToken>>> = Mutex::new(Vec::new());
static HANDLER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Register a freshly-spawned child's process group with the killlist. On
/// the first insertion into an empty set, installs the `SIGTERM` handler.
pub fn register(pgid: Pid) -> Arc<ChildToken> {
    let token = ChildToken::new(pgid);
    let mut list = KILLLIST.lock();
    let was_empty = list.is_empty();
    list.push(Arc::downgrade(&token));
    drop(list);

    if was_empty {
        install_handler_once();
    }

    token
}

/// Remove a token from the killlist once its child has been reaped via
/// `join()`, keeping the set proportional to active children rather than
/// waiting for the next `SIGTERM` sweep to notice it is gone.
pub fn unregister(token: &Arc<ChildToken>) {
    let mut list = KILLLIST.lock();
    list.retain(|weak| match weak.upgrade() {
        Some(live) => !Arc::ptr_eq(&live, token),
        None => false,
    });
}

/// Deliver `SIGTERM` to a tracked child's process group on request, used by
/// `Command::terminate` rather than waiting for a host-wide signal.
pub fn terminate(token: &Arc<ChildToken>) -> nix::Result<()> {
    token.signal()
}

fn install_handler_once() {
    HANDLER_INSTALLED.get_or_init(|| {
        spawn_signal_thread();
    });
}

static TERMINATING: AtomicBool = AtomicBool::new(false);

fn spawn_signal_thread() {
    // signal-hook's `iterator` facility delivers signals on a dedicated
    // background thread rather than inside a real signal handler, so the
    // handler body below is free to take locks, log, and call
    // `std::process::exit` -- none of which are async-signal-safe and would
    // be unsound inside a raw `sigaction` handler.
    let mut signals =
        signal_hook::iterator::Signals::new([signal_hook::consts::SIGTERM])
            .expect("failed to register SIGTERM handler");
    std::thread::spawn(move || {
        for signum in signals.forever() {
            if TERMINATING.swap(true, Ordering::SeqCst) {
                continue;
            }
            log::warn!("received signal {signum}, terminating {} tracked child process group(s)", KILLLIST.lock().len());
            let snapshot: Vec<Weak<ChildToken>> = KILLLIST.lock().clone();
            for weak in snapshot {
                if let Some(token) = weak.upgrade() {
                    if let Err(e) = token.signal() {
                        log::debug!("failed to signal process group {:?}: {e}", token.pgid);
                    }
                }
            }
            std::process::exit(-signum);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister_shrinks_the_list() {
        let token = register(Pid::from_raw(999_999));
        assert!(KILLLIST.lock().len() >= 1);
        unregister(&token);
        assert!(KILLLIST
            .lock()
            .iter()
            .all(|w| !matches!(w.upgrade(), Some(ref t) if Arc::ptr_eq(t, &token))));
    }

    #[test]
    fn dropping_the_strong_ref_lets_the_weak_one_die() {
        let token = register(Pid::from_raw(999_998));
        let weak = Arc::downgrade(&token);
        drop(token);
        assert!(weak.upgrade().is_none());
    }
}
