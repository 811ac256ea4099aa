// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Atomic Commit Engine (spec.md §4.5): promotes a completed command's
//! declared outputs from its temp root to their final destinations, and
//! removes its declared optional temporaries. Kept free of `Command`'s
//! internals so the promotion/move logic is unit-testable on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::resolve::ResolvedPaths;
use crate::slot::{Scope, SlotKey, SlotKind, SlotValue};

/// Device+inode comparison (spec.md §4.5 step 2), not textual path
/// comparison -- two different paths can denote the same directory via
/// symlinks or bind mounts.
pub fn same_directory(a: &Path, b: &Path) -> std::io::Result<bool> {
    let stat_a = nix::sys::stat::stat(a).map_err(to_io_error)?;
    let stat_b = nix::sys::stat::stat(b).map_err(to_io_error)?;
    Ok(stat_a.st_dev == stat_b.st_dev && stat_a.st_ino == stat_b.st_ino)
}

fn to_io_error(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

/// `expected_temp_files - listdir(temp_root)` (spec.md §4.5 step 3): the
/// basenames that were supposed to materialize in the temp root but didn't.
pub fn missing_expected_files(
    temp_root: &Path,
    expected: &BTreeSet<String>,
) -> std::io::Result<Vec<String>> {
    if expected.is_empty() {
        return Ok(Vec::new());
    }
    let present: BTreeSet<String> = std::fs::read_dir(temp_root)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    Ok(expected.difference(&present).cloned().collect())
}

/// Promotes every `OUT_*` slot to its declared final path and best-effort
/// removes every `TEMP_OUT_*` slot (spec.md §4.5 step 4). `resolved` must
/// have been produced against the literal temp root (not the `set_cwd`
/// templating view) so paths here always point at real files on disk.
pub fn promote_outputs(
    slots: &BTreeMap<SlotKey, SlotValue>,
    resolved: &ResolvedPaths,
) -> Result<()> {
    for (key, value) in slots {
        if key.kind != SlotKind::Out {
            continue;
        }
        let SlotValue::Path(final_value) = value else {
            continue;
        };
        match key.scope {
            Scope::Final => {
                let from = resolved
                    .get(key)
                    .expect("every OUT_ path slot has a resolved temp-root location");
                move_file(from, final_value)?;
            }
            Scope::Temp => {
                let from = resolved
                    .get(key)
                    .expect("every TEMP_OUT_ path slot has a resolved temp-root location");
                match std::fs::remove_file(from) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
            }
        }
    }
    Ok(())
}

/// Rename within a filesystem; on `EXDEV` (crossing filesystems), fall back
/// to copy-then-unlink.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            std::fs::copy(from, to).map_err(Error::Io)?;
            std::fs::remove_file(from).map_err(Error::Io)?;
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_directory_true_for_the_same_path_twice() {
        let dir = tempfile::tempdir().unwrap();
        assert!(same_directory(dir.path(), dir.path()).unwrap());
    }

    #[test]
    fn same_directory_false_for_distinct_directories() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert!(!same_directory(a.path(), b.path()).unwrap());
    }

    #[test]
    fn missing_expected_files_reports_absent_basenames() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.txt"), b"ok").unwrap();
        let expected: BTreeSet<String> =
            ["present.txt".to_string(), "absent.txt".to_string()].into();
        let missing = missing_expected_files(dir.path(), &expected).unwrap();
        assert_eq!(missing, vec!["absent.txt".to_string()]);
    }

    #[test]
    fn move_file_renames_within_the_same_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"payload").unwrap();
        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }
}
