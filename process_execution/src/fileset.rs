// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The File-Set Index (spec.md §4.3): read-only sets consumed by the
//! scheduler for dependency tracking, computed once at construction time
//! (mirroring the original's `_build_files_map`, which fills these sets in
//! `__init__` rather than recomputing them per access).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::slot::{CheckFn, Scope, SlotKey, SlotKind, SlotValue};

#[derive(Debug, Clone, Default)]
pub struct FileSetIndex {
    pub input_files: BTreeSet<PathBuf>,
    pub output_files: BTreeSet<PathBuf>,
    pub executables: BTreeSet<String>,
    pub auxiliary_files: BTreeSet<PathBuf>,
    pub expected_temp_files: BTreeSet<String>,
    pub optional_temp_files: BTreeSet<String>,
    pub requirements: Vec<CheckFn>,
}

pub fn build(argv0: &str, slots: &BTreeMap<SlotKey, SlotValue>) -> FileSetIndex {
    let mut index = FileSetIndex {
        executables: BTreeSet::from([argv0.to_string()]),
        ..Default::default()
    };

    for (key, value) in slots {
        match (key.kind, key.scope, value) {
            // TEMP_IN_* and TEMP_OUT_* path values are not part of
            // input_files/output_files: they do not create dependencies or
            // destinations in the wider graph.
            (SlotKind::In, Scope::Final, SlotValue::Path(p)) => {
                index.input_files.insert(p.clone());
            }
            (SlotKind::Out, Scope::Final, SlotValue::Path(p)) => {
                index.output_files.insert(p.clone());
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    index.expected_temp_files.insert(name.to_string());
                }
            }
            (SlotKind::Exec, _, SlotValue::Path(p)) => {
                index.executables.insert(p.display().to_string());
            }
            (SlotKind::Aux, _, SlotValue::Path(p)) => {
                index.auxiliary_files.insert(p.clone());
            }
            (SlotKind::Check, _, SlotValue::Check(f)) => {
                index.requirements.push(f.clone());
            }
            (SlotKind::Out, Scope::Temp, SlotValue::Path(p)) => {
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    index.optional_temp_files.insert(name.to_string());
                }
            }
            _ => {}
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Scope;
    use std::path::Path;

    #[test]
    fn classifies_slots_by_kind_and_scope() {
        let mut slots = BTreeMap::new();
        slots.insert(
            SlotKey { kind: SlotKind::In, scope: Scope::Final, suffix: "REF".into() },
            SlotValue::Path("/data/ref.fa".into()),
        );
        slots.insert(
            SlotKey { kind: SlotKind::Out, scope: Scope::Final, suffix: "BAM".into() },
            SlotValue::Path("/dest/out.bam".into()),
        );
        slots.insert(
            SlotKey { kind: SlotKind::Out, scope: Scope::Temp, suffix: "LOG".into() },
            SlotValue::Path("scratch.log".into()),
        );
        slots.insert(
            SlotKey { kind: SlotKind::In, scope: Scope::Temp, suffix: "SCRATCH".into() },
            SlotValue::Path("scratch.bin".into()),
        );

        let index = build("/usr/bin/align", &slots);

        assert!(index.input_files.contains(&PathBuf::from("/data/ref.fa")));
        assert!(index.output_files.contains(&PathBuf::from("/dest/out.bam")));
        assert!(index.expected_temp_files.contains("out.bam"));
        assert!(index.optional_temp_files.contains("scratch.log"));
        assert!(!index.input_files.contains(Path::new("scratch.bin")));
        assert_eq!(index.input_files.len(), 1);
        assert!(index.executables.contains("/usr/bin/align"));
    }
}
