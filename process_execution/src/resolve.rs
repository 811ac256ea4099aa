// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Filename Resolver (spec.md §4.2): a pure function from a slot map and
//! a chosen temp root to a concrete path per slot, with no I/O of its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SpecError;
use crate::slot::{Scope, SlotKey, SlotKind, SlotValue};

/// `slot name -> concrete path` for every slot whose value is a path (or the
/// `PIPE`/upstream-command sentinels, left untouched).
#[derive(Debug, Clone, Default)]
pub struct ResolvedPaths {
    paths: BTreeMap<SlotKey, PathBuf>,
}

impl ResolvedPaths {
    pub fn get(&self, key: &SlotKey) -> Option<&PathBuf> {
        self.paths.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &PathBuf)> {
        self.paths.iter()
    }
}

/// Resolve every path-valued slot against `temp_root`, per the rules of
/// spec.md §4.2:
///
/// - `TEMP_DIR` -> `R` (not a declared slot here; callers needing it use
///   `temp_root` directly).
/// - A slot with `TEMP_` scope, or `OUT_` kind, holding a path -> `R /
///   basename(value)`.
/// - A slot with `IN_`/`AUX_` kind and a path value, when `R == ""` (set-cwd
///   mode) -> absolute path of `value`.
/// - Everything else -> unchanged.
///
/// `set_cwd` selects between passing the real temp root (`R`) or the empty
/// string (triggering the set-cwd absolutization rule) as described in
/// spec.md §4.4 step 4 ("root = "" if set_cwd else abspath(temp_root)").
pub fn resolve(
    slots: &BTreeMap<SlotKey, SlotValue>,
    temp_root: &Path,
    set_cwd: bool,
) -> ResolvedPaths {
    let root_for_rule: &Path = if set_cwd { Path::new("") } else { temp_root };
    let mut paths = BTreeMap::new();

    for (key, value) in slots {
        let Some(value_path) = value.as_path() else {
            continue;
        };

        let resolved = if key.scope == Scope::Temp || key.kind == SlotKind::Out {
            let basename = value_path
                .file_name()
                .expect("temp basename rule guarantees a bare filename");
            root_for_rule.join(basename)
        } else if root_for_rule.as_os_str().is_empty()
            && matches!(key.kind, SlotKind::In | SlotKind::Aux)
        {
            absolutize(value_path)
        } else {
            value_path.clone()
        };

        paths.insert(key.clone(), resolved);
    }

    ResolvedPaths { paths }
}

/// A plain syntactic absolutize (join onto the cwd if relative): no symlink
/// resolution, no requirement that any path component already exist on
/// disk, matching `os.path.abspath` rather than `realpath`/`canonicalize`.
pub(crate) fn absolutize(p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    }
}

/// Printf-style named placeholder substitution: `%(KEY)s` is replaced by the
/// resolved path (or `TEMP_DIR`'s root value) for `KEY`. Used both for the
/// dry-run templating at construction time and for the real argv built at
/// `run()` time.
pub fn render_argv(
    argv_template: &[String],
    resolved: &ResolvedPaths,
    temp_dir: &Path,
) -> Result<Vec<String>, SpecError> {
    argv_template
        .iter()
        .map(|template| render_one(template, resolved, temp_dir, argv_template))
        .collect()
}

fn render_one(
    template: &str,
    resolved: &ResolvedPaths,
    temp_dir: &Path,
    full_argv: &[String],
) -> Result<String, SpecError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let close = after_open.find(")s").ok_or_else(|| SpecError::MissingPlaceholder {
            argv: full_argv.to_vec(),
            placeholder: template.to_string(),
        })?;
        let name = &after_open[..close];
        let value = if name == "TEMP_DIR" {
            temp_dir.display().to_string()
        } else {
            let key =
                crate::slot::SlotKey::parse(name).map_err(|_| SpecError::MissingPlaceholder {
                    argv: full_argv.to_vec(),
                    placeholder: name.to_string(),
                })?;
            resolved
                .get(&key)
                .ok_or_else(|| SpecError::MissingPlaceholder {
                    argv: full_argv.to_vec(),
                    placeholder: name.to_string(),
                })?
                .display()
                .to_string()
        };
        out.push_str(&value);
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotValue;
    use std::collections::BTreeMap;

    fn key(kind: SlotKind, scope: Scope, suffix: &str) -> SlotKey {
        SlotKey {
            kind,
            scope,
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn temp_and_out_slots_join_against_the_given_root() {
        let mut slots = BTreeMap::new();
        slots.insert(
            key(SlotKind::Out, Scope::Final, "FILE"),
            SlotValue::Path("out.txt".into()),
        );
        slots.insert(
            key(SlotKind::In, Scope::Temp, "SCRATCH"),
            SlotValue::Path("scratch.bin".into()),
        );

        let resolved = resolve(&slots, Path::new("/tmp/root"), false);

        assert_eq!(
            resolved.get(&key(SlotKind::Out, Scope::Final, "FILE")).unwrap(),
            &PathBuf::from("/tmp/root/out.txt")
        );
        assert_eq!(
            resolved.get(&key(SlotKind::In, Scope::Temp, "SCRATCH")).unwrap(),
            &PathBuf::from("/tmp/root/scratch.bin")
        );
    }

    #[test]
    fn in_and_aux_paths_are_absolutized_only_in_set_cwd_mode() {
        let mut slots = BTreeMap::new();
        slots.insert(
            key(SlotKind::In, Scope::Final, "REF"),
            SlotValue::Path("ref.fa".into()),
        );

        let not_set_cwd = resolve(&slots, Path::new("/tmp/root"), false);
        assert_eq!(
            not_set_cwd.get(&key(SlotKind::In, Scope::Final, "REF")).unwrap(),
            &PathBuf::from("ref.fa")
        );

        let set_cwd = resolve(&slots, Path::new("/tmp/root"), true);
        assert!(set_cwd
            .get(&key(SlotKind::In, Scope::Final, "REF"))
            .unwrap()
            .is_absolute());
    }

    #[test]
    fn render_argv_substitutes_named_placeholders() {
        let mut slots = BTreeMap::new();
        slots.insert(
            key(SlotKind::Out, Scope::Final, "FILE"),
            SlotValue::Path("out.txt".into()),
        );
        let resolved = resolve(&slots, Path::new("/tmp/root"), false);

        let argv = render_argv(
            &["echo".to_string(), "%(OUT_FILE)s".to_string()],
            &resolved,
            Path::new("/tmp/root"),
        )
        .unwrap();

        assert_eq!(argv, vec!["echo".to_string(), "/tmp/root/out.txt".to_string()]);
    }

    #[test]
    fn render_argv_reports_missing_placeholders() {
        let resolved = resolve(&BTreeMap::new(), Path::new("/tmp/root"), false);
        let err = render_argv(&["%(OUT_MISSING)s".to_string()], &resolved, Path::new("/tmp/root"))
            .unwrap_err();
        assert!(matches!(err, SpecError::MissingPlaceholder { .. }));
    }

    #[test]
    fn render_argv_preserves_multibyte_characters_around_placeholders() {
        let resolved = resolve(&BTreeMap::new(), Path::new("/tmp/root"), false);
        let argv = render_argv(
            &["caf\u{e9}-%(TEMP_DIR)s-\u{2603}".to_string()],
            &resolved,
            Path::new("/tmp/root"),
        )
        .unwrap();
        assert_eq!(argv, vec!["caf\u{e9}-/tmp/root-\u{2603}".to_string()]);
    }
}
