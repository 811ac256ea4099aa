// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The slot namespace: `[TEMP_]<KIND>_<suffix>`, elaborated into a typed
//! variant per the Design Notes ("Dynamic slot namespace → typed variant")
//! instead of being inspected by string prefix at every use site. String
//! keys are still the construction-time API (`Command::new` takes
//! `"IN_FOO"`-shaped keys), but everything past the validator deals in
//! `SlotKey`/`SlotValue`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::command::Command;
use crate::error::SpecError;

/// The `IN`/`OUT`/`EXEC`/`AUX`/`CHECK` direction encoded in a slot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKind {
    In,
    Out,
    Exec,
    Aux,
    Check,
}

impl SlotKind {
    fn as_str(self) -> &'static str {
        match self {
            SlotKind::In => "IN",
            SlotKind::Out => "OUT",
            SlotKind::Exec => "EXEC",
            SlotKind::Aux => "AUX",
            SlotKind::Check => "CHECK",
        }
    }
}

/// Whether a slot's value lives inside the temp root or at a final,
/// caller-chosen location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Final,
    Temp,
}

/// A parsed `[TEMP_]<KIND>_<suffix>` slot name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub kind: SlotKind,
    pub scope: Scope,
    pub suffix: String,
}

impl SlotKey {
    /// Parse a raw string key such as `"TEMP_OUT_STDOUT"` into its typed form.
    /// Rule 2 of §4.1: prefix must be one of the seven legal prefixes (`IN_`,
    /// `TEMP_IN_`, `OUT_`, `TEMP_OUT_`, `EXEC_`, `AUX_`, `CHECK_` — spec.md §3
    /// Invariants), suffix must be non-empty. `TEMP_` only combines with `IN`
    /// and `OUT`: `TEMP_EXEC_*`/`TEMP_AUX_*`/`TEMP_CHECK_*` are not among the
    /// seven and must be rejected rather than silently accepted as a third,
    /// unspecified scope for those kinds.
    pub fn parse(raw: &str) -> Result<SlotKey, SpecError> {
        let (scope, rest) = if let Some(rest) = raw.strip_prefix("TEMP_") {
            (Scope::Temp, rest)
        } else {
            (Scope::Final, raw)
        };

        let (kind, suffix) = [
            ("IN_", SlotKind::In),
            ("OUT_", SlotKind::Out),
            ("EXEC_", SlotKind::Exec),
            ("AUX_", SlotKind::Aux),
            ("CHECK_", SlotKind::Check),
        ]
        .into_iter()
        .find_map(|(prefix, kind)| rest.strip_prefix(prefix).map(|suffix| (kind, suffix)))
        .ok_or_else(|| SpecError::InvalidPrefix {
            key: raw.to_string(),
        })?;

        if scope == Scope::Temp && !matches!(kind, SlotKind::In | SlotKind::Out) {
            return Err(SpecError::InvalidPrefix {
                key: raw.to_string(),
            });
        }

        if suffix.is_empty() {
            return Err(SpecError::EmptySuffix(raw.to_string()));
        }

        Ok(SlotKey {
            kind,
            scope,
            suffix: suffix.to_string(),
        })
    }

    /// Reconstruct the original string form, e.g. for error messages.
    pub fn as_string(&self) -> String {
        let prefix = match self.scope {
            Scope::Temp => "TEMP_",
            Scope::Final => "",
        };
        format!("{prefix}{}_{}", self.kind.as_str(), self.suffix)
    }

}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// A callable check predicate, opaque to the core: stored, never invoked.
pub type CheckFn = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// The sentinel marking "leave stdout a live, readable pipe" rather than a
/// file on disk.
#[derive(Clone)]
pub enum SlotValue {
    Path(PathBuf),
    Pipe,
    /// Only legal for `IN_STDIN`/`TEMP_IN_STDIN`: stdin is fed from this
    /// upstream command's stdout.
    Upstream(Arc<Command>),
    Check(CheckFn),
}

impl fmt::Debug for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Path(p) => write!(f, "Path({p:?})"),
            SlotValue::Pipe => write!(f, "Pipe"),
            SlotValue::Upstream(cmd) => write!(f, "Upstream({cmd:?})"),
            SlotValue::Check(_) => write!(f, "Check(<callable>)"),
        }
    }
}

impl SlotValue {
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            SlotValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SlotValue::Path(_) => "path",
            SlotValue::Pipe => "PIPE sentinel",
            SlotValue::Upstream(_) => "upstream Command",
            SlotValue::Check(_) => "callable",
        }
    }
}

/// Convenience constructors mirroring how callers build up a slot map.
impl From<PathBuf> for SlotValue {
    fn from(p: PathBuf) -> Self {
        SlotValue::Path(p)
    }
}

impl From<&str> for SlotValue {
    fn from(s: &str) -> Self {
        SlotValue::Path(PathBuf::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_temp_prefixed_key() {
        let key = SlotKey::parse("TEMP_OUT_STDOUT").unwrap();
        assert_eq!(key.kind, SlotKind::Out);
        assert_eq!(key.scope, Scope::Temp);
        assert_eq!(key.suffix, "STDOUT");
    }

    #[test]
    fn parses_a_final_key_and_round_trips_through_as_string() {
        let key = SlotKey::parse("IN_REFERENCE").unwrap();
        assert_eq!(key.kind, SlotKind::In);
        assert_eq!(key.scope, Scope::Final);
        assert_eq!(key.as_string(), "IN_REFERENCE");
    }

    #[test]
    fn rejects_an_unrecognised_prefix() {
        assert!(matches!(
            SlotKey::parse("FOO_BAR"),
            Err(SpecError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn rejects_temp_scope_on_exec_aux_and_check_kinds() {
        for raw in ["TEMP_EXEC_FOO", "TEMP_AUX_FOO", "TEMP_CHECK_FOO"] {
            assert!(
                matches!(SlotKey::parse(raw), Err(SpecError::InvalidPrefix { .. })),
                "{raw} should not be a legal slot name"
            );
        }
    }

    #[test]
    fn rejects_an_empty_suffix() {
        assert!(matches!(SlotKey::parse("OUT_"), Err(SpecError::EmptySuffix(_))));
    }
}
