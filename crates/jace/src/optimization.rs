//! Compiler options and the optimization step run by `JaceLowered::compile`.
//!
//! Options are layered: a process-wide set of active options, initialized to
//! [`CompilerOptions::default_optimizations`], merged with whatever is passed to a single
//! `compile` call. Keys the core does not know travel in [`CompilerOptions::extra`] and
//! reach the backend untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::backend::SdfgBackend;
use crate::error::JaceResult;
use crate::translator::TranslatedJaxprSdfg;

/// Value of a backend specific option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

/// A partial or complete set of compiler options.
///
/// Every known option is an `Option<bool>`: `None` means "not set here" and is filled in
/// from the layer below when options are merged. Resolved option sets, as handed to
/// [`jace_optimize`], treat a remaining `None` as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_optimize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplify: Option<bool>,
    /// Keep transient buffers alive across calls of a compiled program.
    ///
    /// The core never reads it; it reaches [`SdfgBackend::optimize`] with the rest of the
    /// resolved options and backends without persistent storage ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_transients: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, OptionValue>,
}

impl CompilerOptions {
    /// Nothing set; merging it changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every optimization enabled, the initial active set.
    pub fn default_optimizations() -> Self {
        Self::all(true)
    }

    /// Every optimization disabled.
    pub fn no_optimizations() -> Self {
        Self::all(false)
    }

    fn all(value: bool) -> Self {
        Self {
            auto_optimize: Some(value),
            simplify: Some(value),
            persistent_transients: Some(value),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_auto_optimize(mut self, value: bool) -> Self {
        self.auto_optimize = Some(value);
        self
    }

    pub fn with_simplify(mut self, value: bool) -> Self {
        self.simplify = Some(value);
        self
    }

    pub fn with_persistent_transients(mut self, value: bool) -> Self {
        self.persistent_transients = Some(value);
        self
    }

    /// Adds an option the core does not interpret.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `self` overridden by every option that is set in `other`.
    pub fn merged_with(&self, other: &CompilerOptions) -> CompilerOptions {
        let mut merged = self.clone();
        merged.auto_optimize = other.auto_optimize.or(self.auto_optimize);
        merged.simplify = other.simplify.or(self.simplify);
        merged.persistent_transients = other.persistent_transients.or(self.persistent_transients);
        merged
            .extra
            .extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn auto_optimize_enabled(&self) -> bool {
        self.auto_optimize.unwrap_or(false)
    }

    pub fn simplify_enabled(&self) -> bool {
        self.simplify.unwrap_or(false)
    }

    pub fn persistent_transients_enabled(&self) -> bool {
        self.persistent_transients.unwrap_or(false)
    }

    /// Pretty JSON form, used in debug dumps.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Every optimization enabled.
pub static DEFAULT_OPTIMIZATIONS: Lazy<CompilerOptions> =
    Lazy::new(CompilerOptions::default_optimizations);

/// Every optimization disabled.
pub static NO_OPTIMIZATIONS: Lazy<CompilerOptions> = Lazy::new(CompilerOptions::no_optimizations);

static ACTIVE_OPTIONS: Lazy<RwLock<CompilerOptions>> =
    Lazy::new(|| RwLock::new(CompilerOptions::default_optimizations()));

/// The active options, overridden by `local` where it sets a value.
pub fn get_active_compiler_options(local: Option<&CompilerOptions>) -> CompilerOptions {
    let active = ACTIVE_OPTIONS
        .read()
        .expect("active compiler options poisoned")
        .clone();
    match local {
        Some(local) => active.merged_with(local),
        None => active,
    }
}

/// Merges `new` into the active options and returns the previous active set.
pub fn update_active_compiler_options(new: &CompilerOptions) -> CompilerOptions {
    let mut active = ACTIVE_OPTIONS
        .write()
        .expect("active compiler options poisoned");
    let previous = active.clone();
    *active = previous.merged_with(new);
    previous
}

/// Replaces the active options and returns the previous active set.
pub fn set_active_compiler_options(options: CompilerOptions) -> CompilerOptions {
    let mut active = ACTIVE_OPTIONS
        .write()
        .expect("active compiler options poisoned");
    std::mem::replace(&mut *active, options)
}

/// Restores the active options it replaced when dropped.
#[must_use = "the previous options are restored as soon as the guard is dropped"]
pub struct CompilerOptionsGuard {
    previous: Option<CompilerOptions>,
}

impl Drop for CompilerOptionsGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_active_compiler_options(previous);
        }
    }
}

/// Merges `options` into the active options until the returned guard is dropped.
pub fn temporary_compiler_options(options: &CompilerOptions) -> CompilerOptionsGuard {
    CompilerOptionsGuard {
        previous: Some(update_active_compiler_options(options)),
    }
}

/// Optimizes `tsdfg` in place according to the resolved `options`.
///
/// The caller owns `tsdfg`; the compile stage always passes a deep copy of the lowered
/// graph. `auto_optimize` is left to the backend hook, which sees the whole option set.
pub fn jace_optimize(
    tsdfg: &mut TranslatedJaxprSdfg,
    backend: &dyn SdfgBackend,
    options: &CompilerOptions,
) -> JaceResult<()> {
    if options.simplify_enabled() {
        let removed = tsdfg.sdfg_mut().simplify();
        log::debug!(
            "simplified SDFG '{}': {removed} states removed",
            tsdfg.sdfg().name()
        );
    }
    backend.optimize(tsdfg.sdfg_mut(), options)?;
    tsdfg.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unset_values() {
        let base = CompilerOptions::default_optimizations().with_extra("unroll", 4);
        let local = CompilerOptions::new()
            .with_simplify(false)
            .with_extra("target", "host");
        let merged = base.merged_with(&local);
        assert!(merged.auto_optimize_enabled());
        assert!(!merged.simplify_enabled());
        assert_eq!(merged.extra.get("unroll"), Some(&OptionValue::Int(4)));
        assert_eq!(
            merged.extra.get("target"),
            Some(&OptionValue::Str("host".into()))
        );
    }

    #[test]
    fn json_dump_skips_unset_keys() {
        let json = CompilerOptions::new().with_simplify(true).to_json();
        assert!(json.contains("\"simplify\": true"), "{json}");
        assert!(!json.contains("auto_optimize"), "{json}");
    }
}
