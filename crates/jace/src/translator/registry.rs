//! Primitive translator registry.
//!
//! A [`PrimitiveTranslatorRegistry`] is a plain value mapping primitive names to
//! translators; the builder receives one explicitly. The process-wide active registry only
//! provides the default that `jit` snapshots when no registry is passed in. It starts out
//! holding every built-in translator.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::StateId;

use super::{primitives, PrimitiveTranslator, TranslationBuilder};

#[derive(Clone, Default)]
pub struct PrimitiveTranslatorRegistry {
    translators: HashMap<String, Arc<dyn PrimitiveTranslator>>,
}

impl PrimitiveTranslatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in translator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        primitives::register_builtin_translators(&mut registry);
        registry
    }

    /// Adds `translator`; replacing an existing entry requires `overwrite`.
    pub fn register(
        &mut self,
        translator: Arc<dyn PrimitiveTranslator>,
        overwrite: bool,
    ) -> JaceResult<()> {
        let primitive = translator.primitive().to_string();
        if !overwrite && self.translators.contains_key(&primitive) {
            return Err(JaceError::invariant(format!(
                "a translator for '{primitive}' is already registered, pass overwrite to replace it"
            )));
        }
        self.translators.insert(primitive, translator);
        Ok(())
    }

    pub fn get(&self, primitive: &str) -> Option<&Arc<dyn PrimitiveTranslator>> {
        self.translators.get(primitive)
    }

    pub fn contains(&self, primitive: &str) -> bool {
        self.translators.contains_key(primitive)
    }

    pub fn remove(&mut self, primitive: &str) -> Option<Arc<dyn PrimitiveTranslator>> {
        self.translators.remove(primitive)
    }

    /// Registered primitive names, sorted.
    pub fn primitives(&self) -> Vec<String> {
        let mut names: Vec<String> = self.translators.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }
}

impl fmt::Debug for PrimitiveTranslatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveTranslatorRegistry")
            .field("primitives", &self.primitives())
            .finish()
    }
}

type TranslateFn = dyn Fn(
        &mut TranslationBuilder,
        &[Option<String>],
        &mut Vec<String>,
        &Equation,
        StateId,
    ) -> JaceResult<Option<StateId>>
    + Send
    + Sync;

struct FnTranslator {
    primitive: String,
    body: Box<TranslateFn>,
}

impl PrimitiveTranslator for FnTranslator {
    fn primitive(&self) -> &str {
        &self.primitive
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        (self.body)(builder, in_names, out_names, eqn, eqn_state)
    }
}

/// Turns a closure into a translator for `primitive`; it is not registered anywhere.
pub fn make_primitive_translator<F>(
    primitive: impl Into<String>,
    body: F,
) -> Arc<dyn PrimitiveTranslator>
where
    F: Fn(
            &mut TranslationBuilder,
            &[Option<String>],
            &mut Vec<String>,
            &Equation,
            StateId,
        ) -> JaceResult<Option<StateId>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnTranslator {
        primitive: primitive.into(),
        body: Box::new(body),
    })
}

static ACTIVE_TRANSLATORS: OnceLock<RwLock<PrimitiveTranslatorRegistry>> = OnceLock::new();

fn active() -> &'static RwLock<PrimitiveTranslatorRegistry> {
    ACTIVE_TRANSLATORS.get_or_init(|| RwLock::new(PrimitiveTranslatorRegistry::with_builtins()))
}

/// Adds a translator to the process-wide active registry.
pub fn register_primitive_translator(
    translator: Arc<dyn PrimitiveTranslator>,
    overwrite: bool,
) -> JaceResult<()> {
    active()
        .write()
        .expect("primitive translator registry poisoned")
        .register(translator, overwrite)
}

/// Snapshot of the active registry; later changes to either side do not propagate.
pub fn get_registered_primitive_translators() -> PrimitiveTranslatorRegistry {
    active()
        .read()
        .expect("primitive translator registry poisoned")
        .clone()
}

/// Replaces the active registry and returns the one that was active before.
pub fn set_active_primitive_translators_to(
    registry: PrimitiveTranslatorRegistry,
) -> PrimitiveTranslatorRegistry {
    let mut guard = active()
        .write()
        .expect("primitive translator registry poisoned");
    std::mem::replace(&mut *guard, registry)
}
