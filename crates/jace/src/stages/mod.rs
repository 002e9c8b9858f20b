//! The staged jit pipeline.
//!
//! `jit` wraps a traceable function into a [`JaceWrapped`]. Lowering it for concrete
//! arguments traces the function, translates the jaxpr and finalizes the graph into a
//! [`JaceLowered`]. Compiling that optimizes a copy of the graph and hands it to the
//! backend, producing a [`JaceCompiled`] that can be called.
//!
//! Both transitions are memoized per stage type, see [`crate::cache`]. Stages handed out
//! by the caches are shared and immutable.

mod compiled;
mod lowered;
mod wrapped;

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::cache::{StageCache, COMPILE_EVENTS, LOWERING_EVENTS};

pub use compiled::JaceCompiled;
pub use lowered::JaceLowered;
pub use wrapped::JaceWrapped;

static LOWERING_CACHE: Lazy<StageCache<Arc<JaceLowered>>> =
    Lazy::new(|| StageCache::new("lowering", LOWERING_EVENTS));

static COMPILATION_CACHE: Lazy<StageCache<Arc<JaceCompiled>>> =
    Lazy::new(|| StageCache::new("compilation", COMPILE_EVENTS));

pub(crate) fn lowering_cache() -> &'static StageCache<Arc<JaceLowered>> {
    &LOWERING_CACHE
}

pub(crate) fn compilation_cache() -> &'static StageCache<Arc<JaceCompiled>> {
    &COMPILATION_CACHE
}

/// Drops every cached lowering and compilation result.
pub fn clear_translation_cache() {
    LOWERING_CACHE.clear();
    COMPILATION_CACHE.clear();
}

/// Number of entries in the lowering and the compilation cache.
pub fn translation_cache_sizes() -> (usize, usize) {
    (LOWERING_CACHE.len(), COMPILATION_CACHE.len())
}
