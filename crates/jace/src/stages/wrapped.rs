use std::fmt;
use std::sync::Arc;

use crate::backend::create_backend;
use crate::cache::{CallDescriptor, CallKey, StageId, StageKey};
use crate::error::JaceResult;
use crate::jaxpr::Traceable;
use crate::translator::naming;
use crate::translator::post_translation::postprocess_jaxpr_sdfg;
use crate::translator::{PrimitiveTranslatorRegistry, TranslationBuilder};
use crate::value::{HostArray, Value};

use super::{lowering_cache, JaceLowered};

/// A function ready to be lowered and compiled.
///
/// Created by [`crate::jit`]. The registry and the backend name are fixed at creation;
/// later changes to the process-wide registry do not affect an existing wrapper.
pub struct JaceWrapped<F> {
    id: StageId,
    fun: F,
    name: Option<String>,
    translators: PrimitiveTranslatorRegistry,
    backend: String,
}

impl<F: Traceable> JaceWrapped<F> {
    pub(crate) fn new(
        fun: F,
        name: Option<String>,
        translators: PrimitiveTranslatorRegistry,
        backend: String,
    ) -> Self {
        Self {
            id: StageId::fresh(),
            fun,
            name,
            translators,
            backend,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    pub fn translators(&self) -> &PrimitiveTranslatorRegistry {
        &self.translators
    }

    /// Traces and translates the function for arguments shaped like `args`.
    ///
    /// Only the structure of the arguments matters: shape, dtype, strides and storage.
    /// Lowering again with structurally equal arguments returns the cached stage. Strides
    /// and storage are baked into the graph, the compiled program only accepts arguments
    /// laid out the same way.
    pub fn lower(&self, args: &[Value]) -> JaceResult<Arc<JaceLowered>> {
        let call = CallDescriptor::from_values(args)?;
        let key = StageKey::new(self.id, CallKey::Args(call.clone()));
        lowering_cache().get_or_try_insert_with(key, || self.lower_uncached(&call).map(Arc::new))
    }

    fn lower_uncached(&self, call: &CallDescriptor) -> JaceResult<JaceLowered> {
        log::debug!(
            "lowering {} for {} arguments ({:016x})",
            self.id,
            call.args().len(),
            call.fingerprint()
        );
        let jaxpr = self.fun.make_jaxpr(call.args())?;
        let mut builder = TranslationBuilder::new(self.translators.clone());
        let name = self.name.as_deref().map(naming::sanitize_name);
        let ctx = builder.translate(&jaxpr, name.as_deref())?;
        let tsdfg = postprocess_jaxpr_sdfg(ctx, call.args(), true)?;
        let backend = create_backend(&self.backend)?;
        Ok(JaceLowered::new(tsdfg, backend))
    }

    /// Lowers, compiles with the active compiler options and runs in one step.
    pub fn call(&self, args: &[Value]) -> JaceResult<Vec<HostArray>> {
        let lowered = self.lower(args)?;
        let compiled = lowered.compile(None)?;
        compiled.call(args)
    }
}

impl<F> fmt::Debug for JaceWrapped<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JaceWrapped")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("translators", &self.translators.len())
            .finish()
    }
}
