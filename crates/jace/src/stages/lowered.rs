use std::fmt;
use std::sync::Arc;

use crate::backend::SdfgBackend;
use crate::cache::{CallKey, StageId, StageKey};
use crate::error::{JaceError, JaceResult};
use crate::optimization::{get_active_compiler_options, jace_optimize, CompilerOptions};
use crate::sdfg::Sdfg;
use crate::translator::{compile_jaxpr_sdfg, TranslatedJaxprSdfg};

use super::{compilation_cache, JaceCompiled};

/// The computation as a finalized SDFG.
///
/// The graph is never modified after lowering; [`JaceLowered::compile`] optimizes a copy.
pub struct JaceLowered {
    id: StageId,
    tsdfg: TranslatedJaxprSdfg,
    backend: Arc<dyn SdfgBackend>,
}

impl JaceLowered {
    pub(crate) fn new(tsdfg: TranslatedJaxprSdfg, backend: Arc<dyn SdfgBackend>) -> Self {
        Self {
            id: StageId::fresh(),
            tsdfg,
            backend,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    /// Optimizes and compiles the graph.
    ///
    /// `options` is merged over the active compiler options; the merged set is what the
    /// result is cached under.
    pub fn compile(&self, options: Option<&CompilerOptions>) -> JaceResult<Arc<JaceCompiled>> {
        let options = get_active_compiler_options(options);
        let key = StageKey::new(self.id, CallKey::Options(options.clone()));
        compilation_cache().get_or_try_insert_with(key, || {
            let mut tsdfg = self.tsdfg.clone();
            jace_optimize(&mut tsdfg, self.backend.as_ref(), &options)?;
            let compiled = compile_jaxpr_sdfg(&tsdfg, self.backend.as_ref())?;
            Ok(Arc::new(JaceCompiled::new(compiled, options)))
        })
    }

    /// The lowered graph; `dialect` must be `None` or `"SDFG"`.
    pub fn compiler_ir(&self, dialect: Option<&str>) -> JaceResult<&TranslatedJaxprSdfg> {
        match dialect {
            None => Ok(&self.tsdfg),
            Some(dialect) if dialect.eq_ignore_ascii_case("sdfg") => Ok(&self.tsdfg),
            Some(dialect) => Err(JaceError::unsupported(format!(
                "unknown dialect '{dialect}'"
            ))),
        }
    }

    pub fn as_sdfg(&self) -> &Sdfg {
        self.tsdfg.sdfg()
    }

    pub fn as_text(&self) -> String {
        self.tsdfg.to_string()
    }

    pub fn as_html(&self) -> String {
        self.tsdfg.sdfg().to_html()
    }
}

impl fmt::Debug for JaceLowered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JaceLowered")
            .field("id", &self.id)
            .field("sdfg", &self.tsdfg.sdfg().name())
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}
