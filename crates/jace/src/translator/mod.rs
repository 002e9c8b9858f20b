//! Lowering of jaxprs into canonical SDFGs.
//!
//! [`TranslationBuilder`] walks an equation list once, keeps the variable map between the
//! two representations and hands every equation to the [`PrimitiveTranslator`] registered
//! for its primitive. The result is an unfinished [`TranslationContext`]; the functions in
//! [`post_translation`] turn it into a [`TranslatedJaxprSdfg`] with an explicit signature.

mod builder;
mod context;
mod mapped;
pub mod naming;
pub mod post_translation;
pub mod primitives;
mod registry;
mod template;
mod translated;

use crate::error::JaceResult;
use crate::jaxpr::Equation;
use crate::sdfg::StateId;

pub use builder::{TranslationBuilder, VarListOptions};
pub use context::TranslationContext;
pub use mapped::{MappedOperation, MappedTranslator};
pub use registry::{
    get_registered_primitive_translators, make_primitive_translator,
    register_primitive_translator, set_active_primitive_translators_to,
    PrimitiveTranslatorRegistry,
};
pub use template::TaskletTemplate;
pub use translated::{compile_jaxpr_sdfg, CompiledJaxprSdfg, TranslatedJaxprSdfg};

/// Lowers equations of one primitive kind.
pub trait PrimitiveTranslator: Send + Sync {
    /// Name of the primitive this translator handles.
    fn primitive(&self) -> &str;

    /// Emits the dataflow of `eqn` into `eqn_state`.
    ///
    /// `in_names` holds one entry per equation input, `None` for literals. A translator
    /// may replace entries of `out_names` if it also updates the variable map. Returning
    /// `Some(state)` makes `state` the new terminal state; returning `None` requires
    /// `eqn_state` to still be the terminal state.
    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>>;
}
