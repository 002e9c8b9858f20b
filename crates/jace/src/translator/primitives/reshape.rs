use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{Memlet, StateId};
use crate::translator::{PrimitiveTranslator, TranslationBuilder};

/// `reshape` as a direct copy between the two row-major layouts.
///
/// Permuting reshapes (`dimensions` set) are not supported.
pub struct ReshapeTranslator;

impl PrimitiveTranslator for ReshapeTranslator {
    fn primitive(&self) -> &str {
        "reshape"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        if !eqn.params.is_none("dimensions") {
            return Err(JaceError::unsupported("reshape with 'dimensions' set"));
        }
        let Some(Some(src)) = in_names.first() else {
            return Err(JaceError::unsupported("reshape of a literal"));
        };
        let src_desc = builder.array(src)?.clone();
        let dst_desc = builder.array(&out_names[0])?.clone();
        builder.sdfg_mut()?.state_mut(eqn_state).add_copy(
            Memlet::full(src, &src_desc),
            Memlet::full(&out_names[0], &dst_desc),
        );
        Ok(None)
    }
}
