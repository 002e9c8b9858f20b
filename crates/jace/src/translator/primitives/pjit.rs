use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::StateId;
use crate::translator::naming::sanitize_name;
use crate::translator::post_translation::add_nested_sdfg;
use crate::translator::{PrimitiveTranslator, TranslationBuilder};

/// `pjit`, a nested call: the callee is translated in its own context and embedded
/// into the equation state as a nested SDFG.
///
/// Sharding is not supported, so `in_shardings` and `out_shardings` must be absent or
/// `None`. `donated_invars`, `keep_unused` and `inline` are ignored.
pub struct PjitTranslator;

impl PrimitiveTranslator for PjitTranslator {
    fn primitive(&self) -> &str {
        "pjit"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        for key in ["in_shardings", "out_shardings"] {
            if !eqn.params.is_none(key) {
                return Err(JaceError::unsupported(format!("pjit with '{key}'")));
            }
        }
        let in_names: Vec<String> = in_names
            .iter()
            .cloned()
            .collect::<Option<_>>()
            .ok_or_else(|| JaceError::unsupported("literal inputs to pjit"))?;

        let nested = eqn.params.jaxpr("jaxpr")?;
        let pjit_name = match eqn.params.get("name") {
            Some(_) => eqn.params.str("name")?,
            None => "fun",
        };
        let sdfg_name = format!("pjit_{}__{}", sanitize_name(pjit_name), out_names.join("_"));

        let child = builder.translate(nested, Some(&sdfg_name))?;
        add_nested_sdfg(builder, eqn_state, &child, &in_names, out_names)?;
        Ok(None)
    }
}
