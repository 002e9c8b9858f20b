use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, MappedTasklet, Memlet, StateId};
use crate::translator::{PrimitiveTranslator, TranslationBuilder};

/// `concatenate` along `dimension`: one copy map per operand, all writing into the
/// same output at increasing offsets.
pub struct ConcatenateTranslator;

impl PrimitiveTranslator for ConcatenateTranslator {
    fn primitive(&self) -> &str {
        "concatenate"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        if in_names.iter().any(Option::is_none) {
            return Err(JaceError::unsupported("concatenate with literal inputs"));
        }
        let cat_dim = eqn.params.usize("dimension")?;
        let out = &out_names[0];
        if cat_dim >= eqn.outvars[0].shape().len() {
            return Err(JaceError::invariant(format!(
                "concatenation dimension {cat_dim} exceeds the output rank"
            )));
        }

        let mut already_copied = 0i64;
        let state = builder.sdfg_mut()?.state_mut(eqn_state);
        for (name, atom) in in_names.iter().flatten().zip(&eqn.invars) {
            let shape = atom.shape();
            let ranges: Vec<MapRange> = shape
                .iter()
                .enumerate()
                .map(|(d, &extent)| MapRange::new(format!("__dim{d}"), 0, extent as i64))
                .collect();
            let in_index: Vec<IndexExpr> = ranges
                .iter()
                .map(|r| IndexExpr::symbol(r.param.clone()))
                .collect();
            let mut out_index = in_index.clone();
            out_index[cat_dim] = out_index[cat_dim].clone().plus(already_copied);

            state.add_mapped_tasklet(MappedTasklet {
                label: format!("_concatenate_{out}_{name}"),
                ranges,
                inputs: BTreeMap::from([("__in".to_string(), Memlet::element(name, in_index))]),
                dynamic_inputs: BTreeMap::new(),
                code: "__out = __in".to_string(),
                outputs: BTreeMap::from([("__out".to_string(), Memlet::element(out, out_index))]),
            });
            already_copied += shape[cat_dim] as i64;
        }
        Ok(None)
    }
}
