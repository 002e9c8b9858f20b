use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, MappedTasklet, Memlet, StateId};
use crate::translator::mapped::output_ranges;
use crate::translator::{MappedOperation, PrimitiveTranslator, TaskletTemplate, TranslationBuilder};

/// `slice` with unit strides: a copy whose input memlet is shifted by `start_indices`.
pub struct Slice;

impl MappedOperation for Slice {
    fn primitive(&self) -> &str {
        "slice"
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        _eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        Ok(TaskletTemplate::new("{in0}"))
    }

    fn make_input_memlets(
        &self,
        ranges: &[MapRange],
        in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<BTreeMap<String, Memlet>> {
        if !eqn.params.is_none("strides") {
            return Err(JaceError::unsupported("slice with non-unit strides"));
        }
        let Some(Some(name)) = in_names.first() else {
            return Err(JaceError::unsupported("slice of a literal"));
        };
        let starts = eqn.params.ints("start_indices")?;
        if starts.len() != eqn.invars[0].shape().len() {
            return Err(JaceError::invariant(format!(
                "start_indices {starts:?} do not match the operand rank {}",
                eqn.invars[0].shape().len()
            )));
        }
        let index = if starts.is_empty() {
            vec![IndexExpr::constant(0)]
        } else {
            ranges
                .iter()
                .zip(starts)
                .map(|(range, &start)| IndexExpr::symbol(range.param.clone()).plus(start))
                .collect()
        };
        Ok(BTreeMap::from([(
            "__in0".to_string(),
            Memlet::element(name, index),
        )]))
    }
}

/// `dynamic_slice`: a fixed-size window whose start indices are runtime values.
///
/// Each start index is either a literal, folded into the memlet, or a scalar array that
/// feeds a dynamic map input. Windows that run past the end are not clamped; reading
/// out of bounds is undefined.
pub struct DynamicSliceTranslator;

impl PrimitiveTranslator for DynamicSliceTranslator {
    fn primitive(&self) -> &str {
        "dynamic_slice"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        let Some(Some(src)) = in_names.first() else {
            return Err(JaceError::unsupported("dynamic_slice of a literal"));
        };
        let rank = eqn.invars[0].shape().len();
        if in_names.len() != rank + 1 {
            return Err(JaceError::invariant(format!(
                "dynamic_slice of a rank {rank} operand needs {rank} start indices, got {}",
                in_names.len() - 1
            )));
        }
        let out = &out_names[0];
        let (ranges, out_index) = output_ranges(eqn.outvars[0].shape());

        let mut dynamic_inputs = BTreeMap::new();
        let mut index = Vec::with_capacity(rank);
        for (dim, (start, atom)) in in_names[1..].iter().zip(&eqn.invars[1..]).enumerate() {
            let base = IndexExpr::symbol(ranges[dim].param.clone());
            let expr = match (start, atom.as_literal()) {
                (Some(start), _) => {
                    let symbol = format!("__jace_dynamic_map_range_{out}_{start}");
                    dynamic_inputs.insert(
                        symbol.clone(),
                        Memlet::element(start, vec![IndexExpr::constant(0)]),
                    );
                    base.plus_symbol(symbol)
                }
                (None, Some(lit)) => base.plus(lit.value().value().as_i64()),
                (None, None) => {
                    return Err(JaceError::invariant(format!(
                        "start index {dim} is neither an array nor a literal"
                    )));
                }
            };
            index.push(expr);
        }
        if index.is_empty() {
            index.push(IndexExpr::constant(0));
        }

        let tasklet = MappedTasklet {
            label: format!("dynamic_slice_{out}"),
            ranges,
            inputs: BTreeMap::from([("__in".to_string(), Memlet::element(src, index))]),
            dynamic_inputs,
            code: "__out = __in".to_string(),
            outputs: BTreeMap::from([("__out".to_string(), Memlet::element(out, out_index))]),
        };
        builder
            .sdfg_mut()?
            .state_mut(eqn_state)
            .add_mapped_tasklet(tasklet);
        Ok(None)
    }
}
