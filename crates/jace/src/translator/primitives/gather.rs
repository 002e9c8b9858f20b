use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, MappedTasklet, Memlet, StateId, Subscript};
use crate::translator::mapped::SCALAR_ITERATOR;
use crate::translator::{PrimitiveTranslator, TranslationBuilder};

const PROMISE_IN_BOUNDS: &str = "promise_in_bounds";

/// `gather`: extracts patches of `slice_sizes` from the source array at start positions
/// read from the index array.
///
/// One map iterates over the batch dimensions of the index array and over the
/// non-collapsed slice dimensions. The tasklet receives the whole source array and
/// indexes it with the gathered start positions, so only `promise_in_bounds` is accepted.
pub struct GatherTranslator;

impl PrimitiveTranslator for GatherTranslator {
    fn primitive(&self) -> &str {
        "gather"
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        let [Some(src_name), Some(idx_name)] = in_names else {
            return Err(JaceError::unsupported(
                "gather needs exactly a source and an index array",
            ));
        };
        let out_name = &out_names[0];
        let out_shape = eqn.outvars[0].shape();
        let src_shape = eqn.invars[0].shape();
        let idx_shape = eqn.invars[1].shape();

        let offset_dims = eqn.params.usizes("offset_dims")?;
        let collapsed = eqn.params.usizes("collapsed_slice_dims")?;
        let start_index_map = eqn.params.usizes("start_index_map")?;
        let slice_sizes = eqn.params.usizes("slice_sizes")?;
        let mode = eqn.params.str("mode")?;
        if mode != PROMISE_IN_BOUNDS {
            return Err(JaceError::unsupported(format!("gather mode '{mode}'")));
        }
        if idx_shape.last() != Some(&start_index_map.len()) {
            return Err(JaceError::invariant(format!(
                "index array {idx_shape:?} does not end in {} start indices",
                start_index_map.len()
            )));
        }
        if slice_sizes.len() != src_shape.len() {
            return Err(JaceError::invariant(format!(
                "slice_sizes {slice_sizes:?} do not match the source rank {}",
                src_shape.len()
            )));
        }

        let batch_dims: Vec<usize> = (0..out_shape.len())
            .filter(|d| !offset_dims.contains(d))
            .collect();
        if batch_dims.len() + 1 != idx_shape.len() {
            return Err(JaceError::invariant(format!(
                "expected an index array of rank {}, got {}",
                batch_dims.len() + 1,
                idx_shape.len()
            )));
        }
        let src_dims_with_map: Vec<usize> = (0..slice_sizes.len())
            .filter(|d| !collapsed.contains(d))
            .collect();
        if src_dims_with_map.len() != offset_dims.len() {
            return Err(JaceError::invariant(
                "every non-collapsed slice dimension needs an offset dimension",
            ));
        }

        // Source access: plain map index, gathered start, or gathered start plus map index.
        let mut src_access: Vec<String> = Vec::with_capacity(slice_sizes.len());
        let mut slice_ranges: Vec<MapRange> = Vec::new();
        for (dim, &size) in slice_sizes.iter().enumerate() {
            let gathered = start_index_map.contains(&dim);
            if !gathered {
                if size != src_shape[dim] {
                    return Err(JaceError::unsupported(format!(
                        "partial slice of size {size} in non-indexed dimension {dim}"
                    )));
                }
                slice_ranges.push(MapRange::new(format!("__i{dim}"), 0, size as i64));
                src_access.push(format!("__i{dim}"));
            } else if collapsed.contains(&dim) {
                src_access.push(format!("__gather_{dim}"));
            } else {
                slice_ranges.push(MapRange::new(format!("__i{dim}"), 0, size as i64));
                src_access.push(format!("__gather_{dim} + __i{dim}"));
            }
        }

        let patch_vars: Vec<String> = batch_dims
            .iter()
            .map(|bd| format!("__i{out_name}_gather{bd}"))
            .collect();
        let patch_ranges: Vec<MapRange> = patch_vars
            .iter()
            .zip(idx_shape)
            .map(|(var, &extent)| MapRange::new(var.clone(), 0, extent as i64))
            .collect();

        let mut inputs = BTreeMap::from([(
            "__arr".to_string(),
            Memlet::new(
                src_name,
                src_shape
                    .iter()
                    .map(|&extent| Subscript::Range {
                        start: 0,
                        end: extent as i64,
                    })
                    .collect(),
            ),
        )]);
        for (i, dim) in start_index_map.iter().enumerate() {
            let mut index: Vec<IndexExpr> =
                patch_vars.iter().cloned().map(IndexExpr::symbol).collect();
            index.push(IndexExpr::constant(i as i64));
            inputs.insert(format!("__gather_{dim}"), Memlet::element(idx_name, index));
        }

        let mut out_index = Vec::with_capacity(out_shape.len());
        let mut mapped_src_dims = src_dims_with_map.iter();
        for dim in 0..out_shape.len() {
            if let Some(pos) = batch_dims.iter().position(|&bd| bd == dim) {
                out_index.push(IndexExpr::symbol(patch_vars[pos].clone()));
            } else {
                let src_dim = mapped_src_dims.next().ok_or_else(|| {
                    JaceError::invariant("more offset dimensions than mapped source dimensions")
                })?;
                out_index.push(IndexExpr::symbol(format!("__i{src_dim}")));
            }
        }

        let mut ranges: Vec<MapRange> = patch_ranges.into_iter().chain(slice_ranges).collect();
        if ranges.len() != out_shape.len() {
            return Err(JaceError::invariant(format!(
                "gather map has {} dimensions for an output of rank {}",
                ranges.len(),
                out_shape.len()
            )));
        }
        if ranges.is_empty() {
            ranges.push(MapRange::new(SCALAR_ITERATOR, 0, 1));
            out_index.push(IndexExpr::constant(0));
        }

        let tasklet = MappedTasklet {
            label: format!("_gather_map_{out_name}"),
            ranges,
            inputs,
            dynamic_inputs: BTreeMap::new(),
            code: format!("__out = __arr[{}]", src_access.join(", ")),
            outputs: BTreeMap::from([("__out".to_string(), Memlet::element(out_name, out_index))]),
        };
        builder
            .sdfg_mut()?
            .state_mut(eqn_state)
            .add_mapped_tasklet(tasklet);
        Ok(None)
    }
}
