use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, Memlet};
use crate::translator::{MappedOperation, TaskletTemplate};

/// `broadcast_in_dim`: a copy whose input memlet only follows the mapped dimensions.
///
/// Input dimension `i` follows output dimension `broadcast_dimensions[i]`; an input
/// extent of 1 stays at index 0. A literal operand is simply written everywhere.
pub struct BroadcastInDim;

impl MappedOperation for BroadcastInDim {
    fn primitive(&self) -> &str {
        "broadcast_in_dim"
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
        let Some(Some(name)) = in_names.first() else {
            return Ok(BTreeMap::new());
        };
        let dims = eqn.params.usizes("broadcast_dimensions")?;
        let in_shape = eqn.invars[0].shape();
        if dims.len() != in_shape.len() {
            return Err(JaceError::invariant(format!(
                "broadcast_dimensions {dims:?} do not match the operand rank {}",
                in_shape.len()
            )));
        }
        let index = if dims.is_empty() {
            vec![IndexExpr::constant(0)]
        } else {
            dims.iter()
                .zip(in_shape)
                .map(|(&dim, &extent)| {
                    let range = ranges.get(dim).ok_or_else(|| {
                        JaceError::invariant(format!("broadcast dimension {dim} is out of range"))
                    })?;
                    Ok(if extent == 1 && range.extent() != 1 {
                        IndexExpr::constant(0)
                    } else {
                        IndexExpr::symbol(range.param.clone())
                    })
                })
                .collect::<JaceResult<Vec<_>>>()?
        };
        Ok(BTreeMap::from([(
            "__in0".to_string(),
            Memlet::element(name, index),
        )]))
    }
}
