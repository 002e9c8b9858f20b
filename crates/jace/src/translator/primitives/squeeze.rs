use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, Memlet};
use crate::translator::{MappedOperation, TaskletTemplate};

/// `squeeze`: removes the size-1 dimensions listed in `dimensions`.
pub struct Squeeze;

impl MappedOperation for Squeeze {
    fn primitive(&self) -> &str {
        "squeeze"
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
            return Err(JaceError::unsupported("squeeze of a literal"));
        };
        let removed = eqn.params.usizes("dimensions")?;
        let in_rank = eqn.invars[0].shape().len();
        let mut kept = ranges.iter();
        let mut index = Vec::with_capacity(in_rank.max(1));
        for dim in 0..in_rank {
            if removed.contains(&dim) {
                index.push(IndexExpr::constant(0));
                continue;
            }
            let range = kept.next().ok_or_else(|| {
                JaceError::invariant(format!("squeeze: no output dimension left for input {dim}"))
            })?;
            index.push(IndexExpr::symbol(range.param.clone()));
        }
        if index.is_empty() {
            index.push(IndexExpr::constant(0));
        }
        Ok(BTreeMap::from([(
            "__in0".to_string(),
            Memlet::element(name, index),
        )]))
    }
}
