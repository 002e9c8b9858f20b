use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{MapRange, Memlet};
use crate::translator::{MappedOperation, TaskletTemplate};

/// `iota`: every element is its index along `dimension`.
pub struct Iota;

impl MappedOperation for Iota {
    fn primitive(&self) -> &str {
        "iota"
    }

    fn write_tasklet_code(
        &self,
        ranges: &[MapRange],
        _in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        let dim = eqn.params.usize("dimension")?;
        let range = ranges.get(dim).ok_or_else(|| {
            JaceError::invariant(format!("iota dimension {dim} exceeds the output rank"))
        })?;
        Ok(TaskletTemplate::new("{index}").bind("index", range.param.clone()))
    }

    fn make_input_memlets(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        _eqn: &Equation,
    ) -> JaceResult<BTreeMap<String, Memlet>> {
        Ok(BTreeMap::new())
    }
}
