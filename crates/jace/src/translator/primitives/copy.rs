use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::MapRange;
use crate::translator::{MappedOperation, TaskletTemplate};

/// `copy`, expressed as a map so later passes may fuse it.
pub struct Copy;

impl MappedOperation for Copy {
    fn primitive(&self) -> &str {
        "copy"
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        _eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        Ok(TaskletTemplate::new("{in0}"))
    }
}

/// `device_put` onto the device the data already lives on, i.e. a copy.
pub struct DevicePut;

impl MappedOperation for DevicePut {
    fn primitive(&self) -> &str {
        "device_put"
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        if !(eqn.params.is_none("device") && eqn.params.is_none("src")) {
            return Err(JaceError::unsupported(format!(
                "device_put can only copy on the host, not from {:?} to {:?}",
                eqn.params.get("src").map(ToString::to_string),
                eqn.params.get("device").map(ToString::to_string)
            )));
        }
        Ok(TaskletTemplate::new("{in0}"))
    }
}
