use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{DType, MapRange};
use crate::translator::{MappedOperation, TaskletTemplate};

/// `convert_element_type`: copies and casts to the output dtype.
///
/// `new_dtype` and `weak_type` are not read, the output variable already carries the
/// target type.
pub struct ConvertElementType;

impl MappedOperation for ConvertElementType {
    fn primitive(&self) -> &str {
        "convert_element_type"
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        if !matches!(in_names.first(), Some(Some(_))) {
            return Err(JaceError::unsupported(
                "convert_element_type is not supported for literals",
            ));
        }
        let in_dtype = eqn.invars[0].dtype();
        let out_dtype = eqn.outvars[0].dtype();
        if in_dtype == out_dtype {
            log::warn!("convert_element_type({eqn}) is useless, input and output are {in_dtype}");
        }
        let value = if in_dtype == DType::Bool && out_dtype.is_integer() {
            "(1 if ({in0}) else 0)"
        } else {
            "{in0}"
        };
        Ok(TaskletTemplate::new(format!("{{cast}}({value})")).bind("cast", out_dtype.name()))
    }
}
