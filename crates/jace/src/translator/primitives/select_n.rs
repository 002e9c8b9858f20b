use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::MapRange;
use crate::translator::{MappedOperation, TaskletTemplate};

/// `select_n(pred, case0, case1, ...)`, a generalized `where`.
///
/// The predicate is read through the connector `__cond`, the cases through `__in0`,
/// `__in1`, ... An out-of-range predicate is undefined behaviour, it currently selects
/// the last case.
pub struct SelectN;

impl MappedOperation for SelectN {
    fn primitive(&self) -> &str {
        "select_n"
    }

    fn connector_name(&self, i: usize) -> String {
        match i {
            0 => "__cond".to_string(),
            i => format!("__in{}", i - 1),
        }
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        in_names: &[Option<String>],
        _eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        let cases = in_names.len().saturating_sub(1);
        if cases == 0 {
            return Err(JaceError::invariant("select_n without any case"));
        }
        if cases == 2 {
            return Ok(TaskletTemplate::new("({in2}) if ({in0}) else ({in1})"));
        }
        let mut text = format!("({{in{cases}}})");
        for case in (0..cases - 1).rev() {
            text = format!("({{in{}}}) if ({{in0}}) == {case} else ({text})", case + 1);
        }
        Ok(TaskletTemplate::new(text))
    }
}
