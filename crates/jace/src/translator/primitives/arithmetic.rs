//! Arithmetic, comparison and logical operations.

use crate::error::JaceResult;
use crate::jaxpr::{Equation, Param};
use crate::sdfg::{DType, MapRange};
use crate::translator::{MappedOperation, TaskletTemplate};

/// Primitive name and tasklet expression of every arithmetic and comparison primitive.
///
/// `integer_pow` additionally reads its exponent from the parameter `y`.
pub const ARITHMETIC_TEMPLATES: &[(&str, &str)] = &[
    ("pos", "+({in0})"),
    ("neg", "-({in0})"),
    ("floor", "floor({in0})"),
    ("ceil", "ceil({in0})"),
    ("round", "round({in0})"),
    ("abs", "abs({in0})"),
    ("sign", "sign({in0})"),
    ("exp", "exp({in0})"),
    ("exp2", "exp2({in0})"),
    ("expm1", "expm1({in0})"),
    ("log", "log({in0})"),
    ("log1p", "log1p({in0})"),
    ("conj", "conj({in0})"),
    ("sqrt", "sqrt({in0})"),
    ("cbrt", "cbrt({in0})"),
    ("integer_pow", "({in0})**({y})"),
    ("is_finite", "isfinite({in0})"),
    ("sin", "sin({in0})"),
    ("asin", "asin({in0})"),
    ("cos", "cos({in0})"),
    ("acos", "acos({in0})"),
    ("tan", "tan({in0})"),
    ("atan", "atan({in0})"),
    ("sinh", "sinh({in0})"),
    ("asinh", "asinh({in0})"),
    ("cosh", "cosh({in0})"),
    ("acosh", "acosh({in0})"),
    ("tanh", "tanh({in0})"),
    ("atanh", "atanh({in0})"),
    ("add", "({in0})+({in1})"),
    ("add_any", "({in0})+({in1})"),
    ("sub", "({in0})-({in1})"),
    ("mul", "({in0})*({in1})"),
    ("div", "({in0})/({in1})"),
    ("rem", "({in0})%({in1})"),
    ("pow", "({in0})**({in1})"),
    ("min", "min(({in0}), ({in1}))"),
    ("max", "max(({in0}), ({in1}))"),
    ("eq", "({in0}) == ({in1})"),
    ("ne", "({in0}) != ({in1})"),
    ("ge", "({in0}) >= ({in1})"),
    ("gt", "({in0}) > ({in1})"),
    ("le", "({in0}) <= ({in1})"),
    ("lt", "({in0}) < ({in1})"),
    ("atan2", "atan2(({in0}), ({in1}))"),
    ("nextafter", "nextafter(({in0}), ({in1}))"),
    (
        "clamp",
        "(({in0}) if ({in1}) < ({in0}) else (({in1}) if ({in1}) < ({in2}) else ({in2})))",
    ),
];

/// `(primitive, bitwise template, logical template)`.
///
/// The logical form is used when every input is boolean; `~` on a boolean would flip
/// every bit instead of negating it.
pub const LOGICAL_TEMPLATES: &[(&str, &str, &str)] = &[
    ("or", "({in0}) | ({in1})", "({in0}) or ({in1})"),
    ("not", "~({in0})", "not ({in0})"),
    ("and", "({in0}) & ({in1})", "({in0}) and ({in1})"),
    ("xor", "({in0}) ^ ({in1})", "({in0}) != ({in1})"),
];

/// Elementwise arithmetic or comparison given by a fixed template.
pub struct ArithmeticOperation {
    primitive: &'static str,
    template: &'static str,
}

impl ArithmeticOperation {
    pub fn new(primitive: &'static str, template: &'static str) -> Self {
        Self {
            primitive,
            template,
        }
    }
}

impl MappedOperation for ArithmeticOperation {
    fn primitive(&self) -> &str {
        self.primitive
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        let mut template = TaskletTemplate::new(self.template);
        for slot in template.slots()? {
            if slot.starts_with("in") && slot[2..].parse::<usize>().is_ok() {
                continue;
            }
            let value = match eqn.params.get(&slot) {
                Some(Param::Int(v)) => v.to_string(),
                Some(Param::Float(v)) => format!("{v:?}"),
                _ => eqn.params.int(&slot)?.to_string(),
            };
            template = template.bind(slot, value);
        }
        Ok(template)
    }
}

/// Logical or bitwise operation, picked by the input dtypes.
pub struct LogicalOperation {
    primitive: &'static str,
    bitwise: &'static str,
    logical: &'static str,
}

impl LogicalOperation {
    pub fn new(primitive: &'static str, bitwise: &'static str, logical: &'static str) -> Self {
        Self {
            primitive,
            bitwise,
            logical,
        }
    }
}

impl MappedOperation for LogicalOperation {
    fn primitive(&self) -> &str {
        self.primitive
    }

    fn write_tasklet_code(
        &self,
        _ranges: &[MapRange],
        _in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate> {
        let all_bool = eqn.invars.iter().all(|atom| atom.dtype() == DType::Bool);
        Ok(TaskletTemplate::new(if all_bool {
            self.logical
        } else {
            self.bitwise
        }))
    }
}
