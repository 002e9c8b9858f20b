use std::collections::BTreeMap;
use std::fmt;

use crate::error::{JaceError, JaceResult};
use crate::sdfg::DType;

use super::ClosedJaxpr;

/// One static equation parameter.
#[derive(Debug, Clone)]
pub enum Param {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    /// Lists such as `slice_sizes` entries that may be absent per dimension.
    OptInts(Vec<Option<i64>>),
    DType(DType),
    Jaxpr(ClosedJaxpr),
    Jaxprs(Vec<ClosedJaxpr>),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::None => f.write_str("None"),
            Param::Bool(v) => write!(f, "{v}"),
            Param::Int(v) => write!(f, "{v}"),
            Param::Float(v) => write!(f, "{v:?}"),
            Param::Str(v) => f.write_str(v),
            Param::Ints(v) => write!(f, "{v:?}"),
            Param::OptInts(v) => write!(f, "{v:?}"),
            Param::DType(v) => write!(f, "{v}"),
            Param::Jaxpr(_) => f.write_str("<jaxpr>"),
            Param::Jaxprs(v) => write!(f, "<{} jaxprs>", v.len()),
        }
    }
}

/// Ordered parameter map of an equation.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: BTreeMap<String, Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Param) -> Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Param) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the parameter is absent or explicitly `None`.
    pub fn is_none(&self, name: &str) -> bool {
        matches!(self.entries.get(name), None | Some(Param::None))
    }

    fn require(&self, name: &str) -> JaceResult<&Param> {
        self.entries
            .get(name)
            .ok_or_else(|| JaceError::invariant(format!("missing equation parameter '{name}'")))
    }

    fn mismatch(name: &str, expected: &str, found: &Param) -> JaceError {
        JaceError::invariant(format!(
            "equation parameter '{name}' should be {expected}, found {found}"
        ))
    }

    pub fn int(&self, name: &str) -> JaceResult<i64> {
        match self.require(name)? {
            Param::Int(v) => Ok(*v),
            other => Err(Self::mismatch(name, "an integer", other)),
        }
    }

    pub fn usize(&self, name: &str) -> JaceResult<usize> {
        let value = self.int(name)?;
        usize::try_from(value)
            .map_err(|_| JaceError::invariant(format!("parameter '{name}' is negative: {value}")))
    }

    pub fn float(&self, name: &str) -> JaceResult<f64> {
        match self.require(name)? {
            Param::Float(v) => Ok(*v),
            Param::Int(v) => Ok(*v as f64),
            other => Err(Self::mismatch(name, "a float", other)),
        }
    }

    pub fn bool(&self, name: &str) -> JaceResult<bool> {
        match self.require(name)? {
            Param::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(name, "a bool", other)),
        }
    }

    pub fn str(&self, name: &str) -> JaceResult<&str> {
        match self.require(name)? {
            Param::Str(v) => Ok(v),
            other => Err(Self::mismatch(name, "a string", other)),
        }
    }

    pub fn ints(&self, name: &str) -> JaceResult<&[i64]> {
        match self.require(name)? {
            Param::Ints(v) => Ok(v),
            other => Err(Self::mismatch(name, "an integer list", other)),
        }
    }

    /// Integer list with every entry checked to be non-negative.
    pub fn usizes(&self, name: &str) -> JaceResult<Vec<usize>> {
        self.ints(name)?
            .iter()
            .map(|&v| {
                usize::try_from(v).map_err(|_| {
                    JaceError::invariant(format!("parameter '{name}' has a negative entry {v}"))
                })
            })
            .collect()
    }

    pub fn opt_ints(&self, name: &str) -> JaceResult<Vec<Option<i64>>> {
        match self.require(name)? {
            Param::OptInts(v) => Ok(v.clone()),
            Param::Ints(v) => Ok(v.iter().copied().map(Some).collect()),
            other => Err(Self::mismatch(name, "an optional integer list", other)),
        }
    }

    pub fn dtype(&self, name: &str) -> JaceResult<DType> {
        match self.require(name)? {
            Param::DType(v) => Ok(*v),
            other => Err(Self::mismatch(name, "a dtype", other)),
        }
    }

    pub fn jaxpr(&self, name: &str) -> JaceResult<&ClosedJaxpr> {
        match self.require(name)? {
            Param::Jaxpr(v) => Ok(v),
            other => Err(Self::mismatch(name, "a jaxpr", other)),
        }
    }

    pub fn jaxprs(&self, name: &str) -> JaceResult<&[ClosedJaxpr]> {
        match self.require(name)? {
            Param::Jaxprs(v) => Ok(v),
            other => Err(Self::mismatch(name, "a list of jaxprs", other)),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}
