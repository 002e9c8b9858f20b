//! Data-movement descriptions: which elements of which array an edge touches.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DataDescriptor;

/// Affine index `sym_0 + sym_1 + ... + offset` with unit coefficients.
///
/// This covers every access pattern the translators emit: plain map parameters,
/// broadcast zeros, slice offsets and dynamic offsets bound to map inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexExpr {
    pub symbols: Vec<String>,
    pub offset: i64,
}

impl IndexExpr {
    pub fn constant(offset: i64) -> Self {
        Self {
            symbols: Vec::new(),
            offset,
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self {
            symbols: vec![name.into()],
            offset: 0,
        }
    }

    pub fn plus(mut self, offset: i64) -> Self {
        self.offset += offset;
        self
    }

    pub fn plus_symbol(mut self, name: impl Into<String>) -> Self {
        self.symbols.push(name.into());
        self
    }

    pub fn is_constant(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Evaluates the index, `None` if a symbol is unbound.
    pub fn eval(&self, lookup: impl Fn(&str) -> Option<i64>) -> Option<i64> {
        let mut value = self.offset;
        for symbol in &self.symbols {
            value += lookup(symbol)?;
        }
        Some(value)
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbols.is_empty() {
            return write!(f, "{}", self.offset);
        }
        f.write_str(&self.symbols.join(" + "))?;
        match self.offset {
            0 => Ok(()),
            o if o < 0 => write!(f, " - {}", -o),
            o => write!(f, " + {o}"),
        }
    }
}

/// One dimension of a memlet subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subscript {
    Index(IndexExpr),
    /// Half-open constant range `start:end`.
    Range { start: i64, end: i64 },
}

impl Subscript {
    pub fn extent(&self) -> usize {
        match self {
            Subscript::Index(_) => 1,
            Subscript::Range { start, end } => (end - start).max(0) as usize,
        }
    }
}

impl From<IndexExpr> for Subscript {
    fn from(expr: IndexExpr) -> Self {
        Subscript::Index(expr)
    }
}

impl fmt::Display for Subscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscript::Index(expr) => write!(f, "{expr}"),
            Subscript::Range { start, end } => write!(f, "{start}:{end}"),
        }
    }
}

/// Reference to a subset of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Memlet {
    pub data: String,
    pub subset: Vec<Subscript>,
}

impl Memlet {
    pub fn new(data: impl Into<String>, subset: Vec<Subscript>) -> Self {
        Self {
            data: data.into(),
            subset,
        }
    }

    /// Single element addressed by one index expression per dimension.
    pub fn element(data: impl Into<String>, indices: Vec<IndexExpr>) -> Self {
        Self::new(data, indices.into_iter().map(Subscript::Index).collect())
    }

    /// The whole array.
    pub fn full(data: impl Into<String>, desc: &DataDescriptor) -> Self {
        Self::new(
            data,
            desc.shape
                .iter()
                .map(|&extent| Subscript::Range {
                    start: 0,
                    end: extent as i64,
                })
                .collect(),
        )
    }

    pub fn volume(&self) -> usize {
        self.subset.iter().map(Subscript::extent).product()
    }

    /// Symbols referenced by the subset.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.subset
            .iter()
            .flat_map(|sub| match sub {
                Subscript::Index(expr) => expr.symbols.as_slice(),
                Subscript::Range { .. } => &[][..],
            })
            .map(String::as_str)
    }
}

impl fmt::Display for Memlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subset = self
            .subset
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}[{}]", self.data, subset)
    }
}

/// Iteration range of one map parameter, `start..end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapRange {
    pub param: String,
    pub start: i64,
    pub end: i64,
}

impl MapRange {
    pub fn new(param: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            param: param.into(),
            start,
            end,
        }
    }

    pub fn extent(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }
}

impl fmt::Display for MapRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.param, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_expr_display() {
        assert_eq!(IndexExpr::constant(0).to_string(), "0");
        assert_eq!(IndexExpr::symbol("__i0").plus(3).to_string(), "__i0 + 3");
        assert_eq!(
            IndexExpr::symbol("__i1").plus_symbol("off").plus(-2).to_string(),
            "__i1 + off - 2"
        );
    }

    #[test]
    fn index_expr_eval() {
        let expr = IndexExpr::symbol("__i0").plus_symbol("s").plus(1);
        let value = expr.eval(|name| match name {
            "__i0" => Some(4),
            "s" => Some(10),
            _ => None,
        });
        assert_eq!(value, Some(15));
        assert_eq!(expr.eval(|_| None), None);
    }
}
