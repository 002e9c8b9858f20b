//! In-memory form of traced equation lists (jaxprs).
//!
//! This is the input boundary of the translator. A [`ClosedJaxpr`] is an ordered list of
//! [`Equation`]s over [`Var`]s, plus the values of its constant variables. Variables are
//! compared by identity, never by name, so two distinct variables that happen to share a
//! diagnostic name stay distinct.

mod params;
mod tracer;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{JaceError, JaceResult};
use crate::sdfg::DType;
use crate::translator::naming;
use crate::value::{HostArray, Scalar};

pub use params::{Param, Params};
pub use tracer::{JaxprTracer, Traceable};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    /// Produced by tracing.
    Traced,
    /// Synthetic descriptor carrying an explicit graph-variable name.
    Named(String),
    /// Discarded output (`_`).
    Drop,
}

#[derive(Debug)]
struct VarInner {
    id: u64,
    kind: VarKind,
    shape: Vec<usize>,
    dtype: DType,
}

/// Handle to a jaxpr variable; clones refer to the same variable.
#[derive(Debug, Clone)]
pub struct Var(Arc<VarInner>);

impl Var {
    fn with_kind(kind: VarKind, shape: Vec<usize>, dtype: DType) -> Self {
        Var(Arc::new(VarInner {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            shape,
            dtype,
        }))
    }

    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self::with_kind(VarKind::Traced, shape, dtype)
    }

    /// A variable that always maps to the graph variable `name`.
    pub fn named(name: impl Into<String>, shape: Vec<usize>, dtype: DType) -> JaceResult<Self> {
        let name = name.into();
        if naming::is_forbidden_name(&name) {
            return Err(JaceError::naming(format!("'{name}' is a forbidden name")));
        }
        if !naming::is_valid_name(&name) {
            return Err(JaceError::naming(format!("'{name}' is not a valid name")));
        }
        Ok(Self::with_kind(VarKind::Named(name), shape, dtype))
    }

    pub fn drop(shape: Vec<usize>, dtype: DType) -> Self {
        Self::with_kind(VarKind::Drop, shape, dtype)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &VarKind {
        &self.0.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    pub fn rank(&self) -> usize {
        self.0.shape.len()
    }

    pub fn is_drop(&self) -> bool {
        self.0.kind == VarKind::Drop
    }

    pub fn explicit_name(&self) -> Option<&str> {
        match &self.0.kind {
            VarKind::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            VarKind::Traced => write!(f, "jax{}", self.0.id),
            VarKind::Named(name) => f.write_str(name),
            VarKind::Drop => f.write_str("_"),
        }
    }
}

/// Inline rank-0 operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Literal {
    value: Scalar,
}

impl Literal {
    pub fn new(value: Scalar) -> Self {
        Self { value }
    }

    pub fn value(&self) -> Scalar {
        self.value
    }

    pub fn dtype(&self) -> DType {
        self.value.dtype()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.to_code())
    }
}

/// Equation operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Var(Var),
    Literal(Literal),
}

impl Atom {
    pub fn shape(&self) -> &[usize] {
        match self {
            Atom::Var(var) => var.shape(),
            Atom::Literal(_) => &[],
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Atom::Var(var) => var.dtype(),
            Atom::Literal(lit) => lit.dtype(),
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Atom::Var(var) => Some(var),
            Atom::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Atom::Literal(lit) => Some(lit),
            Atom::Var(_) => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Atom::Literal(_))
    }
}

impl From<Var> for Atom {
    fn from(var: Var) -> Self {
        Atom::Var(var)
    }
}

impl From<&Var> for Atom {
    fn from(var: &Var) -> Self {
        Atom::Var(var.clone())
    }
}

impl From<Literal> for Atom {
    fn from(lit: Literal) -> Self {
        Atom::Literal(lit)
    }
}

impl From<Scalar> for Atom {
    fn from(value: Scalar) -> Self {
        Atom::Literal(Literal::new(value))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Var(var) => write!(f, "{var}"),
            Atom::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Equation {
    pub primitive: String,
    pub invars: Vec<Atom>,
    pub outvars: Vec<Var>,
    pub params: Params,
    /// Set when the equation declares side effects.
    pub effectful: bool,
}

impl Equation {
    pub fn new(
        primitive: impl Into<String>,
        invars: Vec<Atom>,
        outvars: Vec<Var>,
        params: Params,
    ) -> Self {
        Self {
            primitive: primitive.into(),
            invars,
            outvars,
            params,
            effectful: false,
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outs = self
            .outvars
            .iter()
            .map(|v| format!("{v}:{}{:?}", v.dtype(), v.shape()))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{outs} = {}", self.primitive)?;
        if !self.params.is_empty() {
            write!(f, "[{}]", self.params)?;
        }
        for input in &self.invars {
            write!(f, " {input}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Jaxpr {
    pub invars: Vec<Var>,
    pub constvars: Vec<Var>,
    pub eqns: Vec<Equation>,
    pub outvars: Vec<Atom>,
}

impl fmt::Display for Jaxpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |vars: &[Var]| {
            vars.iter()
                .map(|v| format!("{v}:{}{:?}", v.dtype(), v.shape()))
                .collect::<Vec<_>>()
                .join(" ")
        };
        writeln!(f, "{{ lambda {} ; {}. let", list(&self.constvars), list(&self.invars))?;
        for eqn in &self.eqns {
            writeln!(f, "    {eqn}")?;
        }
        let outs = self
            .outvars
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "  in ({outs}) }}")
    }
}

/// A jaxpr together with the values of its constant variables.
#[derive(Debug, Clone)]
pub struct ClosedJaxpr {
    jaxpr: Arc<Jaxpr>,
    consts: Vec<HostArray>,
    effects: Vec<String>,
}

impl ClosedJaxpr {
    pub fn new(jaxpr: Jaxpr, consts: Vec<HostArray>) -> JaceResult<Self> {
        if jaxpr.constvars.len() != consts.len() {
            return Err(JaceError::invariant(format!(
                "jaxpr declares {} constants but {} values were given",
                jaxpr.constvars.len(),
                consts.len()
            )));
        }
        Ok(Self {
            jaxpr: Arc::new(jaxpr),
            consts,
            effects: Vec::new(),
        })
    }

    pub fn with_effects(mut self, effects: Vec<String>) -> Self {
        self.effects = effects;
        self
    }

    pub fn jaxpr(&self) -> &Jaxpr {
        &self.jaxpr
    }

    pub fn consts(&self) -> &[HostArray] {
        &self.consts
    }

    pub fn effects(&self) -> &[String] {
        &self.effects
    }

    pub fn invars(&self) -> &[Var] {
        &self.jaxpr.invars
    }

    pub fn outvars(&self) -> &[Atom] {
        &self.jaxpr.outvars
    }

    pub fn eqns(&self) -> &[Equation] {
        &self.jaxpr.eqns
    }
}

impl fmt::Display for ClosedJaxpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.jaxpr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_compare_by_identity() {
        let a = Var::new(vec![2], DType::F64);
        let b = Var::new(vec![2], DType::F64);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn named_vars_reject_bad_names() {
        assert!(Var::named("while", vec![], DType::F64).unwrap_err().is_naming());
        assert!(Var::named("1abc", vec![], DType::F64).unwrap_err().is_naming());
        let ok = Var::named("_x1", vec![3], DType::I32).unwrap();
        assert_eq!(ok.explicit_name(), Some("_x1"));
    }
}
