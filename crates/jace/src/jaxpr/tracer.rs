use crate::cache::ArgDescriptor;
use crate::error::{JaceError, JaceResult};
use crate::sdfg::DType;
use crate::value::{HostArray, Scalar};

use super::{Atom, ClosedJaxpr, Equation, Jaxpr, Literal, Params, Var};

const COMPARISONS: &[&str] = &["eq", "ne", "ge", "gt", "le", "lt"];

/// Records equations into a [`ClosedJaxpr`].
///
/// Stands in for an external tracing framework: every operation is written down in the
/// order it is issued, output avals are either given explicitly or inferred for the
/// elementwise helpers.
#[derive(Debug, Default)]
pub struct JaxprTracer {
    invars: Vec<Var>,
    constvars: Vec<Var>,
    consts: Vec<HostArray>,
    eqns: Vec<Equation>,
    effects: Vec<String>,
}

impl JaxprTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invar(&mut self, shape: Vec<usize>, dtype: DType) -> Var {
        let var = Var::new(shape, dtype);
        self.invars.push(var.clone());
        var
    }

    /// Input whose graph variable is called `name`.
    pub fn named_invar(
        &mut self,
        name: impl Into<String>,
        shape: Vec<usize>,
        dtype: DType,
    ) -> JaceResult<Var> {
        let var = Var::named(name, shape, dtype)?;
        self.invars.push(var.clone());
        Ok(var)
    }

    /// Captures `value` as a constant variable of the jaxpr.
    pub fn constant(&mut self, value: HostArray) -> Var {
        let var = Var::new(value.shape().to_vec(), value.dtype());
        self.constvars.push(var.clone());
        self.consts.push(value);
        var
    }

    pub fn literal(value: Scalar) -> Atom {
        Atom::Literal(Literal::new(value))
    }

    /// Records one equation and returns its freshly created outputs.
    pub fn push(
        &mut self,
        primitive: impl Into<String>,
        inputs: Vec<Atom>,
        out_avals: Vec<(Vec<usize>, DType)>,
        params: Params,
    ) -> Vec<Var> {
        let outvars: Vec<Var> = out_avals
            .into_iter()
            .map(|(shape, dtype)| Var::new(shape, dtype))
            .collect();
        self.eqns
            .push(Equation::new(primitive, inputs, outvars.clone(), params));
        outvars
    }

    /// Records a prebuilt equation, e.g. one with drop outputs.
    pub fn push_equation(&mut self, eqn: Equation) {
        self.eqns.push(eqn);
    }

    /// Marks the jaxpr as effectful.
    pub fn effect(&mut self, name: impl Into<String>) {
        self.effects.push(name.into());
    }

    pub fn unary(&mut self, primitive: &str, x: impl Into<Atom>, params: Params) -> Var {
        let x = x.into();
        let dtype = if primitive == "is_finite" {
            DType::Bool
        } else {
            x.dtype()
        };
        let shape = x.shape().to_vec();
        self.single(primitive, vec![x], shape, dtype, params)
    }

    /// Elementwise binary operation with size-1 broadcasting.
    pub fn binary(
        &mut self,
        primitive: &str,
        lhs: impl Into<Atom>,
        rhs: impl Into<Atom>,
    ) -> JaceResult<Var> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let shape = broadcast_shapes(lhs.shape(), rhs.shape())?;
        let dtype = if COMPARISONS.contains(&primitive) {
            DType::Bool
        } else if lhs.is_literal() {
            rhs.dtype()
        } else {
            lhs.dtype()
        };
        Ok(self.single(primitive, vec![lhs, rhs], shape, dtype, Params::new()))
    }

    /// `select_n(pred, cases...)`; all cases share one shape.
    pub fn select(&mut self, pred: impl Into<Atom>, cases: Vec<Atom>) -> JaceResult<Var> {
        let Some(first) = cases.iter().find(|c| !c.is_literal()).or(cases.first()) else {
            return Err(JaceError::invariant("select_n needs at least one case"));
        };
        let (shape, dtype) = (first.shape().to_vec(), first.dtype());
        let mut inputs = vec![pred.into()];
        inputs.extend(cases);
        Ok(self.single("select_n", inputs, shape, dtype, Params::new()))
    }

    fn single(
        &mut self,
        primitive: &str,
        inputs: Vec<Atom>,
        shape: Vec<usize>,
        dtype: DType,
        params: Params,
    ) -> Var {
        let mut outs = self.push(primitive, inputs, vec![(shape, dtype)], params);
        outs.remove(0)
    }

    pub fn finish(self, outputs: Vec<Atom>) -> JaceResult<ClosedJaxpr> {
        let jaxpr = Jaxpr {
            invars: self.invars,
            constvars: self.constvars,
            eqns: self.eqns,
            outvars: outputs,
        };
        Ok(ClosedJaxpr::new(jaxpr, self.consts)?.with_effects(self.effects))
    }
}

fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> JaceResult<Vec<usize>> {
    if lhs.is_empty() {
        return Ok(rhs.to_vec());
    }
    if rhs.is_empty() {
        return Ok(lhs.to_vec());
    }
    if lhs.len() != rhs.len() {
        return Err(JaceError::unsupported(format!(
            "can not broadcast {lhs:?} against {rhs:?}"
        )));
    }
    lhs.iter()
        .zip(rhs)
        .map(|(&l, &r)| match (l, r) {
            (l, r) if l == r => Ok(l),
            (1, r) => Ok(r),
            (l, 1) => Ok(l),
            _ => Err(JaceError::unsupported(format!(
                "can not broadcast {lhs:?} against {rhs:?}"
            ))),
        })
        .collect()
}

/// A function that can be traced into a jaxpr for given argument descriptors.
pub trait Traceable {
    fn make_jaxpr(&self, args: &[ArgDescriptor]) -> JaceResult<ClosedJaxpr>;
}

impl<F> Traceable for F
where
    F: Fn(&mut JaxprTracer, &[Var]) -> JaceResult<Vec<Atom>>,
{
    fn make_jaxpr(&self, args: &[ArgDescriptor]) -> JaceResult<ClosedJaxpr> {
        let mut tracer = JaxprTracer::new();
        let inputs: Vec<Var> = args
            .iter()
            .map(|arg| tracer.invar(arg.shape.clone(), arg.dtype))
            .collect();
        let outputs = self(&mut tracer, &inputs)?;
        tracer.finish(outputs)
    }
}
