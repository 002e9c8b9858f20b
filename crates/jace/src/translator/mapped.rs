//! Shared lowering for elementwise operations with a single output.

use std::collections::BTreeMap;

use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Equation;
use crate::sdfg::{IndexExpr, MapRange, MappedTasklet, Memlet, StateId};

use super::{PrimitiveTranslator, TaskletTemplate, TranslationBuilder};

/// Map parameter used when the output is a scalar.
pub const SCALAR_ITERATOR: &str = "__jace_iterator_SCALAR";

/// An operation lowered to one mapped tasklet spanning the whole output.
///
/// Implementors supply the tasklet expression; input memlets default to elementwise
/// access with size-1 broadcasting. The expression refers to inputs through the slots
/// `{in0}`, `{in1}`, ... which are bound to the input's connector or, for literals, to
/// the literal's source text. Wrap an implementor in [`MappedTranslator`] to register it.
pub trait MappedOperation: Send + Sync {
    fn primitive(&self) -> &str;

    /// Connector of input `i`.
    fn connector_name(&self, i: usize) -> String {
        format!("__in{i}")
    }

    /// Right-hand side of `__out = ...`.
    fn write_tasklet_code(
        &self,
        ranges: &[MapRange],
        in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<TaskletTemplate>;

    /// Memlets of the non-literal inputs, keyed by connector.
    fn make_input_memlets(
        &self,
        ranges: &[MapRange],
        in_names: &[Option<String>],
        eqn: &Equation,
    ) -> JaceResult<BTreeMap<String, Memlet>> {
        default_input_memlets(ranges, in_names, eqn, &connectors(self, in_names.len()))
    }
}

fn connectors<T: MappedOperation + ?Sized>(op: &T, count: usize) -> Vec<String> {
    (0..count).map(|i| op.connector_name(i)).collect()
}

/// Adapter registering a [`MappedOperation`] as a [`PrimitiveTranslator`].
pub struct MappedTranslator<T>(pub T);

impl<T: MappedOperation> PrimitiveTranslator for MappedTranslator<T> {
    fn primitive(&self) -> &str {
        self.0.primitive()
    }

    fn translate(
        &self,
        builder: &mut TranslationBuilder,
        in_names: &[Option<String>],
        out_names: &mut Vec<String>,
        eqn: &Equation,
        eqn_state: StateId,
    ) -> JaceResult<Option<StateId>> {
        let [out_name] = out_names.as_slice() else {
            return Err(JaceError::invariant(format!(
                "'{}' expects exactly one output, got {}",
                self.0.primitive(),
                out_names.len()
            )));
        };
        let (ranges, out_index) = output_ranges(eqn.outvars[0].shape());
        let inputs = self.0.make_input_memlets(&ranges, in_names, eqn)?;
        let template = self.0.write_tasklet_code(&ranges, in_names, eqn)?;
        let rhs = bind_inputs(template, in_names, eqn, &connectors(&self.0, in_names.len()))?
            .render()?;

        let tasklet = MappedTasklet {
            label: format!("{}_{out_name}", self.0.primitive()),
            ranges,
            inputs,
            dynamic_inputs: BTreeMap::new(),
            code: format!("__out = {rhs}"),
            outputs: BTreeMap::from([("__out".to_string(), Memlet::element(out_name, out_index))]),
        };
        builder
            .sdfg_mut()?
            .state_mut(eqn_state)
            .add_mapped_tasklet(tasklet);
        Ok(None)
    }
}

/// One `__i{dim}` range per output dimension, or the trivial scalar range.
pub fn output_ranges(out_shape: &[usize]) -> (Vec<MapRange>, Vec<IndexExpr>) {
    if out_shape.is_empty() {
        return (
            vec![MapRange::new(SCALAR_ITERATOR, 0, 1)],
            vec![IndexExpr::constant(0)],
        );
    }
    out_shape
        .iter()
        .enumerate()
        .map(|(dim, &extent)| {
            let param = format!("__i{dim}");
            (
                MapRange::new(param.clone(), 0, extent as i64),
                IndexExpr::symbol(param),
            )
        })
        .unzip()
}

/// Binds `{in<i>}` to `connectors[i]` or to the literal text of input `i`.
pub fn bind_inputs(
    mut template: TaskletTemplate,
    in_names: &[Option<String>],
    eqn: &Equation,
    connectors: &[String],
) -> JaceResult<TaskletTemplate> {
    let inputs = in_names.iter().zip(&eqn.invars).zip(connectors);
    for (i, ((name, atom), connector)) in inputs.enumerate() {
        let value = match (name, atom.as_literal()) {
            (Some(_), _) => connector.clone(),
            (None, Some(lit)) => lit.value().to_code(),
            (None, None) => {
                return Err(JaceError::invariant(format!(
                    "input {i} has no array but is not a literal"
                )));
            }
        };
        template = template.bind(format!("in{i}"), value);
    }
    Ok(template)
}

/// Elementwise input access; dimensions of extent 1 are read at index 0.
///
/// Every input must be rank 0 or have the output's rank, and each dimension must either
/// match the output or be 1. Anything else is reported as unsupported.
pub fn default_input_memlets(
    ranges: &[MapRange],
    in_names: &[Option<String>],
    eqn: &Equation,
    connectors: &[String],
) -> JaceResult<BTreeMap<String, Memlet>> {
    let out_shape = eqn.outvars[0].shape();
    let out_rank = out_shape.len();
    if let Some(bad) = eqn
        .invars
        .iter()
        .find(|atom| !atom.shape().is_empty() && atom.shape().len() != out_rank)
    {
        return Err(JaceError::unsupported(format!(
            "can not broadcast an input of shape {:?} to the output shape {out_shape:?}",
            bad.shape()
        )));
    }

    let mut memlets = BTreeMap::new();
    for ((name, atom), connector) in in_names.iter().zip(&eqn.invars).zip(connectors) {
        let Some(name) = name else { continue };
        let in_shape = atom.shape();
        let index = if in_shape.is_empty() {
            vec![IndexExpr::constant(0)]
        } else {
            in_shape
                .iter()
                .zip(out_shape)
                .zip(ranges)
                .map(|((&in_ext, &out_ext), range)| match in_ext {
                    e if e == out_ext => Ok(IndexExpr::symbol(range.param.clone())),
                    1 => Ok(IndexExpr::constant(0)),
                    _ => Err(JaceError::unsupported(format!(
                        "can not broadcast an input of shape {in_shape:?} to the output shape {out_shape:?}"
                    ))),
                })
                .collect::<JaceResult<Vec<_>>>()?
        };
        memlets.insert(connector.clone(), Memlet::element(name, index));
    }
    Ok(memlets)
}
