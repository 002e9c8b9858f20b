//! Turning a canonical translation context into a graph with a calling convention.

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::ArgDescriptor;
use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Atom;
use crate::sdfg::{row_major_strides, DataDescriptor, Memlet, NestedSdfgNode, StateId};
use crate::value::HostArray;

use super::builder::CONSTANT_PREFIX;
use super::{TranslatedJaxprSdfg, TranslationBuilder, TranslationContext};

/// Name of the `i`-th boundary input array.
pub fn input_name(i: usize) -> String {
    format!("__jace_input_{i}")
}

/// Name of the `i`-th boundary output array.
pub fn output_name(i: usize) -> String {
    format!("__jace_output_{i}")
}

/// Adds the boundary stages for `call_args` and finalizes the context.
///
/// The context is consumed; the returned graph shares nothing with it.
pub fn postprocess_jaxpr_sdfg(
    mut ctx: TranslationContext,
    call_args: &[ArgDescriptor],
    validate: bool,
) -> JaceResult<TranslatedJaxprSdfg> {
    ctx.validate()?;
    create_input_output_stages(&mut ctx, call_args)?;
    finalize_translation_context(&ctx, validate)
}

/// Puts a copy-in state before the start state and a copy-out state after the terminal.
///
/// Boundary inputs take their strides and storage from `call_args`. The context stays
/// canonical: the boundary arrays are transient until the context is finalized. A name
/// that is both input and output is rejected.
pub fn create_input_output_stages(
    ctx: &mut TranslationContext,
    call_args: &[ArgDescriptor],
) -> JaceResult<()> {
    let (Some(inp_names), Some(out_names)) = (&ctx.inp_names, &ctx.out_names) else {
        return Err(JaceError::invariant(
            "the context has no input or output names yet",
        ));
    };
    let inputs: BTreeSet<&String> = inp_names.iter().collect();
    if let Some(shared) = out_names.iter().find(|name| inputs.contains(name)) {
        return Err(JaceError::unsupported(format!(
            "'{shared}' is both an input and an output"
        )));
    }
    if call_args.len() != inp_names.len() {
        return Err(JaceError::argument(format!(
            "expected {} arguments, got {}",
            inp_names.len(),
            call_args.len()
        )));
    }
    create_input_state(ctx, call_args)?;
    create_output_state(ctx)
}

fn create_input_state(ctx: &mut TranslationContext, call_args: &[ArgDescriptor]) -> JaceResult<()> {
    let old_start = ctx.start_state;
    let org_names = ctx.inp_names.clone().unwrap_or_default();
    let sdfg = &mut ctx.sdfg;
    let state = sdfg.add_state(format!("{}__start_state", sdfg.name()));

    let mut new_names = Vec::with_capacity(org_names.len());
    for (i, (org_name, arg)) in org_names.iter().zip(call_args).enumerate() {
        let org_desc = sdfg
            .array(org_name)
            .cloned()
            .ok_or_else(|| JaceError::invariant(format!("input '{org_name}' has no array")))?;
        let arg_elements: usize = arg.shape.iter().product();
        if arg.dtype != org_desc.dtype || arg_elements != org_desc.element_count() {
            return Err(JaceError::argument(format!(
                "argument {i} is {}{:?} but the traced input is {org_desc}",
                arg.dtype, arg.shape
            )));
        }
        let strides = match &arg.strides {
            Some(strides) if strides.len() == org_desc.rank() => strides.clone(),
            _ => row_major_strides(&org_desc.shape),
        };
        let new_name = input_name(i);
        let new_desc = DataDescriptor::array(org_desc.shape.clone(), org_desc.dtype)
            .with_strides(strides)
            .with_storage(arg.storage);
        sdfg.add_array(new_name.clone(), new_desc.clone())?;
        sdfg.state_mut(state).add_copy(
            Memlet::full(&new_name, &new_desc),
            Memlet::full(org_name, &org_desc),
        );
        new_names.push(new_name);
    }

    sdfg.add_edge(state, old_start, None, BTreeMap::new());
    sdfg.set_start_state(state);
    ctx.start_state = state;
    ctx.inp_names = Some(new_names);
    Ok(())
}

fn create_output_state(ctx: &mut TranslationContext) -> JaceResult<()> {
    let org_names = ctx.out_names.clone().unwrap_or_default();
    let sdfg = &mut ctx.sdfg;
    let state = sdfg.add_state("output_processing_stage");

    let mut new_names = Vec::with_capacity(org_names.len());
    for (i, org_name) in org_names.iter().enumerate() {
        let org_desc = sdfg
            .array(org_name)
            .cloned()
            .ok_or_else(|| JaceError::invariant(format!("output '{org_name}' has no array")))?;
        let new_name = output_name(i);
        // Transients are already arrays, scalars included, so the descriptor carries over.
        let new_desc = DataDescriptor::array(org_desc.shape.clone(), org_desc.dtype);
        sdfg.add_array(new_name.clone(), new_desc.clone())?;
        sdfg.state_mut(state).add_copy(
            Memlet::full(org_name, &org_desc),
            Memlet::full(&new_name, &new_desc),
        );
        new_names.push(new_name);
    }

    sdfg.add_edge(ctx.terminal_state, state, None, BTreeMap::new());
    ctx.terminal_state = state;
    ctx.out_names = Some(new_names);
    Ok(())
}

/// Deep-copies the graph and exposes the inputs and outputs as its arguments.
///
/// The context is not modified. Argument order is inputs then outputs; a name listed in
/// both appears once, at its first position.
pub fn finalize_translation_context(
    ctx: &TranslationContext,
    validate: bool,
) -> JaceResult<TranslatedJaxprSdfg> {
    ctx.validate()?;
    let (Some(inp_names), Some(out_names)) = (&ctx.inp_names, &ctx.out_names) else {
        return Err(JaceError::invariant(
            "the context has no input or output names yet",
        ));
    };
    if inp_names.is_empty() && out_names.is_empty() {
        return Err(JaceError::invariant(format!(
            "SDFG '{}' has neither inputs nor outputs",
            ctx.sdfg.name()
        )));
    }

    let mut tsdfg = TranslatedJaxprSdfg {
        sdfg: ctx.sdfg.clone(),
        inp_names: inp_names.clone(),
        out_names: out_names.clone(),
    };
    let mut arg_names: Vec<String> = Vec::new();
    for name in inp_names.iter().chain(out_names) {
        if arg_names.contains(name) {
            continue;
        }
        let desc = tsdfg
            .sdfg
            .array_mut(name)
            .ok_or_else(|| JaceError::invariant(format!("argument '{name}' has no array")))?;
        desc.transient = false;
        arg_names.push(name.clone());
    }
    tsdfg.sdfg.set_arg_names(arg_names);

    if validate {
        tsdfg.validate()?;
    }
    Ok(tsdfg)
}

/// Embeds the translated `child` into `state` of the active context of `builder`.
///
/// The child is finalized without boundary stages, its inputs are bound to the outer
/// arrays `in_names` and its outputs to `out_names`, position by position.
pub fn add_nested_sdfg(
    builder: &mut TranslationBuilder,
    state: StateId,
    child: &TranslationContext,
    in_names: &[String],
    out_names: &[String],
) -> JaceResult<()> {
    let child_inputs = child.inp_names();
    let child_outputs = child.out_names();
    if child_inputs.len() != in_names.len() || child_outputs.len() != out_names.len() {
        return Err(JaceError::invariant(format!(
            "nested SDFG '{}' takes {} inputs and {} outputs, bound to {} and {}",
            child.sdfg().name(),
            child_inputs.len(),
            child_outputs.len(),
            in_names.len(),
            out_names.len()
        )));
    }
    let finalized = finalize_translation_context(child, true)?;
    let label = finalized.sdfg().name().to_string();

    let node = NestedSdfgNode {
        label,
        inputs: child_inputs.iter().cloned().zip(in_names.iter().cloned()).collect(),
        outputs: child_outputs.iter().cloned().zip(out_names.iter().cloned()).collect(),
        symbol_mapping: BTreeMap::new(),
        sdfg: Box::new(finalized.into_sdfg()),
    };
    builder.sdfg_mut()?.state_mut(state).add_nested_sdfg(node);
    Ok(())
}

/// Returns one array name per atom, materializing literals as constant arrays.
///
/// Constants are named `__const_{pattern}_literal_{i}` after their position in `atoms`.
pub fn promote_literals_to_constants(
    builder: &mut TranslationBuilder,
    names: &[Option<String>],
    atoms: &[Atom],
    pattern: &str,
) -> JaceResult<Vec<String>> {
    names
        .iter()
        .zip(atoms)
        .enumerate()
        .map(|(i, (name, atom))| match (name, atom) {
            (Some(name), _) => Ok(name.clone()),
            (None, Atom::Literal(lit)) => {
                let const_name = format!("{CONSTANT_PREFIX}{pattern}_literal_{i}");
                builder
                    .sdfg_mut()?
                    .add_constant(const_name.clone(), HostArray::from_scalar(lit.value()))?;
                Ok(const_name)
            }
            (None, Atom::Var(var)) => Err(JaceError::invariant(format!(
                "variable '{var}' was not resolved to an array"
            ))),
        })
        .collect()
}
