use std::collections::BTreeMap;

use anyhow::Result;
use jace::jaxpr::{Atom, Equation, JaxprTracer, Params, Var};
use jace::sdfg::DType;
use jace::translator::{
    make_primitive_translator, PrimitiveTranslatorRegistry, TranslationBuilder, VarListOptions,
};
use jace::Scalar;

fn builder() -> TranslationBuilder {
    TranslationBuilder::new(PrimitiveTranslatorRegistry::with_builtins())
}

#[test]
fn unnamed_variables_follow_the_letter_sequence() -> Result<()> {
    let mut builder = builder();
    builder.push_context(Some("letters"))?;
    let mut names = Vec::new();
    for _ in 0..30 {
        let var = Var::new(vec![2], DType::F32);
        names.push(builder.add_array(&var, None, true)?);
    }
    let expected: Vec<String> = ('a'..='z')
        .map(String::from)
        .chain(["ba", "bb", "bc", "bd"].map(String::from))
        .collect();
    assert_eq!(names, expected);
    Ok(())
}

#[test]
fn forbidden_letter_names_get_a_prefix() -> Result<()> {
    let mut builder = builder();
    builder.push_context(Some("keywords"))?;
    let mut names = Vec::new();
    for _ in 0..94 {
        let var = Var::new(vec![2], DType::F32);
        names.push(builder.add_array(&var, None, true)?);
    }
    assert_eq!(names[91], "dn");
    assert_eq!(names[92], "__jace_forbidden_do");
    assert_eq!(names[93], "dp");
    Ok(())
}

#[test]
fn literals_are_rejected_where_variables_are_required() -> Result<()> {
    let mut builder = builder();
    builder.push_context(None)?;
    let atoms = [JaxprTracer::literal(Scalar::f64(1.0))];

    let err = builder
        .resolve_or_create(&atoms, VarListOptions::default())
        .unwrap_err();
    assert!(err.is_naming(), "{err}");

    let names = builder.resolve_or_create(
        &atoms,
        VarListOptions {
            allow_literals: true,
            ..VarListOptions::default()
        },
    )?;
    assert_eq!(names, vec![None]);
    Ok(())
}

#[test]
fn adding_a_mapped_variable_twice_fails() -> Result<()> {
    let mut builder = builder();
    builder.push_context(None)?;
    let var = Var::new(vec![3], DType::F64);
    let name = builder.add_array(&var, None, true)?;
    assert_eq!(name, "a");

    let err = builder.add_array(&var, None, true).unwrap_err();
    assert!(err.is_naming(), "{err}");

    // Re-mapping to the same name is allowed, to another name is not.
    builder.map_variable(&var, "a")?;
    let other = Var::new(vec![3], DType::F64);
    let other_name = builder.add_array(&other, None, false)?;
    let err = builder.map_variable(&var, &other_name).unwrap_err();
    assert!(err.is_naming(), "{err}");
    Ok(())
}

#[test]
fn scalars_become_arrays_of_length_one() -> Result<()> {
    let mut builder = builder();
    builder.push_context(None)?;
    let name = builder.add_array(&Var::new(vec![], DType::I32), Some("__tmp_"), false)?;
    assert_eq!(name, "__tmp_a");
    assert_eq!(builder.array(&name)?.shape, vec![1]);
    assert!(builder.array(&name)?.transient);
    Ok(())
}

#[test]
fn explicit_names_are_kept_and_forbidden_ones_rejected() -> Result<()> {
    let mut builder = builder();
    builder.push_context(None)?;
    let var = Var::named("weights", vec![4], DType::F32)?;
    assert_eq!(builder.add_array(&var, None, true)?, "weights");
    assert!(Var::named("while", vec![1], DType::F32).is_err());
    Ok(())
}

#[test]
fn equation_states_are_labelled_after_primitive_and_outputs() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![4], DType::F64);
    let y = tracer.invar(vec![4], DType::F64);
    let z = tracer.binary("add", &x, &y)?;
    let jaxpr = tracer.finish(vec![z.into()])?;

    let ctx = builder().translate(&jaxpr, Some("labels"))?;
    assert_eq!(ctx.inp_names(), ["a", "b"]);
    assert_eq!(ctx.out_names(), ["c"]);
    let labels: Vec<&str> = ctx
        .sdfg()
        .states()
        .map(|(_, state)| state.label.as_str())
        .collect();
    assert!(labels.contains(&"add_c"), "{labels:?}");
    assert_eq!(ctx.sdfg().state(ctx.terminal_state()).label, "add_c");
    Ok(())
}

#[test]
fn rank_mismatched_broadcasting_is_unsupported() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![2, 3], DType::F32);
    let y = tracer.invar(vec![4, 2, 3], DType::F32);
    let outs = tracer.push(
        "add",
        vec![x.into(), y.into()],
        vec![(vec![4, 2, 3], DType::F32)],
        Params::new(),
    );
    let jaxpr = tracer.finish(outs.into_iter().map(Atom::from).collect())?;

    let err = builder().translate(&jaxpr, None).unwrap_err();
    assert!(err.is_unsupported(), "{err}");
    assert!(err.to_string().contains("add"), "{err}");
    Ok(())
}

#[test]
fn mismatched_extents_are_unsupported() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![2, 3], DType::F32);
    let y = tracer.invar(vec![2, 4], DType::F32);
    let outs = tracer.push(
        "add",
        vec![x.into(), y.into()],
        vec![(vec![2, 3], DType::F32)],
        Params::new(),
    );
    let jaxpr = tracer.finish(outs.into_iter().map(Atom::from).collect())?;

    let err = builder().translate(&jaxpr, None).unwrap_err();
    assert!(err.is_unsupported(), "{err}");
    assert!(err.to_string().contains("[2, 4]"), "{err}");
    Ok(())
}

#[test]
fn size_one_dimensions_broadcast() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![2, 3], DType::F32);
    let y = tracer.invar(vec![1, 3], DType::F32);
    let z = tracer.binary("mul", &x, &y)?;
    let jaxpr = tracer.finish(vec![z.into()])?;
    let ctx = builder().translate(&jaxpr, None)?;
    assert_eq!(ctx.sdfg().array("c").map(|d| d.shape.clone()), Some(vec![2, 3]));
    Ok(())
}

#[test]
fn effectful_jaxprs_are_rejected() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![1], DType::F32);
    tracer.effect("io");
    let jaxpr = tracer.finish(vec![x.into()])?;
    let err = builder().translate(&jaxpr, None).unwrap_err();
    assert!(err.is_unsupported());
    Ok(())
}

#[test]
fn unregistered_primitives_are_unsupported() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![3], DType::F32);
    let y = tracer.unary("erf_inv", &x, Params::new());
    let jaxpr = tracer.finish(vec![y.into()])?;
    let err = builder().translate(&jaxpr, None).unwrap_err();
    assert!(err.is_unsupported(), "{err}");
    Ok(())
}

#[test]
fn equations_with_only_drop_outputs_are_skipped() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![3], DType::F32);
    let y = tracer.unary("neg", &x, Params::new());
    tracer.push_equation(Equation::new(
        "unknown_but_dropped",
        vec![x.clone().into()],
        vec![Var::drop(vec![3], DType::F32)],
        Params::new(),
    ));
    let jaxpr = tracer.finish(vec![y.into()])?;
    let ctx = builder().translate(&jaxpr, None)?;
    // initial state plus one equation state
    assert_eq!(ctx.sdfg().number_of_nodes(), 2);

    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![3], DType::F32);
    let kept = Var::new(vec![3], DType::F32);
    tracer.push_equation(Equation::new(
        "neg",
        vec![x.into()],
        vec![kept.clone(), Var::drop(vec![3], DType::F32)],
        Params::new(),
    ));
    let jaxpr = tracer.finish(vec![kept.into()])?;
    assert!(builder().translate(&jaxpr, None).is_err());
    Ok(())
}

#[test]
fn constants_are_materialized_before_the_first_equation() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![3], DType::F64);
    let c = tracer.constant(jace::HostArray::from_f64(vec![3], vec![1.0, 2.0, 3.0])?);
    let y = tracer.binary("add", &x, &c)?;
    let jaxpr = tracer.finish(vec![y.into()])?;
    let ctx = builder().translate(&jaxpr, None)?;

    let constants = ctx.sdfg().constants();
    assert_eq!(constants.len(), 1);
    let (name, value) = constants.iter().next().map(|(n, v)| (n.clone(), v.clone())).unwrap();
    assert!(name.starts_with("__const_"), "{name}");
    assert_eq!(value.to_f64_vec(), vec![1.0, 2.0, 3.0]);
    assert!(ctx.sdfg().array(&name).is_some_and(|d| d.transient));
    Ok(())
}

#[test]
fn nested_translation_does_not_disturb_the_outer_context() -> Result<()> {
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![2], DType::F32);
    let y = tracer.unary("abs", &x, Params::new());
    let inner = tracer.finish(vec![y.into()])?;

    let mut builder = builder();
    builder.push_context(Some("outer"))?;
    let outer_var = Var::new(vec![2], DType::F32);
    builder.add_array(&outer_var, None, true)?;
    assert!(builder.is_root_translator()?);

    let child = builder.translate(&inner, Some("inner"))?;
    assert_eq!(child.sdfg().name(), "inner");
    assert_eq!(builder.sdfg()?.name(), "outer");
    assert!(builder.is_root_translator()?);
    assert_eq!(builder.arrays()?.len(), 1);
    assert_eq!(builder.lookup(&outer_var)?, "a");

    builder.pop_context();
    assert!(!builder.is_allocated());
    Ok(())
}

#[test]
fn append_new_node_only_advances_from_the_terminal_state() -> Result<()> {
    let mut builder = builder();
    builder.push_context(None)?;
    let start = builder.start_state()?;
    let first = builder.append_new_node(Some("first"), None, BTreeMap::new(), None)?;
    assert_eq!(builder.terminal_state()?, first);

    let branch = builder.append_new_node(Some("branch"), None, BTreeMap::new(), Some(start))?;
    assert_ne!(branch, first);
    assert_eq!(builder.terminal_state()?, first);

    let err = builder
        .append_new_node(Some("not a label"), None, BTreeMap::new(), None)
        .unwrap_err();
    assert!(err.is_naming());
    Ok(())
}

#[test]
fn translators_must_report_moved_terminal_states() -> Result<()> {
    let mut registry = PrimitiveTranslatorRegistry::with_builtins();
    registry.register(
        make_primitive_translator("sneaky", |builder, _, _, _, _| {
            builder.append_new_node(Some("hidden"), None, BTreeMap::new(), None)?;
            Ok(None)
        }),
        false,
    )?;
    let mut tracer = JaxprTracer::new();
    let x = tracer.invar(vec![2], DType::F32);
    let y = tracer.unary("sneaky", &x, Params::new());
    let jaxpr = tracer.finish(vec![y.into()])?;

    let err = TranslationBuilder::new(registry)
        .translate(&jaxpr, None)
        .unwrap_err();
    assert!(err.is_invariant(), "{err}");
    Ok(())
}

#[test]
fn registering_twice_needs_overwrite() -> Result<()> {
    let mut registry = PrimitiveTranslatorRegistry::new();
    let noop = || make_primitive_translator("noop", |_, _, _, _, _| Ok(None));
    registry.register(noop(), false)?;
    assert!(registry.register(noop(), false).is_err());
    registry.register(noop(), true)?;
    assert_eq!(registry.primitives(), vec!["noop".to_string()]);
    Ok(())
}
