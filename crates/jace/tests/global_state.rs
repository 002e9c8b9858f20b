//! Tests that touch process-wide state; they run one at a time.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use jace::jaxpr::{Atom, JaxprTracer, Var};
use jace::profiling::cache_event_count;
use jace::stages::translation_cache_sizes;
use jace::translator::{
    get_registered_primitive_translators, make_primitive_translator,
    register_primitive_translator, set_active_primitive_translators_to,
    PrimitiveTranslatorRegistry,
};
use jace::{
    clear_translation_cache, get_active_compiler_options, jit, set_active_compiler_options,
    temporary_compiler_options, update_active_compiler_options, CompilerOptions, HostArray,
    JaceResult, OptionValue, DEFAULT_OPTIMIZATIONS,
};

static GLOBAL_STATE: Mutex<()> = Mutex::new(());

fn sub(tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
    Ok(vec![tracer.binary("sub", &args[0], &args[1])?.into()])
}

fn pair() -> Result<[jace::Value; 2]> {
    Ok([
        HostArray::from_f64(vec![2], vec![5.0, 6.0])?.into(),
        HostArray::from_f64(vec![2], vec![1.0, 2.0])?.into(),
    ])
}

#[test]
fn temporary_options_are_restored() -> Result<()> {
    let _lock = GLOBAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
    let before = get_active_compiler_options(None);
    {
        let _guard = temporary_compiler_options(&CompilerOptions::new().with_simplify(false));
        let active = get_active_compiler_options(None);
        assert!(!active.simplify_enabled());
        assert_eq!(active.auto_optimize, before.auto_optimize);
    }
    assert_eq!(get_active_compiler_options(None), before);

    let previous = update_active_compiler_options(&CompilerOptions::new().with_extra("unroll", 4i64));
    assert_eq!(previous, before);
    assert_eq!(
        get_active_compiler_options(None).extra.get("unroll"),
        Some(&OptionValue::Int(4))
    );
    set_active_compiler_options(previous);
    assert_eq!(get_active_compiler_options(None), before);
    Ok(())
}

#[test]
fn compile_uses_the_active_options() -> Result<()> {
    let _lock = GLOBAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
    jace_backend_ref_cpu::register();
    let lowered = jit(sub).lower(&pair()?)?;

    let previous = set_active_compiler_options(DEFAULT_OPTIMIZATIONS.clone());
    let optimized = lowered.compile(None)?;
    assert!(optimized.options().simplify_enabled());
    {
        let _guard = temporary_compiler_options(&CompilerOptions::no_optimizations());
        let plain = lowered.compile(None)?;
        assert!(!plain.options().simplify_enabled());
        assert!(!Arc::ptr_eq(&optimized, &plain));
        assert_eq!(plain.call(&pair()?)?[0].to_f64_vec(), vec![4.0, 4.0]);
    }
    // Local options override the active ones.
    let local = lowered.compile(Some(&CompilerOptions::new().with_simplify(false)))?;
    assert!(!local.options().simplify_enabled());
    assert!(local.options().auto_optimize_enabled());
    set_active_compiler_options(previous);
    Ok(())
}

#[test]
fn clearing_the_cache_forces_new_stages() -> Result<()> {
    let _lock = GLOBAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
    jace_backend_ref_cpu::register();
    let wrapped = jit(sub);
    let first = wrapped.lower(&pair()?)?;
    let compiled = first.compile(None)?;
    let (lowerings, compilations) = translation_cache_sizes();
    assert!(lowerings >= 1 && compilations >= 1);

    clear_translation_cache();
    assert_eq!(translation_cache_sizes(), (0, 0));
    let misses = cache_event_count("lowering_cache_miss");
    let second = wrapped.lower(&pair()?)?;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(cache_event_count("lowering_cache_miss") > misses);
    assert!(!Arc::ptr_eq(&compiled, &second.compile(None)?));
    Ok(())
}

#[test]
fn translator_snapshots_are_independent() -> Result<()> {
    let _lock = GLOBAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
    jace_backend_ref_cpu::register();
    let snapshot = get_registered_primitive_translators();
    assert!(snapshot.contains("sub"));

    // Lower `sub` as `add` through an override in the active registry.
    let wrapped_before = jit(sub);
    register_primitive_translator(
        make_primitive_translator("sub", |builder, in_names, out_names, eqn, state| {
            let add = builder
                .registry()
                .get("add")
                .cloned()
                .ok_or_else(|| jace::JaceError::unsupported("add"))?;
            add.translate(builder, in_names, out_names, eqn, state)
        }),
        true,
    )?;
    let wrapped_after = jit(sub);
    let previous = set_active_primitive_translators_to(snapshot);
    assert!(previous.contains("sub"));

    assert_eq!(wrapped_before.call(&pair()?)?[0].to_f64_vec(), vec![4.0, 4.0]);
    assert_eq!(wrapped_after.call(&pair()?)?[0].to_f64_vec(), vec![6.0, 8.0]);

    let empty = jace::JitOptions::new()
        .with_translators(PrimitiveTranslatorRegistry::new())
        .jit(sub)?;
    assert!(empty.lower(&pair()?).unwrap_err().is_unsupported());
    Ok(())
}
