use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use jace::cache::ArgDescriptor;
use jace::jaxpr::{Atom, ClosedJaxpr, JaxprTracer, Traceable, Var};
use jace::profiling::cache_event_count;
use jace::{jit, CompilerOptions, DType, HostArray, JaceResult, JitOptions, Scalar, Value};

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    jace_backend_ref_cpu::register();
}

fn add(tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
    Ok(vec![tracer.binary("add", &args[0], &args[1])?.into()])
}

fn identity(_tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
    Ok(vec![Atom::from(&args[0])])
}

/// `A + B` that counts how often it is traced.
struct CountingAdd {
    traces: Arc<AtomicUsize>,
}

impl Traceable for CountingAdd {
    fn make_jaxpr(&self, args: &[ArgDescriptor]) -> JaceResult<ClosedJaxpr> {
        self.traces.fetch_add(1, Ordering::SeqCst);
        let mut tracer = JaxprTracer::new();
        let a = tracer.invar(args[0].shape.clone(), args[0].dtype);
        let b = tracer.invar(args[1].shape.clone(), args[1].dtype);
        let c = tracer.binary("add", &a, &b)?;
        tracer.finish(vec![c.into()])
    }
}

fn ramp(len: usize, scale: f64) -> HostArray {
    let data = (0..len).map(|i| i as f64 * scale).collect();
    HostArray::from_f64(vec![len], data).expect("valid ramp")
}

#[test]
fn wrapped_call_adds_without_retracing() -> Result<()> {
    setup();
    let traces = Arc::new(AtomicUsize::new(0));
    let wrapped = jit(CountingAdd {
        traces: Arc::clone(&traces),
    });

    let (a, b) = (ramp(6, 1.0), ramp(6, 0.5));
    let out = wrapped.call(&[a.clone().into(), b.clone().into()])?;
    assert_eq!(out.len(), 1);
    let expected: Vec<f64> = a
        .to_f64_vec()
        .iter()
        .zip(b.to_f64_vec())
        .map(|(x, y)| x + y)
        .collect();
    assert_eq!(out[0].to_f64_vec(), expected);
    assert_eq!(traces.load(Ordering::SeqCst), 1);

    let (c, d) = (ramp(6, -2.0), ramp(6, 3.0));
    let out = wrapped.call(&[c.into(), d.into()])?;
    assert_eq!(out[0].to_f64_vec(), ramp(6, 1.0).to_f64_vec());
    assert_eq!(traces.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn lowering_is_cached_on_argument_structure() -> Result<()> {
    setup();
    let wrapped = jit(add);
    let hits = cache_event_count("lowering_cache_hit");

    let first = wrapped.lower(&[ramp(4, 1.0).into(), ramp(4, 2.0).into()])?;
    let second = wrapped.lower(&[ramp(4, 7.0).into(), ramp(4, 9.0).into()])?;
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache_event_count("lowering_cache_hit") > hits);

    let ints = HostArray::from_i64(vec![4], vec![1, 2, 3, 4])?;
    let by_dtype = wrapped.lower(&[ints.clone().into(), ints.into()])?;
    assert!(!Arc::ptr_eq(&first, &by_dtype));

    let by_shape = wrapped.lower(&[ramp(5, 1.0).into(), ramp(5, 1.0).into()])?;
    assert!(!Arc::ptr_eq(&first, &by_shape));

    let strided = ramp(4, 1.0).relayout(vec![2])?;
    let by_layout = wrapped.lower(&[strided.into(), ramp(4, 1.0).into()])?;
    assert!(!Arc::ptr_eq(&first, &by_layout));

    // Another wrapper of the same function is another stage.
    let other = jit(add).lower(&[ramp(4, 1.0).into(), ramp(4, 2.0).into()])?;
    assert!(!Arc::ptr_eq(&first, &other));
    Ok(())
}

#[test]
fn compiling_never_mutates_the_lowered_graph() -> Result<()> {
    setup();
    let lowered = jit(add).lower(&[ramp(3, 1.0).into(), ramp(3, 1.0).into()])?;
    let lowered_states = lowered.as_sdfg().number_of_nodes();

    let optimized = lowered.compile(Some(&CompilerOptions::default_optimizations()))?;
    let plain = lowered.compile(Some(&CompilerOptions::no_optimizations()))?;
    assert!(!Arc::ptr_eq(&optimized, &plain));
    assert!(optimized.sdfg().number_of_nodes() < plain.sdfg().number_of_nodes());
    assert_eq!(plain.sdfg().number_of_nodes(), lowered_states);
    assert_eq!(lowered.as_sdfg().number_of_nodes(), lowered_states);

    let again = lowered.compile(Some(&CompilerOptions::default_optimizations()))?;
    assert!(Arc::ptr_eq(&optimized, &again));

    let args: Vec<Value> = vec![ramp(3, 1.0).into(), ramp(3, 2.0).into()];
    assert_eq!(
        optimized.call(&args)?[0].to_f64_vec(),
        plain.call(&args)?[0].to_f64_vec()
    );
    Ok(())
}

#[test]
fn identity_returns_a_copy() -> Result<()> {
    setup();
    let input = HostArray::from_i64(vec![2, 2], vec![4, 3, 2, 1])?;
    let out = jit(identity).call(&[input.clone().into()])?;
    assert_eq!(out[0].to_i64_vec(), input.to_i64_vec());
    assert_eq!(out[0].shape(), input.shape());
    assert_ne!(out[0].data_ptr(), input.data_ptr());
    Ok(())
}

#[test]
fn scalars_are_passed_and_returned_as_length_one_arrays() -> Result<()> {
    setup();
    fn scale(tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        Ok(vec![tracer.binary("mul", &args[0], &args[1])?.into()])
    }
    let out = jit(scale).call(&[ramp(3, 1.0).into(), Scalar::f64(2.5).into()])?;
    assert_eq!(out[0].to_f64_vec(), vec![0.0, 2.5, 5.0]);

    fn square(tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
        Ok(vec![tracer.binary("mul", &args[0], &args[0])?.into()])
    }
    let out = jit(square).call(&[Value::from(3i64)])?;
    assert_eq!(out[0].shape(), [1]);
    assert_eq!(out[0].to_i64_vec(), vec![9]);
    Ok(())
}

#[test]
fn compiled_stage_checks_its_arguments() -> Result<()> {
    setup();
    let lowered = jit(add).lower(&[ramp(3, 1.0).into(), ramp(3, 1.0).into()])?;
    let compiled = lowered.compile(None)?;

    assert!(compiled.call(&[ramp(3, 1.0).into()]).is_err());
    let wrong_dtype = HostArray::from_f32(vec![3], vec![1.0, 2.0, 3.0])?;
    assert!(compiled
        .call(&[wrong_dtype.into(), ramp(3, 1.0).into()])
        .is_err());
    let wrong_layout = ramp(3, 1.0).relayout(vec![2])?;
    assert!(compiled
        .call(&[wrong_layout.into(), ramp(3, 1.0).into()])
        .is_err());
    Ok(())
}

#[test]
fn tuples_can_not_be_lowered() -> Result<()> {
    setup();
    let err = jit(identity)
        .lower(&[Value::Tuple(vec![Value::from(1.0f64)])])
        .unwrap_err();
    assert!(matches!(err, jace::JaceError::CacheKey(_)), "{err}");
    Ok(())
}

#[test]
fn lowered_stage_exposes_its_graph() -> Result<()> {
    setup();
    let wrapped = JitOptions::new().with_name("adder").jit(add)?;
    let lowered = wrapped.lower(&[ramp(2, 1.0).into(), ramp(2, 1.0).into()])?;

    assert_eq!(lowered.as_sdfg().name(), "adder");
    assert_eq!(lowered.compiler_ir(None)?.sdfg().name(), "adder");
    assert_eq!(lowered.compiler_ir(Some("SDFG"))?.inp_names().len(), 2);
    assert!(lowered.compiler_ir(Some("mlir")).unwrap_err().is_unsupported());
    assert!(lowered.as_text().contains("adder"));
    assert!(lowered.as_html().contains("adder"));

    let compiled = lowered.compile(Some(&CompilerOptions::no_optimizations()))?;
    let text = compiled.as_text();
    assert!(text.starts_with("compiler options:"), "{text}");
    assert!(text.contains("\"simplify\": false"), "{text}");
    Ok(())
}

#[test]
fn jit_options_are_checked() -> Result<()> {
    setup();
    let err = JitOptions::new()
        .with_option("device", "gpu")
        .jit(add)
        .unwrap_err();
    assert!(err.is_unsupported());

    let wrapped = JitOptions::new().with_option("backend", "cpu").jit(add)?;
    assert_eq!(wrapped.backend_name(), "cpu");

    let missing = JitOptions::new().with_backend("no-such-backend").jit(add)?;
    let err = missing
        .lower(&[ramp(2, 1.0).into(), ramp(2, 1.0).into()])
        .unwrap_err();
    assert!(matches!(err, jace::JaceError::Backend(_)), "{err}");
    Ok(())
}

#[test]
fn sdfg_names_are_sanitized() -> Result<()> {
    setup();
    let wrapped = JitOptions::new().with_name("my fun<1>").jit(identity)?;
    let lowered = wrapped.lower(&[ramp(2, 1.0).into()])?;
    assert!(jace::translator::naming::is_valid_name(lowered.as_sdfg().name()));
    Ok(())
}
