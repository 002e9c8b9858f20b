use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use jace::backend::registry::{create_backend, has_backend, list_backends, register_backend};
use jace::backend::{BackendError, BackendResult, CompiledProgram, SdfgBackend};
use jace::jaxpr::{Atom, JaxprTracer, Params, Var};
use jace::sdfg::Sdfg;
use jace::{CompilerOptions, HostArray, JaceResult, JitOptions};

#[test]
fn ref_cpu_backend_is_registered() -> Result<()> {
    jace_backend_ref_cpu::register();

    assert!(has_backend("cpu"), "cpu backend not registered");
    assert!(list_backends().contains(&"cpu".to_string()));
    let backend = create_backend("cpu")?;
    assert_eq!(backend.backend_name(), jace_backend_ref_cpu::BACKEND_NAME);

    assert!(!has_backend("nonexistent"));
    match create_backend("nonexistent") {
        Err(BackendError::UnknownBackend { name, available }) => {
            assert_eq!(name, "nonexistent");
            assert!(available.contains(&"cpu".to_string()));
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("nonexistent backend was created"),
    }
    Ok(())
}

/// Refuses to compile anything.
struct RefusingBackend;

impl SdfgBackend for RefusingBackend {
    fn backend_name(&self) -> &str {
        "refusing"
    }

    fn compile(&self, sdfg: &Sdfg) -> BackendResult<Box<dyn CompiledProgram>> {
        Err(BackendError::unimplemented(
            "compile",
            format!("'{}' is not accepted", sdfg.name()),
        ))
    }
}

fn neg(tracer: &mut JaxprTracer, args: &[Var]) -> JaceResult<Vec<Atom>> {
    Ok(vec![tracer.unary("neg", &args[0], Params::new()).into()])
}

#[test]
fn backend_errors_surface_from_compile() -> Result<()> {
    register_backend("refusing", || Arc::new(RefusingBackend) as Arc<dyn SdfgBackend>);
    let wrapped = JitOptions::new().with_backend("refusing").jit(neg)?;
    let x = HostArray::from_f64(vec![2], vec![1.0, -1.0])?;
    let lowered = wrapped.lower(&[x.into()])?;
    let err = lowered.compile(None).unwrap_err();
    assert!(matches!(err, jace::JaceError::Backend(BackendError::Unimplemented { .. })));
    Ok(())
}

static SEEN_PERSISTENT_TRANSIENTS: Mutex<Option<bool>> = Mutex::new(None);

/// Remembers the `persistent_transients` it was optimized with, then refuses to compile.
struct RecordingBackend;

impl SdfgBackend for RecordingBackend {
    fn backend_name(&self) -> &str {
        "recording"
    }

    fn optimize(&self, _sdfg: &mut Sdfg, options: &CompilerOptions) -> BackendResult<()> {
        *SEEN_PERSISTENT_TRANSIENTS.lock().unwrap() = Some(options.persistent_transients_enabled());
        Ok(())
    }

    fn compile(&self, sdfg: &Sdfg) -> BackendResult<Box<dyn CompiledProgram>> {
        Err(BackendError::unimplemented("compile", sdfg.name()))
    }
}

#[test]
fn persistent_transients_reach_the_backend() -> Result<()> {
    register_backend("recording", || Arc::new(RecordingBackend) as Arc<dyn SdfgBackend>);
    let wrapped = JitOptions::new().with_backend("recording").jit(neg)?;
    let x = HostArray::from_f64(vec![2], vec![1.0, -1.0])?;
    let lowered = wrapped.lower(&[x.into()])?;

    let options = CompilerOptions::new().with_persistent_transients(true);
    assert!(lowered.compile(Some(&options)).is_err());
    assert_eq!(*SEEN_PERSISTENT_TRANSIENTS.lock().unwrap(), Some(true));

    let options = CompilerOptions::new().with_persistent_transients(false);
    assert!(lowered.compile(Some(&options)).is_err());
    assert_eq!(*SEEN_PERSISTENT_TRANSIENTS.lock().unwrap(), Some(false));
    Ok(())
}

#[test]
fn ref_cpu_programs_run_standalone() -> Result<()> {
    jace_backend_ref_cpu::register();
    let wrapped = JitOptions::new().with_backend("cpu").jit(neg)?;
    let x = HostArray::from_f64(vec![2], vec![1.0, -1.0])?;
    let lowered = wrapped.lower(&[x.clone().into()])?;

    let program = create_backend("cpu")?.compile(lowered.as_sdfg())?;
    let mut args = BTreeMap::new();
    args.insert(lowered.compiler_ir(None)?.inp_names()[0].clone(), x);
    let out_name = lowered.compiler_ir(None)?.out_names()[0].clone();
    args.insert(out_name.clone(), HostArray::zeros(jace::DType::F64, vec![2]));
    program.call(&mut args)?;
    assert_eq!(args[&out_name].to_f64_vec(), vec![-1.0, 1.0]);
    Ok(())
}
