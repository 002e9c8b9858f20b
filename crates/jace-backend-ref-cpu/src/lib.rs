//! Reference backend that executes finalized SDFGs on the host.
//!
//! The backend does not generate code. [`RefCpuBackend::compile`] prepares the graph for
//! interpretation: tasklets are parsed once, nested graphs are prepared recursively and
//! every call then walks the state machine on the argument buffers.

mod expr;
mod interpreter;

use std::sync::Arc;

use jace::backend::{BackendResult, CompiledProgram, SdfgBackend};
use jace::sdfg::Sdfg;
use jace::CompilerOptions;

pub use interpreter::Program;

/// Name the backend registers under.
pub const BACKEND_NAME: &str = "cpu";

#[derive(Debug, Default, Clone, Copy)]
pub struct RefCpuBackend;

impl RefCpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SdfgBackend for RefCpuBackend {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn optimize(&self, sdfg: &mut Sdfg, options: &CompilerOptions) -> BackendResult<()> {
        if options.auto_optimize_enabled() {
            log::debug!(
                "{BACKEND_NAME}: no auto optimization passes for '{}'",
                sdfg.name()
            );
        }
        if options.persistent_transients_enabled() {
            log::debug!(
                "{BACKEND_NAME}: transients of '{}' are allocated per call, ignoring persistent_transients",
                sdfg.name()
            );
        }
        Ok(())
    }

    fn compile(&self, sdfg: &Sdfg) -> BackendResult<Box<dyn CompiledProgram>> {
        log::debug!(
            "{BACKEND_NAME}: preparing '{}' with {} states",
            sdfg.name(),
            sdfg.number_of_nodes()
        );
        Ok(Box::new(Program::compile(sdfg)?))
    }
}

/// Registers the backend with the global registry under [`BACKEND_NAME`].
///
/// Runs automatically the first time the registry is consulted; calling it again only
/// replaces the registration.
pub fn register() {
    jace::backend::register_backend(BACKEND_NAME, || {
        Arc::new(RefCpuBackend::new()) as Arc<dyn SdfgBackend>
    });
}

#[jace::linkme::distributed_slice(jace::backend::registry::BACKEND_REGISTRARS)]
static REGISTER_REF_CPU_BACKEND: fn() = register;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use jace::sdfg::{
        Condition, DataDescriptor, IndexExpr, MapRange, MappedTasklet, Memlet, Sdfg,
        SymbolOperand, SymbolValue,
    };
    use jace::{DType, HostArray};

    use super::*;

    fn argument(shape: Vec<usize>, dtype: DType) -> DataDescriptor {
        DataDescriptor {
            transient: false,
            ..DataDescriptor::array(shape, dtype)
        }
    }

    fn scale_sdfg() -> Sdfg {
        let mut sdfg = Sdfg::new("scale");
        let desc = argument(vec![2, 3], DType::F64);
        sdfg.add_array("x", desc.clone()).unwrap();
        sdfg.add_array("y", desc).unwrap();
        let state = sdfg.start_state();
        let index = || vec![IndexExpr::symbol("__i0"), IndexExpr::symbol("__i1")];
        sdfg.state_mut(state).add_mapped_tasklet(MappedTasklet {
            label: "mul".into(),
            ranges: vec![MapRange::new("__i0", 0, 2), MapRange::new("__i1", 0, 3)],
            inputs: BTreeMap::from([("__in0".to_string(), Memlet::element("x", index()))]),
            dynamic_inputs: BTreeMap::new(),
            code: "__out = __in0 * 2.0 + __i1".into(),
            outputs: BTreeMap::from([("__out".to_string(), Memlet::element("y", index()))]),
        });
        sdfg.set_arg_names(vec!["x".into(), "y".into()]);
        sdfg
    }

    #[test]
    fn runs_a_mapped_tasklet() {
        let program = RefCpuBackend.compile(&scale_sdfg()).unwrap();
        let mut args = BTreeMap::from([
            (
                "x".to_string(),
                HostArray::from_f64(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            ),
            ("y".to_string(), HostArray::zeros(DType::F64, vec![2, 3])),
        ]);
        program.call(&mut args).unwrap();
        assert_eq!(
            args["y"].to_f64_vec(),
            vec![2.0, 5.0, 8.0, 8.0, 11.0, 14.0]
        );
    }

    #[test]
    fn follows_conditional_edges() {
        let mut sdfg = Sdfg::new("branch");
        let scalar = argument(vec![1], DType::I64);
        sdfg.add_array("sel", scalar.clone()).unwrap();
        sdfg.add_array("out", scalar).unwrap();
        sdfg.add_symbol("s", DType::I64);
        let entry = sdfg.start_state();
        let left = sdfg.add_state("left");
        let right = sdfg.add_state("right");
        let out = || Memlet::element("out", vec![IndexExpr::constant(0)]);
        for (state, value) in [(left, "10"), (right, "20")] {
            sdfg.state_mut(state).add_mapped_tasklet(MappedTasklet {
                label: format!("write_{value}"),
                ranges: vec![MapRange::new("__i0", 0, 1)],
                inputs: BTreeMap::new(),
                dynamic_inputs: BTreeMap::new(),
                code: format!("__out = {value}"),
                outputs: BTreeMap::from([("__out".to_string(), out())]),
            });
        }
        let assignments = BTreeMap::from([(
            "s".to_string(),
            SymbolValue::Element(Memlet::element("sel", vec![IndexExpr::constant(0)])),
        )]);
        let dispatch = sdfg.add_state("dispatch");
        sdfg.add_edge(entry, dispatch, None, assignments);
        sdfg.add_edge(
            dispatch,
            left,
            Some(Condition::equals(SymbolOperand::Symbol("s".into()), 0)),
            BTreeMap::new(),
        );
        sdfg.add_edge(
            dispatch,
            right,
            Some(Condition::equals(SymbolOperand::Symbol("s".into()), 1)),
            BTreeMap::new(),
        );

        let program = RefCpuBackend.compile(&sdfg).unwrap();
        for (selector, expected) in [(0, 10), (1, 20)] {
            let mut args = BTreeMap::from([
                (
                    "sel".to_string(),
                    HostArray::from_i64(vec![1], vec![selector]).unwrap(),
                ),
                ("out".to_string(), HostArray::zeros(DType::I64, vec![1])),
            ]);
            program.call(&mut args).unwrap();
            assert_eq!(args["out"].to_i64_vec(), vec![expected]);
        }
    }

    #[test]
    fn missing_argument_is_an_execution_error() {
        let program = RefCpuBackend.compile(&scale_sdfg()).unwrap();
        let mut args = BTreeMap::new();
        let err = program.call(&mut args).unwrap_err();
        assert!(err.to_string().contains("without argument"));
    }
}
