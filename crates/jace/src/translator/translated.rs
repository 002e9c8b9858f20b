use std::collections::BTreeMap;
use std::fmt;

use crate::backend::{CompiledProgram, SdfgBackend};
use crate::error::{JaceError, JaceResult};
use crate::sdfg::{DataDescriptor, Sdfg, StorageType};
use crate::value::{HostArray, Value};

/// A finalized graph with an explicit calling convention.
///
/// Unlike the canonical graph inside a [`super::TranslationContext`]:
/// - inputs are read from the arrays named in `inp_names`, outputs are written to the
///   arrays named in `out_names`, both in jaxpr order;
/// - exactly those arrays are non-transient;
/// - `arg_names` of the graph is `inp_names` followed by `out_names`, a name that is both
///   input and output is listed once, as input.
///
/// Obtain one through [`super::post_translation::finalize_translation_context`] or
/// [`super::post_translation::postprocess_jaxpr_sdfg`].
#[derive(Debug, Clone)]
pub struct TranslatedJaxprSdfg {
    pub(crate) sdfg: Sdfg,
    pub(crate) inp_names: Vec<String>,
    pub(crate) out_names: Vec<String>,
}

impl TranslatedJaxprSdfg {
    pub fn sdfg(&self) -> &Sdfg {
        &self.sdfg
    }

    pub fn sdfg_mut(&mut self) -> &mut Sdfg {
        &mut self.sdfg
    }

    pub fn inp_names(&self) -> &[String] {
        &self.inp_names
    }

    pub fn out_names(&self) -> &[String] {
        &self.out_names
    }

    pub fn into_sdfg(self) -> Sdfg {
        self.sdfg
    }

    pub fn validate(&self) -> JaceResult<()> {
        let transient = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter(|name| self.sdfg.array(name).map_or(true, |desc| desc.transient))
                .cloned()
                .collect()
        };
        let inputs = transient(&self.inp_names);
        if !inputs.is_empty() {
            return Err(JaceError::validation(format!(
                "SDFG '{}': found transient inputs {inputs:?}",
                self.sdfg.name()
            )));
        }
        let outputs = transient(&self.out_names);
        if !outputs.is_empty() {
            return Err(JaceError::validation(format!(
                "SDFG '{}': found transient outputs {outputs:?}",
                self.sdfg.name()
            )));
        }
        let free = self.sdfg.free_symbols();
        if !free.is_empty() {
            return Err(JaceError::validation(format!(
                "SDFG '{}': found free symbols {free:?}",
                self.sdfg.name()
            )));
        }
        self.sdfg.validate()
    }
}

impl fmt::Display for TranslatedJaxprSdfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sdfg)
    }
}

/// A [`TranslatedJaxprSdfg`] turned into a callable program by a backend.
///
/// Outputs are allocated anew on every call, scalars come back as arrays of length one.
/// Arguments must have the strides and storage that were used for lowering.
pub struct CompiledJaxprSdfg {
    program: Box<dyn CompiledProgram>,
    sdfg: Sdfg,
    inp_names: Vec<String>,
    out_names: Vec<String>,
}

impl CompiledJaxprSdfg {
    /// The graph the program was compiled from.
    pub fn sdfg(&self) -> &Sdfg {
        &self.sdfg
    }

    pub fn inp_names(&self) -> &[String] {
        &self.inp_names
    }

    pub fn out_names(&self) -> &[String] {
        &self.out_names
    }

    /// Runs the program on `args`, given in the order of `inp_names`.
    pub fn call(&self, args: &[Value]) -> JaceResult<Vec<HostArray>> {
        if args.len() != self.inp_names.len() {
            return Err(JaceError::argument(format!(
                "'{}' takes {} arguments, got {}",
                self.sdfg.name(),
                self.inp_names.len(),
                args.len()
            )));
        }

        let mut call_args: BTreeMap<String, HostArray> = BTreeMap::new();
        for (name, value) in self.inp_names.iter().zip(args) {
            let desc = self.descriptor(name)?;
            let array = match value {
                Value::Array(array) if array.shape().is_empty() => array.reshape(vec![1])?,
                Value::Array(array) => array.clone(),
                Value::Scalar(scalar) => HostArray::from_scalar(*scalar),
                Value::Tuple(_) => {
                    return Err(JaceError::argument(format!(
                        "argument '{name}' is a tuple"
                    )))
                }
            };
            check_argument(name, &array, desc)?;
            call_args.insert(name.clone(), array);
        }
        for name in &self.out_names {
            if !call_args.contains_key(name) {
                let desc = self.descriptor(name)?;
                call_args.insert(name.clone(), HostArray::for_descriptor(desc));
            }
        }
        if call_args.len() != self.sdfg.arg_names().len() {
            return Err(JaceError::invariant(format!(
                "built {} call arguments for '{}', expected {:?}",
                call_args.len(),
                self.sdfg.name(),
                self.sdfg.arg_names()
            )));
        }

        self.program.call(&mut call_args)?;

        self.out_names
            .iter()
            .map(|name| {
                call_args.get(name).cloned().ok_or_else(|| {
                    JaceError::invariant(format!("program dropped output '{name}'"))
                })
            })
            .collect()
    }

    fn descriptor(&self, name: &str) -> JaceResult<&DataDescriptor> {
        self.sdfg
            .array(name)
            .ok_or_else(|| JaceError::invariant(format!("argument '{name}' has no array")))
    }
}

fn check_argument(name: &str, array: &HostArray, desc: &DataDescriptor) -> JaceResult<()> {
    if array.dtype() != desc.dtype || array.len() != desc.element_count() {
        return Err(JaceError::argument(format!(
            "argument '{name}' is {}{:?}, expected {desc}",
            array.dtype(),
            array.shape()
        )));
    }
    let layout_matches = array.shape() == desc.shape.as_slice()
        && (array.len() <= 1 || array.strides() == desc.strides.as_slice());
    if !layout_matches {
        return Err(JaceError::argument(format!(
            "argument '{name}' has shape {:?} and strides {:?}, lowered for {:?} and {:?}",
            array.shape(),
            array.strides(),
            desc.shape,
            desc.strides
        )));
    }
    let storage_matches = matches!(desc.storage, StorageType::Default)
        || array.storage() == desc.storage;
    if !storage_matches {
        return Err(JaceError::argument(format!(
            "argument '{name}' lives in {:?}, lowered for {:?}",
            array.storage(),
            desc.storage
        )));
    }
    Ok(())
}

impl fmt::Debug for CompiledJaxprSdfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledJaxprSdfg")
            .field("sdfg", &self.sdfg.name())
            .field("inp_names", &self.inp_names)
            .field("out_names", &self.out_names)
            .finish()
    }
}

/// Compiles a deep copy of `tsdfg` with `backend`.
///
/// Graphs without inputs and outputs, with `__return` arrays or with free symbols are
/// rejected.
pub fn compile_jaxpr_sdfg(
    tsdfg: &TranslatedJaxprSdfg,
    backend: &dyn SdfgBackend,
) -> JaceResult<CompiledJaxprSdfg> {
    if tsdfg.inp_names.is_empty() && tsdfg.out_names.is_empty() {
        return Err(JaceError::argument(format!(
            "SDFG '{}' has neither inputs nor outputs",
            tsdfg.sdfg.name()
        )));
    }
    if let Some(name) = tsdfg
        .sdfg
        .arrays()
        .keys()
        .find(|name| name.starts_with("__return"))
    {
        return Err(JaceError::unsupported(format!(
            "SDFG '{}' uses the return array '{name}'",
            tsdfg.sdfg.name()
        )));
    }
    let free = tsdfg.sdfg.free_symbols();
    if !free.is_empty() {
        return Err(JaceError::unsupported(format!(
            "SDFG '{}' has free symbols {free:?}",
            tsdfg.sdfg.name()
        )));
    }

    let sdfg = tsdfg.sdfg.clone();
    log::debug!(
        "compiling '{}' with backend '{}'",
        sdfg.name(),
        backend.backend_name()
    );
    let program = backend.compile(&sdfg)?;
    Ok(CompiledJaxprSdfg {
        program,
        sdfg,
        inp_names: tsdfg.inp_names.clone(),
        out_names: tsdfg.out_names.clone(),
    })
}
