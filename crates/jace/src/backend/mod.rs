//! Seam between the front-end and the graph compiler.
//!
//! A backend takes a finalized SDFG, optionally optimizes it in place and turns it into a
//! [`CompiledProgram`] that is called with every argument of the graph by name. Backends
//! are looked up by name in the process-wide registry, see [`registry`].

pub mod registry;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::optimization::CompilerOptions;
use crate::sdfg::Sdfg;
use crate::value::HostArray;

pub use registry::{create_backend, has_backend, list_backends, register_backend};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
    #[error("no backend named '{name}' is registered, available: {available:?}")]
    UnknownBackend { name: String, available: Vec<String> },
}

impl BackendError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A graph compiler.
pub trait SdfgBackend: Send + Sync {
    /// Name the backend is registered under, e.g. `"cpu"`.
    fn backend_name(&self) -> &str;

    /// Backend specific optimizations, applied in place to a graph the caller owns.
    fn optimize(&self, _sdfg: &mut Sdfg, _options: &CompilerOptions) -> BackendResult<()> {
        Ok(())
    }

    fn compile(&self, sdfg: &Sdfg) -> BackendResult<Box<dyn CompiledProgram>>;
}

/// Native artifact produced by [`SdfgBackend::compile`].
pub trait CompiledProgram: Send + Sync {
    /// Runs the program. `args` holds one buffer per argument name of the graph; outputs
    /// are written into their buffers in place.
    fn call(&self, args: &mut BTreeMap<String, HostArray>) -> BackendResult<()>;
}
