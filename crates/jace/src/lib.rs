//! JIT front-end that lowers jaxprs into canonical SDFGs.
//!
//! A traced function is wrapped with [`jit`], lowered into a finalized SDFG for concrete
//! argument layouts and compiled by a registered [`backend::SdfgBackend`]. The translator
//! itself lives in [`translator`]; [`sdfg`] holds the graph model it targets.

pub use linkme;

mod api;
pub mod backend;
pub mod cache;
mod env;
pub mod error;
pub mod jaxpr;
pub mod optimization;
pub mod profiling;
pub mod sdfg;
pub mod stages;
pub mod translator;
pub mod value;

pub use api::{jit, JitOptions};
pub use error::{JaceError, JaceResult};
pub use optimization::{
    get_active_compiler_options, set_active_compiler_options, temporary_compiler_options,
    update_active_compiler_options, CompilerOptions, OptionValue, DEFAULT_OPTIMIZATIONS,
    NO_OPTIMIZATIONS,
};
pub use sdfg::DType;
pub use stages::{clear_translation_cache, JaceCompiled, JaceLowered, JaceWrapped};
pub use value::{HostArray, Scalar, ScalarValue, Value};
