use std::fmt;

use crate::error::JaceResult;
use crate::optimization::CompilerOptions;
use crate::sdfg::Sdfg;
use crate::translator::CompiledJaxprSdfg;
use crate::value::{HostArray, Value};

/// A compiled program, the last stage of the pipeline.
///
/// Arguments must have the strides and storage the computation was lowered for.
pub struct JaceCompiled {
    compiled: CompiledJaxprSdfg,
    options: CompilerOptions,
}

impl JaceCompiled {
    pub(crate) fn new(compiled: CompiledJaxprSdfg, options: CompilerOptions) -> Self {
        Self { compiled, options }
    }

    /// Runs the program and returns the outputs in order.
    pub fn call(&self, args: &[Value]) -> JaceResult<Vec<HostArray>> {
        self.compiled.call(args)
    }

    /// The optimized graph the program was built from.
    pub fn sdfg(&self) -> &Sdfg {
        self.compiled.sdfg()
    }

    /// The resolved options the program was compiled with.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn as_text(&self) -> String {
        format!(
            "compiler options: {}\n{}",
            self.options.to_json(),
            self.compiled.sdfg()
        )
    }
}

impl fmt::Debug for JaceCompiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JaceCompiled")
            .field("compiled", &self.compiled)
            .field("options", &self.options)
            .finish()
    }
}
