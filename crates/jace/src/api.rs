//! Entry points: [`jit`] and its option builder.

use crate::env;
use crate::error::{JaceError, JaceResult};
use crate::jaxpr::Traceable;
use crate::optimization::OptionValue;
use crate::stages::JaceWrapped;
use crate::translator::{get_registered_primitive_translators, PrimitiveTranslatorRegistry};

/// Wraps `fun` with the active translators and the default backend.
///
/// The active translator registry is snapshotted now; registering translators later does
/// not affect the returned wrapper.
pub fn jit<F: Traceable>(fun: F) -> JaceWrapped<F> {
    JaceWrapped::new(
        fun,
        None,
        get_registered_primitive_translators(),
        env::default_backend().to_string(),
    )
}

/// Options for [`JitOptions::jit`].
///
/// Option names accepted by [`JitOptions::with_option`] are `backend` and `name`; any
/// other name makes `jit` fail.
#[derive(Default)]
pub struct JitOptions {
    translators: Option<PrimitiveTranslatorRegistry>,
    backend: Option<String>,
    name: Option<String>,
    unsupported: Vec<String>,
}

impl JitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate with `registry` instead of a snapshot of the active registry.
    pub fn with_translators(mut self, registry: PrimitiveTranslatorRegistry) -> Self {
        self.translators = Some(registry);
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Name of the generated SDFG.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets an option by name.
    pub fn with_option(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        match (key, value.into()) {
            ("backend", OptionValue::Str(backend)) => self.backend = Some(backend),
            ("name", OptionValue::Str(name)) => self.name = Some(name),
            (key, value) => self.unsupported.push(format!("{key}={value}")),
        }
        self
    }

    pub fn jit<F: Traceable>(self, fun: F) -> JaceResult<JaceWrapped<F>> {
        if !self.unsupported.is_empty() {
            return Err(JaceError::unsupported(format!(
                "jit options {}",
                self.unsupported.join(", ")
            )));
        }
        Ok(JaceWrapped::new(
            fun,
            self.name,
            self.translators
                .unwrap_or_else(get_registered_primitive_translators),
            self.backend
                .unwrap_or_else(|| env::default_backend().to_string()),
        ))
    }
}
