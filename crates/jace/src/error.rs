//! Error taxonomy shared by the translator, the cache and the stage pipeline.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised while lowering, compiling or calling a jitted function.
///
/// Nothing inside the crate catches and retries one of these; they always travel to the
/// immediate caller. [`JaceError::Equation`] only adds the offending equation as context,
/// use [`JaceError::root`] to look at the underlying category.
#[derive(Debug, Error)]
pub enum JaceError {
    /// A combination of inputs that is not supported yet.
    #[error("not supported: {0}")]
    Unsupported(String),
    /// Name collision, conflicting re-mapping or use of a forbidden name.
    #[error("naming error: {0}")]
    Naming(String),
    /// Bookkeeping inconsistency detected inside the builder or a translator.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// A finalized or canonical graph failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A call argument whose structure can not be described abstractly.
    #[error("can not describe argument: {0}")]
    CacheKey(String),
    /// Call arguments that do not match the compiled signature.
    #[error("invalid argument: {0}")]
    Argument(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("while translating `{equation}`: {source}")]
    Equation {
        equation: String,
        #[source]
        source: Box<JaceError>,
    },
}

impl JaceError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        JaceError::Unsupported(message.into())
    }

    pub fn naming(message: impl Into<String>) -> Self {
        JaceError::Naming(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        JaceError::Invariant(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        JaceError::Validation(message.into())
    }

    pub fn cache_key(message: impl Into<String>) -> Self {
        JaceError::CacheKey(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        JaceError::Argument(message.into())
    }

    /// Wraps `self` with the textual form of the equation that raised it.
    pub fn in_equation(self, equation: impl Into<String>) -> Self {
        JaceError::Equation {
            equation: equation.into(),
            source: Box::new(self),
        }
    }

    /// Strips any equation context and returns the error that was raised originally.
    pub fn root(&self) -> &JaceError {
        let mut current = self;
        while let JaceError::Equation { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), JaceError::Unsupported(_))
    }

    pub fn is_naming(&self) -> bool {
        matches!(self.root(), JaceError::Naming(_))
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self.root(), JaceError::Invariant(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), JaceError::Validation(_))
    }
}

/// Convenience alias used throughout the crate.
pub type JaceResult<T> = Result<T, JaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_nested_equation_context() {
        let err = JaceError::unsupported("rank mismatch")
            .in_equation("c = add a b")
            .in_equation("d = pjit c");
        assert!(err.is_unsupported());
        assert!(!err.is_naming());
        let text = err.to_string();
        assert!(text.contains("d = pjit c"), "{text}");
    }
}
