use std::fmt::{Display, Formatter};

/// Result alias for operations that can fail with a [`FitError`].
pub type FitResult<T> = Result<T, FitError>;

/// Result alias for model-definition parsing.
pub type ParseResult<T> = Result<T, FitError>;

/// Result alias for forward-model and optimizer computations.
pub type ComputeResult<T> = Result<T, FitError>;

/// The failure category of a [`FitError`], mapped onto process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitErrorCategory {
    /// Bad command-line arguments or a malformed model definition.
    InputValidation,
    /// File system and stream failures.
    IoSystem,
    /// Numerical failures raised while computing (eigensolver breakdown,
    /// constraint-exhaustion underflow).
    ComputationError,
    /// Everything that should not happen.
    InternalError,
}

impl FitErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation => 10,
            Self::IoSystem => 20,
            Self::ComputationError => 20,
            Self::InternalError => 30,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::InputValidation => "input validation error",
            Self::IoSystem => "io error",
            Self::ComputationError => "computation error",
            Self::InternalError => "internal error",
        }
    }
}

/// Structured error carried through the core. Every error names a stable
/// placeholder code (`INPUT.*`, `IO.*`, `RUN.*`, `SYS.*`) so front-ends and
/// tests can match failures without parsing prose.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{placeholder}: {message}")]
pub struct FitError {
    category: FitErrorCategory,
    placeholder: String,
    message: String,
}

impl FitError {
    pub fn input_validation(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::InputValidation, placeholder, message)
    }

    pub fn io_system(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::IoSystem, placeholder, message)
    }

    pub fn computation(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FitErrorCategory::InternalError, placeholder, message)
    }

    fn new(
        category: FitErrorCategory,
        placeholder: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder: placeholder.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> FitErrorCategory {
        self.category
    }

    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The one-line diagnostic written to standard error.
    pub fn diagnostic_line(&self) -> String {
        format!(
            "specinv: {} [{}]: {}",
            self.category.label(),
            self.placeholder,
            self.message
        )
    }
}

impl Display for FitErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::{FitError, FitErrorCategory};

    #[test]
    fn categories_map_to_contract_exit_codes() {
        assert_eq!(FitErrorCategory::InputValidation.exit_code(), 10);
        assert_eq!(FitErrorCategory::IoSystem.exit_code(), 20);
        assert_eq!(FitErrorCategory::ComputationError.exit_code(), 20);
        assert_eq!(FitErrorCategory::InternalError.exit_code(), 30);
    }

    #[test]
    fn constructors_preserve_placeholder_and_message() {
        let error = FitError::input_validation("INPUT.MODEL_SYNTAX", "unexpected token '}'");
        assert_eq!(error.category(), FitErrorCategory::InputValidation);
        assert_eq!(error.placeholder(), "INPUT.MODEL_SYNTAX");
        assert_eq!(error.exit_code(), 10);
        assert_eq!(
            error.to_string(),
            "INPUT.MODEL_SYNTAX: unexpected token '}'"
        );
    }

    #[test]
    fn diagnostic_line_names_category_and_code() {
        let error = FitError::io_system("IO.DATA_READ", "failed to read 'section.dat'");
        assert_eq!(
            error.diagnostic_line(),
            "specinv: io error [IO.DATA_READ]: failed to read 'section.dat'"
        );
    }
}
