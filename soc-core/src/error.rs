// soc-core/src/error.rs
//! Error types shared by the strength-of-connection stages.
//!
//! Only argument problems surface as errors. Numeric degeneracies (zero
//! diagonals, zero denominators, zero test-vector entries) are resolved to
//! documented values by the stage that meets them, and structural oddities are
//! reported as advisories next to the result.

#[derive(Debug, Clone, PartialEq)]
pub enum StrengthError {
    /// Parameter outside its declared range, unknown keyword, bad shape.
    InvalidArgument(String),
    /// Raw CSR parts that do not describe a valid matrix.
    Structure(String),
}

impl StrengthError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StrengthError::InvalidArgument(msg.into())
    }
}

impl std::fmt::Display for StrengthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrengthError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            StrengthError::Structure(e) => write!(f, "Invalid sparse structure: {}", e),
        }
    }
}

impl std::error::Error for StrengthError {}

pub type StrengthResult<T> = Result<T, StrengthError>;
