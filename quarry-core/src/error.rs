use thiserror::Error;

/// Classes of failure the core distinguishes by behavior.
///
/// The variants travel inside [`anyhow::Error`] so callers keep the usual
/// context chains; code that must branch on the class downcasts to this enum.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Malformed or unsupported query shape. Raised before any I/O, never
    /// retried.
    #[error("cannot compile query: {0}")]
    Compile(String),
    /// Transient network or authentication failure while establishing a
    /// connection. Retried per the configured policy, then surfaced.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Failure reported by the database for a statement that reached it.
    #[error(transparent)]
    Statement(#[from] StatementError),
    /// A single statement cannot fit under the protocol parameter ceiling
    /// and cannot be split further.
    #[error("parameter limit exceeded: {0}")]
    ProtocolLimit(String),
}

/// Structured fields of a database-reported error, surfaced as-is.
#[derive(Debug, Default, Error)]
#[error("{message} (sqlstate {code})")]
pub struct StatementError {
    pub message: String,
    pub code: String,
    pub detail: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub constraint: Option<String>,
}

/// Shorthand for a [`QuarryError::Compile`] wrapped in [`anyhow::Error`].
pub fn compile_error(message: impl Into<String>) -> crate::Error {
    QuarryError::Compile(message.into()).into()
}

/// Shorthand for a [`QuarryError::ProtocolLimit`] wrapped in [`anyhow::Error`].
pub fn protocol_limit_error(message: impl Into<String>) -> crate::Error {
    QuarryError::ProtocolLimit(message.into()).into()
}

/// True when `error` carries a [`QuarryError::Compile`] at any depth.
pub fn is_compile_error(error: &crate::Error) -> bool {
    matches!(
        error.downcast_ref::<QuarryError>(),
        Some(QuarryError::Compile(..))
    )
}

/// True when `error` carries a [`QuarryError::ProtocolLimit`] at any depth.
pub fn is_protocol_limit_error(error: &crate::Error) -> bool {
    matches!(
        error.downcast_ref::<QuarryError>(),
        Some(QuarryError::ProtocolLimit(..))
    )
}
