use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Operand arity or type does not match the kind's parameter contract.
    /// Raised immediately at node construction, never deferred.
    #[error("Construction error for `{kind}`: {detail}")]
    Construct { kind: &'static str, detail: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Planning error: {0}")]
    Plan(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Add context to an error message.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match self {
            Error::Construct { kind, detail } => Error::Construct {
                kind,
                detail: format!("{ctx}: {detail}"),
            },
            Error::Schema(msg) => Error::Schema(format!("{ctx}: {msg}")),
            Error::Plan(msg) => Error::Plan(format!("{ctx}: {msg}")),
            Error::Hash(msg) => Error::Hash(format!("{ctx}: {msg}")),
            Error::Invariant(msg) => Error::Invariant(format!("{ctx}: {msg}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
