use thiserror::Error;

/// Engine error kinds surfaced to the embedding service.
///
/// Every variant maps to a stable kind so callers can render the
/// appropriate 4xx/5xx-equivalent response without string matching.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no data found for the requested period")]
    NoData,

    #[error("required service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("upstream returned malformed output: {0}")]
    UpstreamMalformed(String),

    #[error("storage failure: {0}")]
    Store(String),
}

/// Failures from an external oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle is not configured, not reachable, or timed out.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle answered but the payload does not conform to its contract.
    #[error("oracle returned malformed output: {0}")]
    Malformed(String),
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(msg) => EngineError::ServiceUnavailable(msg),
            OracleError::Malformed(msg) => EngineError::UpstreamMalformed(msg),
        }
    }
}
