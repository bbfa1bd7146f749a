use thiserror::Error;

/// Request-scoped failure taxonomy for the gateway pipeline.
///
/// Every variant maps to exactly one HTTP status through [`status_code`];
/// the body rendered for any of them is a single `{"error": message}`
/// object. Extension load failures never reach a request — they are logged
/// and swallowed during registry rebuilds — but the variant exists so a
/// rebuild can report them uniformly.
///
/// [`status_code`]: GatewayError::status_code
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown approach: {0}")]
    UnknownApproach(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("'none' approach cannot be combined with other approaches")]
    InvalidCombination,

    #[error("{0}")]
    Authentication(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("no usable backend credentials: {0}")]
    Configuration(String),

    #[error("extension load failed for '{slug}': {message}")]
    ExtensionLoad { slug: String, message: String },
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Authentication(_) => 401,
            GatewayError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
