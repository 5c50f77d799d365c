use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Upstream exhausted after {attempts} attempt(s): {last}")]
    UpstreamExhausted { attempts: usize, last: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
