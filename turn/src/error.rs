use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("allocation is not active")]
    ErrNoAllocation,
    #[error("allocation already active")]
    ErrAllocationExists,
    #[error("missing realm or nonce for authenticated request")]
    ErrMissingCredentialAttributes,
    #[error("no credentials configured for this server")]
    ErrNoCredentials,
    #[error("unexpected response type: {0}")]
    ErrUnexpectedResponse(String),
    #[error("no permission for peer")]
    ErrNoPermission,
    #[error("{0}")]
    Stun(#[from] stun::Error),
    #[error("{0}")]
    Other(String),
}
