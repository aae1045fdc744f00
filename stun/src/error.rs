use std::string::FromUtf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The buffer is shorter than a message header or the header fields
    /// are inconsistent with the buffer length.
    #[error("malformed STUN header")]
    ErrMalformedHeader,
    /// The magic cookie is not 0x2112A442.
    #[error("invalid magic cookie")]
    ErrBadMagicCookie,
    /// An attribute TLV claims more bytes than the message holds.
    #[error("truncated attribute")]
    ErrTruncatedAttribute,
    /// An address attribute carries a family other than IPv4 or IPv6.
    #[error("unsupported address family")]
    ErrUnsupportedFamily,
    #[error("attribute not found")]
    ErrAttributeNotFound,
    #[error("attribute size is invalid")]
    ErrAttributeSizeInvalid,
    #[error("attribute size overflow")]
    ErrAttributeSizeOverflow,
    #[error("integrity check failed")]
    ErrIntegrityMismatch,
    #[error("fingerprint check failed")]
    ErrFingerprintMismatch,
    #[error("FINGERPRINT before MESSAGE-INTEGRITY attribute")]
    ErrFingerprintBeforeIntegrity,
    #[error("no default reason for error code")]
    ErrNoDefaultReason,
    #[error("unexpected EOF")]
    ErrUnexpectedEof,
    #[error("utf8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("{0}")]
    Other(String),
}
