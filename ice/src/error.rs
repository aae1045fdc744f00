use std::num::ParseIntError;
use std::{io, net};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    // configuration
    #[error("unknown scheme type")]
    ErrSchemeType,
    #[error("secure schemes (stuns/turns) are not supported")]
    ErrSchemeNotSupported,
    #[error("invalid url")]
    ErrInvalidUrl,
    #[error("invalid hostname")]
    ErrHost,
    #[error("invalid port number")]
    ErrPort,
    #[error("invalid transport protocol type")]
    ErrProtoType,
    #[error("queries not supported in stun address")]
    ErrStunQuery,
    #[error("invalid query")]
    ErrInvalidQuery,
    #[error("turn server requires username and credential")]
    ErrUsernameEmpty,
    #[error("too many ice servers configured")]
    ErrTooManyServers,

    // dns
    #[error("dns lookup timed out")]
    ErrDnsTimeout,
    #[error("host not found")]
    ErrHostNotFound,
    #[error("no mdns resolver configured")]
    ErrNoMdnsResolver,

    // channel lifecycle
    #[error("the channel is closed")]
    ErrClosed,
    #[error("gathering was already started")]
    ErrMultipleGatherAttempted,
    #[error("remote credentials are not set")]
    ErrNoRemoteCredentials,
    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,
    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,

    // candidates and checklist
    #[error("attribute not long enough to be ICE candidate")]
    ErrAttributeTooShortIceCandidate,
    #[error("could not parse component")]
    ErrParseComponent,
    #[error("could not parse priority")]
    ErrParsePriority,
    #[error("could not parse port")]
    ErrParsePort,
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("unknown candidate type")]
    ErrUnknownCandidateType,
    #[error("candidate address is not usable")]
    ErrCandidateAddrNotUsable,
    #[error("no candidate pairs available")]
    ErrNoCandidatePairs,

    // policy
    #[error("relay-only policy forbids a direct path")]
    ErrRelayPolicyViolation,

    // ice server
    #[error("ice server reached its error response limit")]
    ErrServerErrorLimit,
    #[error("ice server reached its request limit")]
    ErrServerRequestLimit,

    #[error("role conflict")]
    ErrRoleConflict,
    #[error("username mismatch")]
    ErrMismatchUsername,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse addr: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("{0}")]
    Stun(#[from] stun::Error),
    #[error("{0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("{0}")]
    Turn(#[from] turn::Error),
    #[error("{0}")]
    Json(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}
