#[cfg(test)]
mod tcp_type_test;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of an ICE TCP candidate (RFC 6544 section 4.5).
#[derive(PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum TcpType {
    /// The default; UDP candidates carry no tcptype.
    Unspecified,
    /// Initiates outgoing TCP connections.
    #[serde(rename = "active")]
    Active,
    /// Only accepts incoming TCP connections.
    #[serde(rename = "passive")]
    Passive,
    /// Simultaneous-open, both at once.
    #[serde(rename = "so")]
    SimultaneousOpen,
}

impl From<&str> for TcpType {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "passive" => Self::Passive,
            "so" => Self::SimultaneousOpen,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for TcpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Active => "active",
            Self::Passive => "passive",
            Self::SimultaneousOpen => "so",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

impl Default for TcpType {
    fn default() -> Self {
        Self::Unspecified
    }
}
