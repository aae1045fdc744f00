#[cfg(test)]
mod url_test;

use std::borrow::Cow;
use std::fmt;

use crate::error::*;

/// Default port for STUN and TURN over plain UDP/TCP (RFC 7064/7065).
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Scheme of a configured ICE server URI.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum SchemeType {
    Stun,
    Stuns,
    Turn,
    Turns,
    Unknown,
}

impl Default for SchemeType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<&str> for SchemeType {
    fn from(raw: &str) -> Self {
        match raw {
            "stun" => Self::Stun,
            "stuns" => Self::Stuns,
            "turn" => Self::Turn,
            "turns" => Self::Turns,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Stun => "stun",
            Self::Stuns => "stuns",
            Self::Turn => "turn",
            Self::Turns => "turns",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Transport to the ICE server.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ProtoType {
    Udp,
    Tcp,
    Unknown,
}

impl Default for ProtoType {
    fn default() -> Self {
        Self::Udp
    }
}

impl From<&str> for ProtoType {
    fn from(raw: &str) -> Self {
        match raw {
            "udp" => Self::Udp,
            "tcp" => Self::Tcp,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ProtoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A parsed STUN (RFC 7064) or TURN (RFC 7065) URI:
/// `scheme:host[:port][?transport=udp|tcp]`.
///
/// The secure schemes parse but are rejected: this stack does not speak TLS
/// to ICE servers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    pub scheme: SchemeType,
    pub host: String,
    pub port: u16,
    pub proto: ProtoType,
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains("::") {
            "[".to_owned() + self.host.as_str() + "]"
        } else {
            self.host.clone()
        };
        if self.scheme == SchemeType::Turn {
            write!(
                f,
                "{}:{}:{}?transport={}",
                self.scheme, host, self.port, self.proto
            )
        } else {
            write!(f, "{}:{}:{}", self.scheme, host, self.port)
        }
    }
}

impl Url {
    /// Parses a single ICE server URI.
    pub fn parse_url(raw: &str) -> Result<Self> {
        // the url crate insists on "//" authority syntax these URIs lack
        if raw.contains("//") {
            return Err(Error::ErrInvalidUrl);
        }

        let mut s = raw.to_string();
        if let Some(p) = raw.find(':') {
            s.replace_range(p..=p, "://");
        } else {
            return Err(Error::ErrSchemeType);
        }

        let parts = url::Url::parse(&s)?;

        let scheme: SchemeType = parts.scheme().into();
        match scheme {
            SchemeType::Stun | SchemeType::Turn => {}
            SchemeType::Stuns | SchemeType::Turns => return Err(Error::ErrSchemeNotSupported),
            SchemeType::Unknown => return Err(Error::ErrSchemeType),
        }

        let host = parts
            .host_str()
            .ok_or(Error::ErrHost)?
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        if host.is_empty() {
            return Err(Error::ErrHost);
        }

        let port = parts.port().unwrap_or(DEFAULT_STUN_PORT);

        let mut q_args = parts.query_pairs();
        let proto = match scheme {
            SchemeType::Stun => {
                if q_args.count() > 0 {
                    return Err(Error::ErrStunQuery);
                }
                ProtoType::Udp
            }
            SchemeType::Turn => {
                if q_args.count() > 1 {
                    return Err(Error::ErrInvalidQuery);
                }
                if let Some((key, value)) = q_args.next() {
                    if key != Cow::Borrowed("transport") {
                        return Err(Error::ErrInvalidQuery);
                    }
                    let proto: ProtoType = value.as_ref().into();
                    if proto == ProtoType::Unknown {
                        return Err(Error::ErrProtoType);
                    }
                    proto
                } else {
                    ProtoType::Udp
                }
            }
            _ => unreachable!(),
        };

        Ok(Url {
            scheme,
            host,
            port,
            proto,
        })
    }

    /// Splits a comma-separated `urls` value and parses every entry.
    pub fn parse_urls(raw: &str) -> Result<Vec<Self>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse_url)
            .collect()
    }

    pub fn is_turn(&self) -> bool {
        self.scheme == SchemeType::Turn
    }
}
