
use std::fmt;

/// Connection state of the channel, advanced by the checklist engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unspecified,

    /// No remote credentials yet, no checks running.
    New,

    /// Remote credentials are set and pairs are being probed.
    Checking,

    /// A nominated pair is carrying traffic.
    Connected,

    /// The nominated pair went silent; checks keep running.
    Disconnected,

    /// Every pair failed, or the nominated pair stayed silent past the
    /// failed timeout.
    Failed,

    /// The channel was closed; terminal.
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::New,
            2 => Self::Checking,
            3 => Self::Connected,
            4 => Self::Disconnected,
            5 => Self::Failed,
            6 => Self::Closed,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

/// Gathering state of the channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GatheringState {
    Unspecified,

    /// Gathering was not started yet.
    New,

    /// Host enumeration or server transactions are still running.
    Gathering,

    /// Every local candidate that will ever be produced has been emitted.
    Complete,
}

impl Default for GatheringState {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl From<u8> for GatheringState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::New,
            2 => Self::Gathering,
            3 => Self::Complete,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::New => "new",
            Self::Gathering => "gathering",
            Self::Complete => "complete",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}
