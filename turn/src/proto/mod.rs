pub mod channum;
pub mod connid;
pub mod data;
pub mod lifetime;
pub mod peeraddr;
pub mod relayaddr;
pub mod reqfamily;
pub mod reqtrans;

use std::fmt;

/// Protocol number carried by REQUESTED-TRANSPORT (IANA assigned).
#[derive(Default, PartialEq, Eq, Copy, Clone, Debug)]
pub struct Protocol(pub u8);

/// TCP protocol number.
pub const PROTO_TCP: Protocol = Protocol(6);
/// UDP protocol number. The only transport a relay allocation carries here.
pub const PROTO_UDP: Protocol = Protocol(17);

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = format!("{}", self.0);
        let s = match *self {
            PROTO_UDP => "UDP",
            PROTO_TCP => "TCP",
            _ => unknown.as_str(),
        };
        write!(f, "{s}")
    }
}
