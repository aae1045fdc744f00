use std::net::IpAddr;
use std::sync::Arc;

use util::vnet::net::Net;

use crate::dns::{DnsResolver, MdnsResolver};

/// One `ice_servers` entry: a comma-separated list of `stun:`/`turn:` URIs
/// sharing one set of credentials.
#[derive(Default, Debug, Clone)]
pub struct IceServerConfig {
    pub urls: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Which candidate paths the channel may use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportPolicy {
    /// Probe every pair.
    All,
    /// Only relayed pairs: STUN-only servers are ignored and direct peer
    /// binding requests are rejected.
    Relay,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self::All
    }
}

/// Configuration for an [`super::IceChannel`].
pub struct IceChannelConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub policy: TransportPolicy,

    /// Mode 1 versus Mode 2 host enumeration per
    /// draft-ietf-rtcweb-ip-handling: advertise every interface address, or
    /// only the default-route one.
    pub include_all_interface_addresses: bool,

    /// Binding hints for the single UDP socket.
    pub bind_address: Option<IpAddr>,
    pub bind_port: u16,
    pub port_range: Option<(u16, u16)>,

    /// Whether this agent decides nomination.
    pub is_controller: bool,

    /// Local credentials; generated when left empty.
    pub local_ufrag: String,
    pub local_pwd: String,

    /// Overridable collaborators, mainly for tests.
    pub dns_resolver: Option<Arc<dyn DnsResolver>>,
    pub mdns_resolver: Option<Arc<dyn MdnsResolver>>,
    pub net: Option<Arc<Net>>,
}

impl Default for IceChannelConfig {
    fn default() -> Self {
        IceChannelConfig {
            ice_servers: vec![],
            policy: TransportPolicy::All,
            include_all_interface_addresses: false,
            bind_address: None,
            bind_port: 0,
            port_range: None,
            is_controller: false,
            local_ufrag: String::new(),
            local_pwd: String::new(),
            dns_resolver: None,
            mdns_resolver: None,
            net: None,
        }
    }
}
