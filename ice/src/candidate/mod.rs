
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::tcp_type::TcpType;

/// The single component this stack supports: RTP and RTCP are assumed
/// multiplexed onto one socket.
pub const COMPONENT_RTP: u16 = 1;

/// Local preference advertised when a candidate stands for every local
/// address at once (the wildcard checklist candidate).
pub const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Transport protocol of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateProtocol {
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcp")]
    Tcp,
}

impl Default for CandidateProtocol {
    fn default() -> Self {
        Self::Udp
    }
}

impl From<&str> for CandidateProtocol {
    fn from(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("tcp") {
            Self::Tcp
        } else {
            Self::Udp
        }
    }
}

impl fmt::Display for CandidateProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        };
        write!(f, "{s}")
    }
}

/// Type of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateType {
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl CandidateType {
    /// Type preference per RFC 8445 section 5.1.2.2.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay => 0,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Host => "host",
            Self::ServerReflexive => "srflx",
            Self::PeerReflexive => "prflx",
            Self::Relay => "relay",
        };
        write!(f, "{s}")
    }
}

/// Address precedence following the RFC 3484-bis ordering.
pub fn address_precedence(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 30,
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            if v6.is_loopback() {
                60
            } else if (seg[0] & 0xfe00) == 0xfc00 {
                // unique local fc00::/7
                50
            } else if v6.to_ipv4_mapped().is_some() {
                30
            } else if seg[0] == 0x2002 {
                // 6to4
                20
            } else if seg[0] == 0x2001 && seg[1] == 0 {
                // Teredo
                10
            } else if (seg[0] & 0xffc0) == 0xfec0 || v6.to_ipv4().is_some() {
                // deprecated site-local and v4-compatible forms
                1
            } else {
                40
            }
        }
    }
}

/// Local preference: interface preference in the high byte, address
/// precedence in the low byte, nudged by the relay protocol preference
/// (UDP over TCP).
pub fn local_preference(iface_pref: u8, ip: &IpAddr, server_protocol: CandidateProtocol) -> u16 {
    let relay_pref: u16 = match server_protocol {
        CandidateProtocol::Udp => 2,
        CandidateProtocol::Tcp => 1,
    };
    (((iface_pref as u16) << 8) | address_precedence(ip) as u16) + relay_pref
}

/// `(type_pref << 24) | (local_pref << 8) | (256 - component)`.
pub fn compute_priority(type_pref: u16, local_pref: u16, component: u16) -> u32 {
    (1 << 24) * u32::from(type_pref) + (1 << 8) * u32::from(local_pref)
        + (256 - u32::from(component))
}

fn foundation(
    candidate_type: CandidateType,
    address: &str,
    protocol: CandidateProtocol,
    server_protocol: CandidateProtocol,
) -> String {
    let mut buf = vec![];
    buf.extend_from_slice(candidate_type.to_string().as_bytes());
    buf.extend_from_slice(address.as_bytes());
    buf.extend_from_slice(protocol.to_string().as_bytes());
    buf.extend_from_slice(server_protocol.to_string().as_bytes());

    let checksum = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&buf);
    format!("{checksum}")
}

/// A transport address offered for connectivity (RFC 8445 section 5.3).
///
/// The textual `address` may be a hostname or an mDNS `.local` name;
/// `destination` stays unset until it resolves to a concrete endpoint, and
/// only resolved candidates enter the checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub candidate_type: CandidateType,
    pub protocol: CandidateProtocol,
    pub address: String,
    pub port: u16,
    pub priority: u32,
    pub foundation: String,
    pub component: u16,
    pub related_address: Option<String>,
    pub related_port: Option<u16>,
    pub tcp_type: TcpType,
    pub username_fragment: Option<String>,
    /// Resolved endpoint; `None` until the address is a concrete IP.
    pub destination: Option<SocketAddr>,
    /// Interned key of the ICE server that produced this candidate. The
    /// server table owns the record; the candidate only points at it.
    pub server_id: Option<usize>,
}

impl Candidate {
    fn new(
        candidate_type: CandidateType,
        protocol: CandidateProtocol,
        address: String,
        port: u16,
        priority: u32,
        server_protocol: CandidateProtocol,
    ) -> Self {
        let destination = address
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, port));
        Candidate {
            candidate_type,
            protocol,
            foundation: foundation(candidate_type, &address, protocol, server_protocol),
            address,
            port,
            priority,
            component: COMPONENT_RTP,
            related_address: None,
            related_port: None,
            tcp_type: TcpType::Unspecified,
            username_fragment: None,
            destination,
            server_id: None,
        }
    }

    /// A host candidate for one local interface address.
    pub fn host(ip: IpAddr, port: u16, iface_pref: u8, protocol: CandidateProtocol) -> Self {
        let local_pref = local_preference(iface_pref, &ip, CandidateProtocol::Udp);
        let priority = compute_priority(CandidateType::Host.preference(), local_pref, COMPONENT_RTP);
        Candidate::new(
            CandidateType::Host,
            protocol,
            ip.to_string(),
            port,
            priority,
            CandidateProtocol::Udp,
        )
    }

    /// The single host candidate standing for every local address, bound to
    /// the socket's wildcard address.
    pub fn wildcard_host(ip: IpAddr, port: u16) -> Self {
        let priority = compute_priority(
            CandidateType::Host.preference(),
            DEFAULT_LOCAL_PREFERENCE,
            COMPONENT_RTP,
        );
        Candidate::new(
            CandidateType::Host,
            CandidateProtocol::Udp,
            ip.to_string(),
            port,
            priority,
            CandidateProtocol::Udp,
        )
    }

    /// A server reflexive candidate discovered through a STUN Binding.
    pub fn server_reflexive(
        mapped: SocketAddr,
        base: SocketAddr,
        server_protocol: CandidateProtocol,
    ) -> Self {
        let local_pref = local_preference(255, &mapped.ip(), server_protocol);
        let priority = compute_priority(
            CandidateType::ServerReflexive.preference(),
            local_pref,
            COMPONENT_RTP,
        );
        let mut c = Candidate::new(
            CandidateType::ServerReflexive,
            CandidateProtocol::Udp,
            mapped.ip().to_string(),
            mapped.port(),
            priority,
            server_protocol,
        );
        c.related_address = Some(base.ip().to_string());
        c.related_port = Some(base.port());
        c
    }

    /// A peer reflexive candidate for a source address discovered through an
    /// incoming check.
    pub fn peer_reflexive(
        endpoint: SocketAddr,
        priority: Option<u32>,
        username_fragment: Option<String>,
    ) -> Self {
        let priority = priority.unwrap_or_else(|| {
            let local_pref = local_preference(255, &endpoint.ip(), CandidateProtocol::Udp);
            compute_priority(
                CandidateType::PeerReflexive.preference(),
                local_pref,
                COMPONENT_RTP,
            )
        });
        let mut c = Candidate::new(
            CandidateType::PeerReflexive,
            CandidateProtocol::Udp,
            endpoint.ip().to_string(),
            endpoint.port(),
            priority,
            CandidateProtocol::Udp,
        );
        c.username_fragment = username_fragment;
        c
    }

    /// A relay candidate for an address allocated on a TURN server.
    pub fn relay(
        relayed: SocketAddr,
        base: SocketAddr,
        server_protocol: CandidateProtocol,
        server_id: usize,
    ) -> Self {
        let local_pref = local_preference(255, &relayed.ip(), server_protocol);
        let priority =
            compute_priority(CandidateType::Relay.preference(), local_pref, COMPONENT_RTP);
        let mut c = Candidate::new(
            CandidateType::Relay,
            CandidateProtocol::Udp,
            relayed.ip().to_string(),
            relayed.port(),
            priority,
            server_protocol,
        );
        c.related_address = Some(base.ip().to_string());
        c.related_port = Some(base.port());
        c.server_id = Some(server_id);
        c
    }

    /// The resolved endpoint, if any. A candidate enters the checklist only
    /// once this is a concrete address.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.destination
    }

    pub fn set_endpoint(&mut self, addr: SocketAddr) {
        self.destination = Some(addr);
    }

    /// True for addresses that still need a DNS or mDNS lookup.
    pub fn needs_resolution(&self) -> bool {
        self.destination.is_none()
    }

    pub fn is_mdns(&self) -> bool {
        self.address.ends_with(".local")
    }

    /// Serialises to the SDP `candidate` attribute value.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        );

        if self.tcp_type != TcpType::Unspecified {
            val += &format!(" tcptype {}", self.tcp_type);
        }

        if let (Some(addr), Some(port)) = (&self.related_address, self.related_port) {
            val += &format!(" raddr {addr} rport {port}");
        }

        val += " generation 0";
        val
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}",
            self.candidate_type, self.protocol, self.address, self.port
        )
    }
}

/// Parses the SDP `candidate` attribute value, tolerating a leading
/// `candidate:` prefix and unknown trailing key/value pairs.
pub fn unmarshal_candidate(raw: &str) -> Result<Candidate> {
    let raw = raw.trim().trim_start_matches("candidate:");

    let split: Vec<&str> = raw.split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::ErrAttributeTooShortIceCandidate);
    }

    let foundation = split[0].to_owned();
    let component: u16 = split[1].parse().map_err(|_| Error::ErrParseComponent)?;
    let protocol = CandidateProtocol::from(split[2]);
    let priority: u32 = split[3].parse().map_err(|_| Error::ErrParsePriority)?;
    let address = split[4].to_owned();
    let port: u16 = split[5].parse().map_err(|_| Error::ErrParsePort)?;

    if split[6] != "typ" {
        return Err(Error::ErrUnknownCandidateType);
    }
    let candidate_type = match split[7] {
        "host" => CandidateType::Host,
        "srflx" => CandidateType::ServerReflexive,
        "prflx" => CandidateType::PeerReflexive,
        "relay" => CandidateType::Relay,
        _ => return Err(Error::ErrUnknownCandidateType),
    };

    let mut related_address = None;
    let mut related_port = None;
    let mut tcp_type = TcpType::Unspecified;
    let mut username_fragment = None;

    let mut rest = &split[8..];
    while rest.len() >= 2 {
        match rest[0] {
            "raddr" => related_address = Some(rest[1].to_owned()),
            "rport" => {
                related_port = Some(rest[1].parse().map_err(|_| Error::ErrParseRelatedAddr)?)
            }
            "tcptype" => tcp_type = TcpType::from(rest[1]),
            "ufrag" => username_fragment = Some(rest[1].to_owned()),
            // generation and any future extension are skipped
            _ => {}
        }
        rest = &rest[2..];
    }

    let destination = address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, port));

    Ok(Candidate {
        candidate_type,
        protocol,
        address,
        port,
        priority,
        foundation,
        component,
        related_address,
        related_port,
        tcp_type,
        username_fragment,
        destination,
        server_id: None,
    })
}

/// JSON initialisation form exchanged over signalling, mirroring the
/// RTCIceCandidateInit dictionary.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
    #[serde(rename = "usernameFragment")]
    pub username_fragment: String,
}

impl CandidateInit {
    /// Parses the embedded candidate line, folding in the dictionary-level
    /// username fragment when the line itself has none.
    pub fn to_candidate(&self) -> Result<Candidate> {
        let mut c = unmarshal_candidate(&self.candidate)?;
        if c.username_fragment.is_none() && !self.username_fragment.is_empty() {
            c.username_fragment = Some(self.username_fragment.clone());
        }
        Ok(c)
    }
}
