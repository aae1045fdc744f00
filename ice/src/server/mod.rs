#[cfg(test)]
mod server_test;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use stun::attributes::ATTR_SOFTWARE;
use stun::error_code::ErrorCodeAttribute;
use stun::fingerprint::FINGERPRINT;
use stun::message::*;
use stun::textattrs::TextAttribute;
use stun::xoraddr::XorMappedAddress;
use turn::client::{Allocation, AllocationConfig};
use turn::proto::lifetime::DEFAULT_LIFETIME;

use crate::candidate::CandidateProtocol;
use crate::error::*;
use crate::url::{ProtoType, Url};

/// Requests sent without any response before the server is given up on.
pub const MAX_REQUESTS_PER_SERVER: u32 = 25;

/// Error responses tolerated before the server is given up on.
pub const MAX_ERROR_RESPONSES: u32 = 3;

/// Upper bound on configured servers; the id doubles as a transaction-id
/// digit.
pub const MAX_ICE_SERVERS: usize = 10;

/// Interval between request retransmissions towards a server.
pub const SERVER_RETRY_INTERVAL: Duration = Duration::from_millis(500);

// Stamped in front of the server id so responses demultiplex to the right
// server table entry on prefix alone.
const TRANSACTION_ID_PREFIX: &[u8; 5] = b"91245";

const SOFTWARE: &str = "rtcice";

/// Progress of one configured STUN/TURN server.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceServerState {
    /// The URI still needs a DNS answer.
    Unresolved,
    /// A lookup is in flight.
    Resolving,
    /// Endpoint known, initial request not sent yet.
    Resolved,
    /// STUN Binding in flight.
    Binding,
    /// TURN Allocate in flight.
    Allocating,
    /// Produced its candidates; keeps the allocation refreshed.
    Usable,
    /// Terminal.
    Failed,
}

impl fmt::Display for IceServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Unresolved => "unresolved",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Binding => "binding",
            Self::Allocating => "allocating",
            Self::Usable => "usable",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// What a digested server response asks the channel to do next.
#[derive(Debug)]
pub enum ServerUpdate {
    None,
    /// Put this follow-up request on the wire (e.g. the authenticated
    /// Allocate after a 401).
    SendRequest(Message),
    /// A Binding succeeded; the mapped address is our server reflexive
    /// endpoint.
    ServerReflexive(SocketAddr),
    /// An Allocate succeeded.
    RelayReady {
        relay: SocketAddr,
        mapped: Option<SocketAddr>,
    },
    /// CreatePermission for this peer succeeded.
    PermissionGranted(SocketAddr),
    /// The server became unusable.
    Failed(String),
}

/// Client side of one configured ICE server, driven by the channel tick.
pub struct IceServerConnection {
    pub id: usize,
    pub url: Url,
    pub state: IceServerState,
    pub server_endpoint: Option<SocketAddr>,
    pub server_reflexive_endpoint: Option<SocketAddr>,
    pub relay_endpoint: Option<SocketAddr>,
    pub outstanding_requests_sent: u32,
    pub last_request_sent_at: Option<Instant>,
    pub last_response_received_at: Option<Instant>,
    pub error_response_count: u32,
    pub error: Option<String>,

    username: Option<String>,
    credential: Option<String>,
    allocation: Option<Allocation>,
    // in-flight CreatePermission transactions and the peers they cover
    pending_permissions: HashMap<TransactionId, SocketAddr>,
    current_request: Option<Message>,
}

impl IceServerConnection {
    pub fn new(
        id: usize,
        url: Url,
        username: Option<String>,
        credential: Option<String>,
    ) -> Result<Self> {
        if id >= MAX_ICE_SERVERS {
            return Err(Error::ErrTooManyServers);
        }
        if url.is_turn() && (username.is_none() || credential.is_none()) {
            return Err(Error::ErrUsernameEmpty);
        }

        Ok(IceServerConnection {
            id,
            url,
            state: IceServerState::Unresolved,
            server_endpoint: None,
            server_reflexive_endpoint: None,
            relay_endpoint: None,
            outstanding_requests_sent: 0,
            last_request_sent_at: None,
            last_response_received_at: None,
            error_response_count: 0,
            error: None,
            username,
            credential,
            allocation: None,
            pending_permissions: HashMap::new(),
            current_request: None,
        })
    }

    /// The 6-byte transaction-id prefix binding responses to this server.
    pub fn transaction_prefix(&self) -> [u8; 6] {
        let mut prefix = [0u8; 6];
        prefix[..5].copy_from_slice(TRANSACTION_ID_PREFIX);
        prefix[5] = b'0' + self.id as u8;
        prefix
    }

    fn new_transaction_id(&self) -> TransactionId {
        TransactionId::with_prefix(&self.transaction_prefix())
    }

    /// True if `tid` was generated by this server entry.
    pub fn owns_transaction(&self, tid: &TransactionId) -> bool {
        tid.0[..6] == self.transaction_prefix()
    }

    pub fn is_turn(&self) -> bool {
        self.url.is_turn()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, IceServerState::Usable | IceServerState::Failed)
    }

    fn server_protocol(&self) -> CandidateProtocol {
        match self.url.proto {
            ProtoType::Tcp => CandidateProtocol::Tcp,
            _ => CandidateProtocol::Udp,
        }
    }

    pub fn protocol(&self) -> CandidateProtocol {
        self.server_protocol()
    }

    pub fn mark_resolving(&mut self) {
        self.state = IceServerState::Resolving;
    }

    /// Installs the DNS answer and readies the initial request.
    pub fn set_resolved(&mut self, endpoint: SocketAddr) {
        self.server_endpoint = Some(endpoint);
        self.state = IceServerState::Resolved;

        if self.is_turn() {
            self.allocation = Some(Allocation::new(AllocationConfig {
                server_addr: endpoint,
                username: self.username.clone().unwrap_or_default(),
                password: self.credential.clone().unwrap_or_default(),
                software: SOFTWARE.to_owned(),
            }));
        }
    }

    pub fn fail(&mut self, reason: String) {
        log::warn!("ice server {} failed: {reason}", self.url);
        self.state = IceServerState::Failed;
        self.error = Some(reason);
    }

    /// Builds the initial request: a STUN Binding for `stun` URIs, a TURN
    /// Allocate for `turn` URIs.
    pub fn initial_request(&mut self) -> Result<Message> {
        let m = if let Some(allocation) = &self.allocation {
            self.state = IceServerState::Allocating;
            allocation.build_allocate(self.new_transaction_id())?
        } else {
            self.state = IceServerState::Binding;
            let mut m = Message::new();
            m.build(&[
                Box::new(self.new_transaction_id()),
                Box::new(BINDING_REQUEST),
                Box::new(TextAttribute::new(ATTR_SOFTWARE, SOFTWARE.to_owned())),
                Box::new(FINGERPRINT),
            ])?;
            m
        };
        self.current_request = Some(m.clone());
        Ok(m)
    }

    /// Notes a request hitting the wire; the caller just sent `m`.
    pub fn note_request_sent(&mut self, now: Instant) {
        self.outstanding_requests_sent += 1;
        self.last_request_sent_at = Some(now);
    }

    /// Returns the request to retransmit if one is due, or fails the server
    /// once the no-response cutoff is reached.
    pub fn retransmit_due(&mut self, now: Instant) -> Option<Message> {
        if !matches!(
            self.state,
            IceServerState::Binding | IceServerState::Allocating
        ) {
            return None;
        }
        let last = self.last_request_sent_at?;
        if now.duration_since(last) < SERVER_RETRY_INTERVAL {
            return None;
        }
        if self.outstanding_requests_sent >= MAX_REQUESTS_PER_SERVER {
            self.fail("no response from server".to_owned());
            return None;
        }
        self.current_request.clone()
    }

    /// Digests a response routed here by transaction-id prefix.
    pub fn on_response(&mut self, m: &Message, now: Instant) -> ServerUpdate {
        self.last_response_received_at = Some(now);
        self.outstanding_requests_sent = 0;

        match m.typ.class {
            CLASS_ERROR_RESPONSE => self.on_error_response(m),
            CLASS_SUCCESS_RESPONSE => self.on_success_response(m, now),
            _ => ServerUpdate::None,
        }
    }

    fn on_error_response(&mut self, m: &Message) -> ServerUpdate {
        self.error_response_count += 1;

        let mut code = ErrorCodeAttribute::default();
        let reason = if code.get_from(m).is_ok() {
            code.to_string()
        } else {
            format!("{} error", m.typ.method)
        };

        // a 401 on the bare Allocate (or a 438 later on) is the expected
        // challenge: pick up realm/nonce and go again with credentials
        let prefix = self.transaction_prefix();
        if self.error_response_count < MAX_ERROR_RESPONSES {
            if let Some(allocation) = &mut self.allocation {
                let challenge = (m.typ.method == METHOD_ALLOCATE
                    || m.typ.method == METHOD_REFRESH)
                    && (!allocation.is_authenticated()
                        || code.code == stun::error_code::CODE_STALE_NONCE);
                if challenge && allocation.authenticate(m).is_ok() {
                    match allocation.build_allocate(TransactionId::with_prefix(&prefix)) {
                        Ok(req) => {
                            self.current_request = Some(req.clone());
                            return ServerUpdate::SendRequest(req);
                        }
                        Err(e) => {
                            self.fail(e.to_string());
                            return ServerUpdate::Failed(e.to_string());
                        }
                    }
                }
            }
        }

        if self.error_response_count >= MAX_ERROR_RESPONSES {
            self.fail(reason.clone());
            return ServerUpdate::Failed(reason);
        }

        log::debug!("ice server {} error response: {reason}", self.url);
        ServerUpdate::None
    }

    fn on_success_response(&mut self, m: &Message, now: Instant) -> ServerUpdate {
        match m.typ.method {
            METHOD_BINDING => {
                let mut mapped = XorMappedAddress::default();
                if let Err(e) = mapped.get_from(m) {
                    log::warn!("binding response without usable mapping: {e}");
                    return ServerUpdate::None;
                }
                let endpoint = SocketAddr::new(mapped.ip, mapped.port);
                self.server_reflexive_endpoint = Some(endpoint);
                self.state = IceServerState::Usable;
                ServerUpdate::ServerReflexive(endpoint)
            }
            METHOD_ALLOCATE => {
                let Some(allocation) = &mut self.allocation else {
                    return ServerUpdate::None;
                };
                if let Err(e) = allocation.handle_allocate_success(m, now) {
                    self.fail(e.to_string());
                    return ServerUpdate::Failed(e.to_string());
                }
                self.relay_endpoint = allocation.relayed_address();
                self.server_reflexive_endpoint = allocation.mapped_address();
                self.state = IceServerState::Usable;
                match self.relay_endpoint {
                    Some(relay) => ServerUpdate::RelayReady {
                        relay,
                        mapped: self.server_reflexive_endpoint,
                    },
                    None => ServerUpdate::None,
                }
            }
            METHOD_REFRESH => {
                if let Some(allocation) = &mut self.allocation {
                    let _ = allocation.handle_refresh_success(m, now);
                }
                ServerUpdate::None
            }
            METHOD_CREATE_PERMISSION => {
                if let Some(peer) = self.pending_permissions.remove(&m.transaction_id) {
                    if let Some(allocation) = &mut self.allocation {
                        allocation.handle_create_permission_success(peer, now);
                    }
                    ServerUpdate::PermissionGranted(peer)
                } else {
                    ServerUpdate::None
                }
            }
            _ => ServerUpdate::None,
        }
    }

    /// Builds a CreatePermission for `peer`, tracking the transaction so the
    /// success response can be matched back to the peer.
    pub fn create_permission(&mut self, peer: SocketAddr, now: Instant) -> Result<Message> {
        let tid = self.new_transaction_id();
        let allocation = self
            .allocation
            .as_mut()
            .ok_or(Error::Turn(turn::Error::ErrNoAllocation))?;
        let m = allocation.build_create_permission(tid, peer, now)?;
        self.pending_permissions.insert(tid, peer);
        Ok(m)
    }

    /// Returns the Refresh request once the allocation is within its
    /// refresh headroom.
    pub fn refresh_due(&mut self, now: Instant) -> Option<Message> {
        let allocation = self.allocation.as_ref()?;
        if !allocation.needs_refresh(now) {
            return None;
        }
        // pace re-sends while the refresh answer is outstanding
        if let Some(last) = self.last_request_sent_at {
            if now.duration_since(last) < SERVER_RETRY_INTERVAL {
                return None;
            }
        }
        let tid = self.new_transaction_id();
        match allocation.build_refresh(tid, DEFAULT_LIFETIME) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("building refresh failed: {e}");
                None
            }
        }
    }

    /// The best-effort Refresh(0) sent on close.
    pub fn release_request(&self) -> Option<Message> {
        let allocation = self.allocation.as_ref()?;
        allocation.build_release(self.new_transaction_id()).ok()
    }

    /// Access to the allocation for permission checks and Send wrapping.
    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    pub fn allocation_mut(&mut self) -> Option<&mut Allocation> {
        self.allocation.as_mut()
    }

    /// When the allocation expires, if known.
    pub fn turn_expiry_at(&self) -> Option<Instant> {
        self.allocation.as_ref().and_then(Allocation::expires_at)
    }
}
