
pub mod permission;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use stun::attributes::*;
use stun::error_code::{ErrorCodeAttribute, CODE_STALE_NONCE, CODE_UNAUTHORIZED};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::TextAttribute;
use stun::xoraddr::XorMappedAddress;

use crate::error::*;
use crate::proto::data::Data;
use crate::proto::lifetime::{Lifetime, DEFAULT_LIFETIME};
use crate::proto::peeraddr::PeerAddress;
use crate::proto::relayaddr::RelayedAddress;
use crate::proto::reqfamily::RequestedAddressFamily;
use crate::proto::reqtrans::RequestedTransport;
use crate::proto::PROTO_UDP;

pub use permission::{MAX_PERMISSION_ATTEMPTS, PERMISSION_REFRESH_PERIOD};
use permission::Permission;

/// The refresh is sent once the allocation has this much lifetime left.
pub const REFRESH_HEADROOM: Duration = Duration::from_secs(60);

/// Configuration for one [`Allocation`].
#[derive(Clone)]
pub struct AllocationConfig {
    pub server_addr: SocketAddr,
    pub username: String,
    pub password: String,
    pub software: String,
}

/// Client-side TURN allocation state machine (RFC 5766).
///
/// The type is passive: it builds requests, digests responses and keeps the
/// permission table, while the owner decides when to put messages on the
/// wire. Timing questions take an explicit `now` so the owner's tick drives
/// every deadline.
pub struct Allocation {
    server_addr: SocketAddr,
    username: String,
    password: String,
    software: String,

    realm: Option<String>,
    nonce: Option<String>,
    integrity: Option<MessageIntegrity>,

    relayed_address: Option<SocketAddr>,
    mapped_address: Option<SocketAddr>,
    expires_at: Option<Instant>,

    permissions: HashMap<IpAddr, Permission>,
}

impl Allocation {
    pub fn new(config: AllocationConfig) -> Self {
        Allocation {
            server_addr: config.server_addr,
            username: config.username,
            password: config.password,
            software: config.software,
            realm: None,
            nonce: None,
            integrity: None,
            relayed_address: None,
            mapped_address: None,
            expires_at: None,
            permissions: HashMap::new(),
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn is_allocated(&self) -> bool {
        self.relayed_address.is_some()
    }

    pub fn relayed_address(&self) -> Option<SocketAddr> {
        self.relayed_address
    }

    pub fn mapped_address(&self) -> Option<SocketAddr> {
        self.mapped_address
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// True once the server has challenged us and long-term credentials are
    /// in place.
    pub fn is_authenticated(&self) -> bool {
        self.integrity.is_some()
    }

    /// Digests a 401 Unauthorized (or 438 Stale Nonce) response, capturing
    /// REALM and NONCE and deriving the long-term credential key.
    pub fn authenticate(&mut self, m: &Message) -> Result<()> {
        let mut code = ErrorCodeAttribute::default();
        code.get_from(m)?;
        if code.code != CODE_UNAUTHORIZED && code.code != CODE_STALE_NONCE {
            return Err(Error::ErrUnexpectedResponse(code.to_string()));
        }

        let realm = TextAttribute::get_from_as(m, ATTR_REALM)?.text;
        let nonce = TextAttribute::get_from_as(m, ATTR_NONCE)?.text;

        self.integrity = Some(MessageIntegrity::new_long_term_integrity(
            &self.username,
            &realm,
            &self.password,
        ));
        self.realm = Some(realm);
        self.nonce = Some(nonce);
        Ok(())
    }

    fn auth_setters(&self) -> Result<Vec<Box<dyn Setter>>> {
        let (realm, nonce, integrity) = match (&self.realm, &self.nonce, &self.integrity) {
            (Some(r), Some(n), Some(i)) => (r.clone(), n.clone(), i.clone()),
            _ => return Err(Error::ErrMissingCredentialAttributes),
        };

        Ok(vec![
            Box::new(TextAttribute::new(ATTR_USERNAME, self.username.clone())),
            Box::new(TextAttribute::new(ATTR_REALM, realm)),
            Box::new(TextAttribute::new(ATTR_NONCE, nonce)),
            Box::new(integrity),
        ])
    }

    /// Builds an Allocate request. Before the 401 challenge the request goes
    /// out bare; afterwards it carries the long-term credentials.
    pub fn build_allocate(&self, tid: TransactionId) -> Result<Message> {
        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(tid),
            Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_REQUEST)),
            Box::new(RequestedTransport {
                protocol: PROTO_UDP,
            }),
            Box::new(RequestedAddressFamily::for_addr(&self.server_addr.ip())),
        ];
        if !self.software.is_empty() {
            setters.push(Box::new(TextAttribute::new(
                ATTR_SOFTWARE,
                self.software.clone(),
            )));
        }
        if self.is_authenticated() {
            setters.extend(self.auth_setters()?);
        }
        setters.push(Box::new(FINGERPRINT));

        let mut m = Message::new();
        m.build(&setters)?;
        Ok(m)
    }

    /// Digests an Allocate success response, recording the relayed and
    /// server-reflexive addresses and the allocation deadline.
    pub fn handle_allocate_success(&mut self, m: &Message, now: Instant) -> Result<()> {
        let mut relayed = RelayedAddress::default();
        relayed.get_from(m)?;
        self.relayed_address = Some(SocketAddr::new(relayed.ip, relayed.port));

        // servers may omit XOR-MAPPED-ADDRESS on reallocation
        let mut mapped = XorMappedAddress::default();
        if mapped.get_from(m).is_ok() {
            self.mapped_address = Some(SocketAddr::new(mapped.ip, mapped.port));
        }

        // a missing LIFETIME means the server granted the default
        let mut lifetime = Lifetime(DEFAULT_LIFETIME);
        let _ = lifetime.get_from(m);
        self.expires_at = Some(now + lifetime.0);

        log::debug!(
            "allocation on {}: relay {relayed}, lifetime {lifetime}",
            self.server_addr
        );
        Ok(())
    }

    /// True once the allocation deadline is close enough that a Refresh must
    /// go out.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.saturating_duration_since(now) <= REFRESH_HEADROOM,
            None => false,
        }
    }

    /// Builds a Refresh request for `lifetime`. Lifetime zero releases the
    /// allocation.
    pub fn build_refresh(&self, tid: TransactionId, lifetime: Duration) -> Result<Message> {
        if !self.is_allocated() {
            return Err(Error::ErrNoAllocation);
        }

        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(tid),
            Box::new(MessageType::new(METHOD_REFRESH, CLASS_REQUEST)),
            Box::new(Lifetime(lifetime)),
        ];
        setters.extend(self.auth_setters()?);
        setters.push(Box::new(FINGERPRINT));

        let mut m = Message::new();
        m.build(&setters)?;
        Ok(m)
    }

    /// Digests a Refresh success response and advances the deadline.
    pub fn handle_refresh_success(&mut self, m: &Message, now: Instant) -> Result<()> {
        // a missing LIFETIME means the server granted the default
        let mut lifetime = Lifetime(DEFAULT_LIFETIME);
        let _ = lifetime.get_from(m);
        self.expires_at = Some(now + lifetime.0);
        Ok(())
    }

    /// Builds a CreatePermission request for `peer` and counts the attempt.
    pub fn build_create_permission(
        &mut self,
        tid: TransactionId,
        peer: SocketAddr,
        now: Instant,
    ) -> Result<Message> {
        if !self.is_allocated() {
            return Err(Error::ErrNoAllocation);
        }

        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(tid),
            Box::new(MessageType::new(METHOD_CREATE_PERMISSION, CLASS_REQUEST)),
            Box::new(PeerAddress {
                ip: peer.ip(),
                port: peer.port(),
            }),
        ];
        setters.extend(self.auth_setters()?);
        setters.push(Box::new(FINGERPRINT));

        let mut m = Message::new();
        m.build(&setters)?;

        let perm = self.permissions.entry(peer.ip()).or_default();
        perm.requests_sent += 1;
        perm.last_request_at = Some(now);
        Ok(m)
    }

    /// Marks the permission for `peer` granted.
    pub fn handle_create_permission_success(&mut self, peer: SocketAddr, now: Instant) {
        let perm = self.permissions.entry(peer.ip()).or_default();
        perm.granted_at = Some(now);
    }

    /// True if a CreatePermission response has been seen for `peer` (the
    /// permission is per peer IP).
    pub fn has_permission(&self, peer: SocketAddr) -> bool {
        self.permissions
            .get(&peer.ip())
            .map(Permission::is_active)
            .unwrap_or(false)
    }

    pub fn permission_attempts(&self, peer: SocketAddr) -> u32 {
        self.permissions
            .get(&peer.ip())
            .map(|p| p.requests_sent)
            .unwrap_or(0)
    }

    pub fn permission_response_at(&self, peer: SocketAddr) -> Option<Instant> {
        self.permissions.get(&peer.ip()).and_then(|p| p.granted_at)
    }

    /// True once the permission for `peer` must be re-installed.
    pub fn permission_needs_refresh(&self, peer: SocketAddr, now: Instant) -> bool {
        self.permissions
            .get(&peer.ip())
            .map(|p| p.needs_refresh(now))
            .unwrap_or(false)
    }

    /// Peers whose permission is due for a refresh and has not been
    /// re-requested within `retry_after`. The port is immaterial, the
    /// permission covers the peer IP.
    pub fn permissions_due_for_refresh(
        &self,
        now: Instant,
        retry_after: Duration,
    ) -> Vec<SocketAddr> {
        self.permissions
            .iter()
            .filter(|(_, p)| {
                p.is_active()
                    && p.needs_refresh(now)
                    && p.last_request_at
                        .map(|at| now.duration_since(at) >= retry_after)
                        .unwrap_or(true)
            })
            .map(|(ip, _)| SocketAddr::new(*ip, 0))
            .collect()
    }

    /// Wraps `data` for `peer` in a Send indication. Refused until a
    /// permission for the peer exists, so the relay path never leaks bytes
    /// the server would discard.
    pub fn build_send_indication(&self, peer: SocketAddr, data: &[u8]) -> Result<Message> {
        if !self.is_allocated() {
            return Err(Error::ErrNoAllocation);
        }
        if !self.has_permission(peer) {
            return Err(Error::ErrNoPermission);
        }

        let mut m = Message::new();
        m.build(&[
            Box::new(TransactionId::new()),
            Box::new(SEND_INDICATION),
            Box::new(PeerAddress {
                ip: peer.ip(),
                port: peer.port(),
            }),
            Box::new(Data(data.to_vec())),
        ])?;
        Ok(m)
    }

    /// Unwraps a Data indication into the sending peer and the payload,
    /// ready to be dispatched as if it had arrived directly.
    pub fn parse_data_indication(m: &Message) -> Result<(SocketAddr, Vec<u8>)> {
        if m.typ != DATA_INDICATION {
            return Err(Error::ErrUnexpectedResponse(m.typ.to_string()));
        }

        let mut peer = PeerAddress::default();
        peer.get_from(m)?;
        let mut data = Data::default();
        data.get_from(m)?;
        Ok((SocketAddr::new(peer.ip, peer.port), data.0))
    }

    /// Builds the Refresh(0) that releases the allocation on close.
    pub fn build_release(&self, tid: TransactionId) -> Result<Message> {
        self.build_refresh(tid, Duration::from_secs(0))
    }
}
