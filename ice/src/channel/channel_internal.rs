use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use stun::attributes::{ATTR_MESSAGE_INTEGRITY, ATTR_USERNAME};
use stun::error_code::{
    ErrorCode, ErrorCodeAttribute, CODE_BAD_REQUEST, CODE_FORBIDDEN, CODE_ROLE_CONFLICT,
    CODE_UNAUTHORIZED,
};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::TextAttribute;
use stun::xoraddr::XorMappedAddress;
use tokio::sync::{mpsc, Mutex};
use turn::client::{Allocation, MAX_PERMISSION_ATTEMPTS};
use util::vnet::net::Net;
use util::Conn;

use super::channel_config::{IceChannelConfig, TransportPolicy};
use super::{
    OnCandidateErrorHdlrFn, OnCandidateHdlrFn, OnConnectionStateChangeHdlrFn, OnDataHdlrFn,
    OnGatheringStateChangeHdlrFn, OnStunMessageHdlrFn,
};
use crate::candidate::{
    compute_priority, Candidate, CandidateProtocol, CandidateType, COMPONENT_RTP,
    DEFAULT_LOCAL_PREFERENCE,
};
use crate::checklist::*;
use crate::control::Role;
use crate::dns::{resolve_with_timeout, DnsResolver, MdnsResolver, SystemDnsResolver};
use crate::error::*;
use crate::priority::PriorityAttr;
use crate::rand::{generate_pwd, generate_tie_breaker, generate_ufrag};
use crate::server::{
    IceServerConnection, IceServerState, ServerUpdate, MAX_ICE_SERVERS, SERVER_RETRY_INTERVAL,
};
use crate::state::{ConnectionState, GatheringState};
use crate::url::{SchemeType, Url};
use crate::use_candidate::UseCandidateAttr;

pub(crate) const RECEIVE_MTU: usize = 8192;
const MAILBOX_CAPACITY: usize = 64;

#[derive(Default)]
pub(crate) struct UfragPwd {
    pub(crate) local_ufrag: String,
    pub(crate) local_pwd: String,
    pub(crate) remote_ufrag: String,
    pub(crate) remote_pwd: String,
}

struct Credentials {
    local_ufrag: String,
    local_pwd: String,
    remote_ufrag: String,
    remote_pwd: String,
}

// Results handed back to the loop by offloaded lookups.
pub(crate) enum MailboxItem {
    ServerResolved {
        index: usize,
        result: Result<SocketAddr>,
    },
    RemoteResolved {
        candidate: Candidate,
        result: Result<IpAddr>,
    },
}

// A planned outbound STUN message: the logical destination plus the relay
// server to tunnel through when the pair is relayed.
struct PlannedSend {
    dest: SocketAddr,
    message: Message,
    relay_server: Option<usize>,
}

// What one checklist scheduling step decided to do.
enum CheckAction {
    Check(PlannedSend),
    Permission { server_id: usize, peer: SocketAddr },
}

// Parsed per-server configuration, kept so restart can rebuild the table.
#[derive(Clone)]
pub(crate) struct ServerSeed {
    pub(crate) url: Url,
    pub(crate) username: Option<String>,
    pub(crate) credential: Option<String>,
}

pub(crate) struct ChannelInternal {
    pub(crate) conn: Arc<dyn Conn + Send + Sync>,
    pub(crate) local_port: u16,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) policy: TransportPolicy,
    pub(crate) include_all_interface_addresses: bool,
    pub(crate) net: Arc<Net>,

    tie_breaker: u64,
    is_controller: AtomicBool,

    closed: AtomicBool,
    tick_started: AtomicBool,
    host_gather_done: AtomicBool,
    done_tx: Mutex<Option<mpsc::Sender<()>>>,
    done_rx: Mutex<Option<mpsc::Receiver<()>>>,

    gathering_state: AtomicU8,
    connection_state: AtomicU8,

    pub(crate) ufrag_pwd: Mutex<UfragPwd>,

    server_seeds: Vec<ServerSeed>,
    pub(crate) servers: Mutex<Vec<IceServerConnection>>,

    pub(crate) checklist: Mutex<Checklist>,
    pub(crate) pending_remote_candidates: Mutex<Vec<Candidate>>,
    pub(crate) remote_candidates: Mutex<Vec<Candidate>>,
    pub(crate) local_candidates: Mutex<Vec<Candidate>>,
    pub(crate) host_candidate: Mutex<Option<Candidate>>,
    pub(crate) relay_candidate: Mutex<Option<Candidate>>,

    dns_resolver: Arc<dyn DnsResolver>,
    mdns_resolver: Option<Arc<dyn MdnsResolver>>,
    mailbox_tx: mpsc::Sender<MailboxItem>,
    mailbox_rx: Mutex<mpsc::Receiver<MailboxItem>>,

    pub(crate) on_candidate_hdlr: ArcSwapOption<Mutex<OnCandidateHdlrFn>>,
    pub(crate) on_candidate_error_hdlr: ArcSwapOption<Mutex<OnCandidateErrorHdlrFn>>,
    pub(crate) on_gathering_state_hdlr: ArcSwapOption<Mutex<OnGatheringStateChangeHdlrFn>>,
    pub(crate) on_connection_state_hdlr: ArcSwapOption<Mutex<OnConnectionStateChangeHdlrFn>>,
    pub(crate) on_stun_in_hdlr: ArcSwapOption<Mutex<OnStunMessageHdlrFn>>,
    pub(crate) on_stun_out_hdlr: ArcSwapOption<Mutex<OnStunMessageHdlrFn>>,
    pub(crate) on_data_hdlr: ArcSwapOption<Mutex<OnDataHdlrFn>>,
}

impl ChannelInternal {
    pub(crate) async fn new(config: IceChannelConfig) -> Result<Arc<Self>> {
        let server_seeds = Self::parse_server_seeds(&config)?;

        let net = config.net.clone().unwrap_or_else(|| Arc::new(Net::new(None)));
        let conn = Self::bind_socket(&net, &config).await?;
        let bind_addr = conn.local_addr()?;

        let dns_resolver = config
            .dns_resolver
            .unwrap_or_else(|| Arc::new(SystemDnsResolver::new(Arc::clone(&net))));

        let local_ufrag = if config.local_ufrag.is_empty() {
            generate_ufrag()
        } else {
            config.local_ufrag
        };
        let local_pwd = if config.local_pwd.is_empty() {
            generate_pwd()
        } else {
            config.local_pwd
        };

        let (done_tx, done_rx) = mpsc::channel(1);
        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);

        Ok(Arc::new(ChannelInternal {
            local_port: bind_addr.port(),
            bind_addr,
            conn,
            policy: config.policy,
            include_all_interface_addresses: config.include_all_interface_addresses,
            net,

            tie_breaker: generate_tie_breaker(),
            is_controller: AtomicBool::new(config.is_controller),

            closed: AtomicBool::new(false),
            tick_started: AtomicBool::new(false),
            host_gather_done: AtomicBool::new(false),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: Mutex::new(Some(done_rx)),

            gathering_state: AtomicU8::new(GatheringState::New as u8),
            connection_state: AtomicU8::new(ConnectionState::New as u8),

            ufrag_pwd: Mutex::new(UfragPwd {
                local_ufrag,
                local_pwd,
                ..Default::default()
            }),

            server_seeds,
            servers: Mutex::new(vec![]),

            checklist: Mutex::new(Checklist::new()),
            pending_remote_candidates: Mutex::new(vec![]),
            remote_candidates: Mutex::new(vec![]),
            local_candidates: Mutex::new(vec![]),
            host_candidate: Mutex::new(None),
            relay_candidate: Mutex::new(None),

            dns_resolver,
            mdns_resolver: config.mdns_resolver,
            mailbox_tx,
            mailbox_rx: Mutex::new(mailbox_rx),

            on_candidate_hdlr: ArcSwapOption::empty(),
            on_candidate_error_hdlr: ArcSwapOption::empty(),
            on_gathering_state_hdlr: ArcSwapOption::empty(),
            on_connection_state_hdlr: ArcSwapOption::empty(),
            on_stun_in_hdlr: ArcSwapOption::empty(),
            on_stun_out_hdlr: ArcSwapOption::empty(),
            on_data_hdlr: ArcSwapOption::empty(),
        }))
    }

    fn parse_server_seeds(config: &IceChannelConfig) -> Result<Vec<ServerSeed>> {
        let mut seeds = vec![];
        for entry in &config.ice_servers {
            for url in Url::parse_urls(&entry.urls)? {
                // relay-only channels have no use for plain STUN servers
                if config.policy == TransportPolicy::Relay && url.scheme == SchemeType::Stun {
                    log::debug!("ignoring {url} under relay policy");
                    continue;
                }
                seeds.push(ServerSeed {
                    url,
                    username: entry.username.clone(),
                    credential: entry.credential.clone(),
                });
            }
        }
        if seeds.len() > MAX_ICE_SERVERS {
            return Err(Error::ErrTooManyServers);
        }
        Ok(seeds)
    }

    async fn bind_socket(
        net: &Arc<Net>,
        config: &IceChannelConfig,
    ) -> Result<Arc<dyn Conn + Send + Sync>> {
        let ip = config
            .bind_address
            .unwrap_or_else(|| IpAddr::from([0u8, 0, 0, 0]));

        if config.bind_port != 0 || config.port_range.is_none() {
            let addr = SocketAddr::new(ip, config.bind_port);
            return Ok(net.bind(addr).await?);
        }

        // cycle through the configured range from a random start
        let (lo, hi) = config.port_range.unwrap();
        if lo > hi || lo == 0 {
            return Err(Error::ErrPort);
        }
        let span = (hi - lo + 1) as u32;
        let start = lo + (::rand::random::<u32>() % span) as u16;
        let mut port = start;
        loop {
            match net.bind(SocketAddr::new(ip, port)).await {
                Ok(conn) => return Ok(conn),
                Err(err) => log::debug!("failed to bind {ip}:{port}: {err}"),
            }
            port = if port == hi { lo } else { port + 1 };
            if port == start {
                return Err(Error::ErrPort);
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn role(&self) -> Role {
        if self.is_controller.load(Ordering::SeqCst) {
            Role::Controlling
        } else {
            Role::Controlled
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.connection_state.load(Ordering::SeqCst).into()
    }

    pub(crate) fn gathering_state(&self) -> GatheringState {
        self.gathering_state.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn local_credentials(&self) -> (String, String) {
        let up = self.ufrag_pwd.lock().await;
        (up.local_ufrag.clone(), up.local_pwd.clone())
    }

    async fn credentials(&self) -> Credentials {
        let up = self.ufrag_pwd.lock().await;
        Credentials {
            local_ufrag: up.local_ufrag.clone(),
            local_pwd: up.local_pwd.clone(),
            remote_ufrag: up.remote_ufrag.clone(),
            remote_pwd: up.remote_pwd.clone(),
        }
    }

    pub(crate) async fn nominated_pair(&self) -> Option<(Candidate, Candidate)> {
        let checklist = self.checklist.lock().await;
        checklist.nominated_index().map(|i| {
            (
                checklist.entries[i].local.clone(),
                checklist.entries[i].remote.clone(),
            )
        })
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        let prev: ConnectionState = self
            .connection_state
            .swap(state as u8, Ordering::SeqCst)
            .into();
        if prev != state {
            log::info!("connection state {prev} -> {state}");
            self.emit_connection_state(state).await;
        }
    }

    async fn set_gathering_state(&self, state: GatheringState) {
        let prev: GatheringState = self
            .gathering_state
            .swap(state as u8, Ordering::SeqCst)
            .into();
        if prev != state {
            log::info!("gathering state {prev} -> {state}");
            self.emit_gathering_state(state).await;
        }
    }

    // --- event emission -------------------------------------------------

    pub(crate) async fn emit_candidate(&self, c: Candidate) {
        if let Some(h) = &*self.on_candidate_hdlr.load() {
            let mut f = h.lock().await;
            f(c).await;
        }
    }

    pub(crate) async fn emit_candidate_error(&self, c: Option<Candidate>, reason: String) {
        log::warn!("candidate error: {reason}");
        if let Some(h) = &*self.on_candidate_error_hdlr.load() {
            let mut f = h.lock().await;
            f(c, reason).await;
        }
    }

    async fn emit_gathering_state(&self, state: GatheringState) {
        if let Some(h) = &*self.on_gathering_state_hdlr.load() {
            let mut f = h.lock().await;
            f(state).await;
        }
    }

    async fn emit_connection_state(&self, state: ConnectionState) {
        if let Some(h) = &*self.on_connection_state_hdlr.load() {
            let mut f = h.lock().await;
            f(state).await;
        }
    }

    async fn emit_stun_in(&self, m: Message, remote: SocketAddr, relayed: bool) {
        if let Some(h) = &*self.on_stun_in_hdlr.load() {
            let mut f = h.lock().await;
            f(m, remote, relayed).await;
        }
    }

    async fn emit_stun_out(&self, m: Message, remote: SocketAddr, relayed: bool) {
        if let Some(h) = &*self.on_stun_out_hdlr.load() {
            let mut f = h.lock().await;
            f(m, remote, relayed).await;
        }
    }

    async fn emit_data(&self, remote: SocketAddr, payload: Vec<u8>) {
        if let Some(h) = &*self.on_data_hdlr.load() {
            let mut f = h.lock().await;
            f(self.local_port, remote, payload).await;
        }
    }

    // --- lifecycle ------------------------------------------------------

    pub(crate) fn spawn_read_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECEIVE_MTU];
            loop {
                let (n, from) = match self.conn.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(err) => {
                        log::debug!("exiting read loop: {err}");
                        break;
                    }
                };
                if self.is_closed() {
                    break;
                }
                let data = buf[..n].to_vec();
                self.handle_datagram(from, &data).await;
            }
        });
    }

    pub(crate) async fn start_gather(self: Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrClosed);
        }
        if self.gathering_state() == GatheringState::Gathering {
            return Err(Error::ErrMultipleGatherAttempted);
        }

        self.set_gathering_state(GatheringState::Gathering).await;

        // fresh server table for this gathering round
        {
            let mut servers = self.servers.lock().await;
            servers.clear();
            for (i, seed) in self.server_seeds.iter().enumerate() {
                match IceServerConnection::new(
                    i,
                    seed.url.clone(),
                    seed.username.clone(),
                    seed.credential.clone(),
                ) {
                    Ok(s) => servers.push(s),
                    Err(e) => {
                        self.emit_candidate_error(None, format!("{}: {e}", seed.url))
                            .await;
                    }
                }
            }
        }

        self.gather_host_candidates().await;
        self.host_gather_done.store(true, Ordering::SeqCst);

        if !self.tick_started.swap(true, Ordering::SeqCst) {
            let internal = Arc::clone(&self);
            let mut done_rx = { self.done_rx.lock().await.take() };
            tokio::spawn(async move {
                loop {
                    let sleep = tokio::time::sleep(TA);
                    tokio::pin!(sleep);
                    tokio::select! {
                        _ = sleep.as_mut() => {
                            internal.tick().await;
                        }
                        _ = async {
                            match done_rx.as_mut() {
                                Some(rx) => { rx.recv().await; }
                                None => std::future::pending::<()>().await,
                            }
                        } => {
                            log::debug!("exiting tick loop");
                            break;
                        }
                    }
                    if internal.is_closed() {
                        break;
                    }
                }
            });
        }

        Ok(())
    }

    pub(crate) async fn set_remote_credentials(&self, ufrag: &str, pwd: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrClosed);
        }
        if ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        }
        if pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        {
            let mut up = self.ufrag_pwd.lock().await;
            up.remote_ufrag = ufrag.to_owned();
            up.remote_pwd = pwd.to_owned();
        }

        if self.connection_state() == ConnectionState::New {
            self.set_connection_state(ConnectionState::Checking).await;
        }
        Ok(())
    }

    pub(crate) async fn add_remote_candidate(self: Arc<Self>, candidate: Candidate) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrClosed);
        }

        if candidate.endpoint().is_some() {
            self.pending_remote_candidates.lock().await.push(candidate);
            return Ok(());
        }

        // hostname or mDNS name: resolve off the loop and hand the result
        // back through the mailbox
        let internal = Arc::clone(&self);
        tokio::spawn(async move {
            let result = if candidate.is_mdns() {
                match &internal.mdns_resolver {
                    Some(resolver) => {
                        let resolver = Arc::clone(resolver);
                        match tokio::time::timeout(
                            crate::dns::DNS_LOOKUP_TIMEOUT,
                            resolver.resolve(&candidate.address),
                        )
                        .await
                        {
                            Ok(res) => res,
                            Err(_) => Err(Error::ErrDnsTimeout),
                        }
                    }
                    None => Err(Error::ErrNoMdnsResolver),
                }
            } else {
                resolve_with_timeout(&internal.dns_resolver, &candidate.address, candidate.port)
                    .await
                    .map(|addr| addr.ip())
            };

            let _ = internal
                .mailbox_tx
                .send(MailboxItem::RemoteResolved { candidate, result })
                .await;
        });
        Ok(())
    }

    pub(crate) async fn restart(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ErrClosed);
        }

        {
            let mut up = self.ufrag_pwd.lock().await;
            up.local_ufrag = generate_ufrag();
            up.local_pwd = generate_pwd();
            up.remote_ufrag = String::new();
            up.remote_pwd = String::new();
        }
        self.checklist.lock().await.entries.clear();
        self.pending_remote_candidates.lock().await.clear();
        self.remote_candidates.lock().await.clear();
        self.local_candidates.lock().await.clear();
        *self.host_candidate.lock().await = None;
        *self.relay_candidate.lock().await = None;
        self.servers.lock().await.clear();
        self.host_gather_done.store(false, Ordering::SeqCst);

        self.gathering_state
            .store(GatheringState::New as u8, Ordering::SeqCst);
        self.connection_state
            .store(ConnectionState::New as u8, Ordering::SeqCst);

        log::info!("channel restarted");
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // best-effort release of any live allocation
        let releases: Vec<(Message, SocketAddr)> = {
            let servers = self.servers.lock().await;
            servers
                .iter()
                .filter_map(|s| Some((s.release_request()?, s.server_endpoint?)))
                .collect()
        };
        for (m, to) in releases {
            let _ = self.conn.send_to(&m.raw, to).await;
        }

        {
            let mut done_tx = self.done_tx.lock().await;
            done_tx.take();
        }
        let _ = self.conn.close().await;

        self.set_connection_state(ConnectionState::Closed).await;
        Ok(())
    }

    // --- outbound -------------------------------------------------------

    async fn send_stun(&self, m: &Message, dest: SocketAddr, relay_server: Option<usize>) {
        match relay_server {
            None => {
                if let Err(err) = self.conn.send_to(&m.raw, dest).await {
                    log::warn!("failed to send to {dest}: {err}");
                    return;
                }
                self.emit_stun_out(m.clone(), dest, false).await;
            }
            Some(server_id) => {
                let wrapped = {
                    let servers = self.servers.lock().await;
                    servers.iter().find(|s| s.id == server_id).and_then(|s| {
                        let endpoint = s.server_endpoint?;
                        let alloc = s.allocation()?;
                        alloc
                            .build_send_indication(dest, &m.raw)
                            .ok()
                            .map(|ind| (ind, endpoint))
                    })
                };
                let Some((indication, server_endpoint)) = wrapped else {
                    log::warn!("no usable allocation to reach {dest}");
                    return;
                };
                if let Err(err) = self.conn.send_to(&indication.raw, server_endpoint).await {
                    log::warn!("failed to send via {server_endpoint}: {err}");
                    return;
                }
                self.emit_stun_out(m.clone(), dest, true).await;
            }
        }
    }

    /// Routes application payloads: through the relay iff the nominated
    /// pair is a relay pair and `endpoint` is its remote endpoint.
    pub(crate) async fn send_payload(&self, endpoint: SocketAddr, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::ErrClosed);
        }

        let relay_server = {
            let checklist = self.checklist.lock().await;
            checklist.nominated_index().and_then(|i| {
                let e = &checklist.entries[i];
                if e.is_relay_pair() && e.remote_endpoint == endpoint {
                    e.local.server_id
                } else {
                    None
                }
            })
        };

        match relay_server {
            None => Ok(self.conn.send_to(data, endpoint).await?),
            Some(server_id) => {
                let wrapped = {
                    let servers = self.servers.lock().await;
                    servers.iter().find(|s| s.id == server_id).and_then(|s| {
                        let server_endpoint = s.server_endpoint?;
                        let alloc = s.allocation()?;
                        alloc
                            .build_send_indication(endpoint, data)
                            .ok()
                            .map(|ind| (ind, server_endpoint))
                    })
                };
                let (indication, server_endpoint) =
                    wrapped.ok_or(Error::Turn(turn::Error::ErrNoPermission))?;
                self.conn.send_to(&indication.raw, server_endpoint).await?;
                Ok(data.len())
            }
        }
    }

    // --- tick -----------------------------------------------------------

    pub(crate) async fn tick(&self) {
        if self.is_closed() {
            return;
        }
        let now = Instant::now();

        self.drain_mailbox().await;
        self.drain_pending_remote_candidates().await;
        self.tick_servers(now).await;
        self.check_gathering_complete().await;
        self.tick_checklist(now).await;
    }

    async fn drain_mailbox(&self) {
        loop {
            let item = {
                let mut rx = self.mailbox_rx.lock().await;
                match rx.try_recv() {
                    Ok(item) => item,
                    Err(_) => break,
                }
            };
            match item {
                MailboxItem::ServerResolved { index, result } => {
                    self.apply_server_resolution(index, result).await;
                }
                MailboxItem::RemoteResolved {
                    mut candidate,
                    result,
                } => match result {
                    Ok(ip) => {
                        candidate.set_endpoint(SocketAddr::new(ip, candidate.port));
                        self.pending_remote_candidates.lock().await.push(candidate);
                    }
                    Err(err) => {
                        // a failed lookup drops that candidate only
                        self.emit_candidate_error(
                            Some(candidate),
                            format!("remote candidate resolution failed: {err}"),
                        )
                        .await;
                    }
                },
            }
        }
    }

    async fn apply_server_resolution(&self, index: usize, result: Result<SocketAddr>) {
        let planned = {
            let mut servers = self.servers.lock().await;
            let Some(server) = servers.get_mut(index) else {
                return;
            };
            match result {
                Ok(endpoint) => {
                    server.set_resolved(endpoint);
                    match server.initial_request() {
                        Ok(m) => {
                            server.note_request_sent(Instant::now());
                            Some((m, endpoint))
                        }
                        Err(e) => {
                            server.fail(e.to_string());
                            None
                        }
                    }
                }
                Err(err) => {
                    server.fail(err.to_string());
                    None
                }
            }
        };
        if let Some((request, dest)) = planned {
            self.send_stun(&request, dest, None).await;
        }
    }

    async fn tick_servers(&self, now: Instant) {
        let mut to_send: Vec<(Message, SocketAddr)> = vec![];
        let mut to_resolve: Vec<(usize, String, u16)> = vec![];

        {
            let mut servers = self.servers.lock().await;
            for server in servers.iter_mut() {
                match server.state {
                    IceServerState::Unresolved => {
                        server.mark_resolving();
                        to_resolve.push((server.id, server.url.host.clone(), server.url.port));
                    }
                    IceServerState::Binding | IceServerState::Allocating => {
                        let Some(dest) = server.server_endpoint else {
                            continue;
                        };
                        if let Some(m) = server.retransmit_due(now) {
                            server.note_request_sent(now);
                            to_send.push((m, dest));
                        }
                    }
                    IceServerState::Usable => {
                        let Some(dest) = server.server_endpoint else {
                            continue;
                        };
                        if let Some(m) = server.refresh_due(now) {
                            server.note_request_sent(now);
                            to_send.push((m, dest));
                        }
                        // keep installed peer permissions fresh
                        let due: Vec<SocketAddr> = server
                            .allocation()
                            .map(|a| a.permissions_due_for_refresh(now, SERVER_RETRY_INTERVAL))
                            .unwrap_or_default();
                        for peer in due {
                            if let Ok(m) = server.create_permission(peer, now) {
                                to_send.push((m, dest));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        for (index, host, port) in to_resolve {
            let resolver = Arc::clone(&self.dns_resolver);
            let mailbox = self.mailbox_tx.clone();
            tokio::spawn(async move {
                let result = resolve_with_timeout(&resolver, &host, port).await;
                let _ = mailbox
                    .send(MailboxItem::ServerResolved { index, result })
                    .await;
            });
        }

        for (m, dest) in to_send {
            self.send_stun(&m, dest, None).await;
        }
    }

    async fn check_gathering_complete(&self) {
        if self.gathering_state() != GatheringState::Gathering
            || !self.host_gather_done.load(Ordering::SeqCst)
        {
            return;
        }
        let all_terminal = {
            let servers = self.servers.lock().await;
            servers.iter().all(IceServerConnection::is_terminal)
        };
        if all_terminal {
            self.set_gathering_state(GatheringState::Complete).await;
        }
    }

    async fn drain_pending_remote_candidates(&self) {
        let pending: Vec<Candidate> = {
            let mut p = self.pending_remote_candidates.lock().await;
            std::mem::take(&mut *p)
        };
        for c in pending {
            self.register_remote_candidate(c).await;
        }
    }

    async fn register_remote_candidate(&self, candidate: Candidate) {
        let Some(endpoint) = candidate.endpoint() else {
            return;
        };
        if let Err(reason) = self.acceptable_remote(&candidate, endpoint) {
            self.emit_candidate_error(Some(candidate), reason).await;
            return;
        }

        {
            let mut remotes = self.remote_candidates.lock().await;
            if remotes.iter().any(|r| r.endpoint() == Some(endpoint)) {
                return;
            }
            remotes.push(candidate.clone());
        }

        let host = self.host_candidate.lock().await.clone();
        let relay = self.relay_candidate.lock().await.clone();
        let role = self.role();

        let mut checklist = self.checklist.lock().await;
        if self.policy != TransportPolicy::Relay {
            if let Some(h) = host {
                if let Ok(e) = ChecklistEntry::new(h, candidate.clone()) {
                    checklist.insert(e, role);
                }
            }
        }
        if let Some(r) = relay {
            if let Ok(e) = ChecklistEntry::new(r, candidate) {
                checklist.insert(e, role);
            }
        }
    }

    fn acceptable_remote(&self, c: &Candidate, endpoint: SocketAddr) -> std::result::Result<(), String> {
        if c.protocol != CandidateProtocol::Udp {
            return Err("only UDP candidate pairs are probed".to_owned());
        }
        let ip = endpoint.ip();
        if ip.is_unspecified() {
            return Err("wildcard remote address".to_owned());
        }
        if let IpAddr::V6(v6) = ip {
            if v6.to_ipv4_mapped().is_some() {
                return Err("v4-mapped remote address".to_owned());
            }
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            let local_link_local = match self.bind_addr.ip() {
                IpAddr::V6(b) => (b.segments()[0] & 0xffc0) == 0xfe80,
                IpAddr::V4(_) => false,
            };
            if link_local && !local_link_local {
                return Err("link-local peer without link-local base".to_owned());
            }
        }
        Ok(())
    }

    // One checklist scheduling pass (RFC 8445 section 6.1.4, adapted to the
    // single-component single-socket model).
    async fn tick_checklist(&self, now: Instant) {
        match self.connection_state() {
            ConnectionState::Checking
            | ConnectionState::Connected
            | ConnectionState::Disconnected => {}
            _ => return,
        }

        let creds = self.credentials().await;
        if creds.remote_pwd.is_empty() {
            return;
        }

        let mut actions: Vec<CheckAction> = vec![];
        let mut next_state: Option<ConnectionState> = None;
        let mut failed_all = false;

        {
            let mut checklist = self.checklist.lock().await;

            checklist.expire_stale(now);
            if checklist.all_failed() && self.gathering_state() == GatheringState::Complete {
                failed_all = true;
            }

            if !failed_all {
                let (keepalive, state) = self.plan_keepalive(&mut checklist, now, &creds);
                actions.extend(keepalive);
                next_state = state;

                if next_state != Some(ConnectionState::Failed) {
                    if let Some(i) = checklist.next_waiting_index() {
                        actions.extend(self.plan_check(&mut checklist, i, now, &creds, false));
                    } else {
                        let rto = checklist.rto();
                        if let Some(i) = checklist.next_retransmit_index(now, rto) {
                            actions.extend(self.plan_check(&mut checklist, i, now, &creds, false));
                        }
                    }
                }
            }
        }

        if failed_all || next_state == Some(ConnectionState::Failed) {
            self.set_connection_state(ConnectionState::Failed).await;
            return;
        }
        if let Some(state) = next_state {
            self.set_connection_state(state).await;
        }

        for action in actions {
            self.perform_check_action(action, now).await;
        }

        self.nominate_if_ready(now, &creds).await;
    }

    async fn perform_check_action(&self, action: CheckAction, now: Instant) {
        match action {
            CheckAction::Check(planned) => {
                self.send_stun(&planned.message, planned.dest, planned.relay_server)
                    .await;
            }
            CheckAction::Permission { server_id, peer } => {
                let request = {
                    let mut servers = self.servers.lock().await;
                    servers
                        .iter_mut()
                        .find(|s| s.id == server_id)
                        .and_then(|s| {
                            let dest = s.server_endpoint?;
                            s.create_permission(peer, now).ok().map(|m| (m, dest))
                        })
                };
                if let Some((m, dest)) = request {
                    self.send_stun(&m, dest, None).await;
                }
            }
        }
    }

    // Builds the next step for entry `i`: a CreatePermission when a relay
    // pair lacks one, otherwise the connectivity check itself.
    fn plan_check(
        &self,
        checklist: &mut Checklist,
        i: usize,
        now: Instant,
        creds: &Credentials,
        use_candidate: bool,
    ) -> Vec<CheckAction> {
        let mut actions = vec![];
        let entry = &mut checklist.entries[i];

        if entry.is_relay_pair() {
            let Some(server_id) = entry.local.server_id else {
                entry.state = ChecklistEntryState::Failed;
                return actions;
            };

            if entry.turn_permission_response_at.is_none() {
                // no permission yet: the relay would discard our checks
                let spaced = entry
                    .turn_permission_request_at
                    .map(|at| now.duration_since(at) >= SERVER_RETRY_INTERVAL)
                    .unwrap_or(true);
                if !spaced {
                    return actions;
                }
                if entry.turn_permission_requests_sent >= MAX_PERMISSION_ATTEMPTS {
                    log::debug!("permission attempts exhausted for {entry}");
                    entry.state = ChecklistEntryState::Failed;
                    return actions;
                }
                entry.turn_permission_requests_sent += 1;
                entry.turn_permission_request_at = Some(now);
                actions.push(CheckAction::Permission {
                    server_id,
                    peer: entry.remote_endpoint,
                });
                return actions;
            }
        }

        let tid = entry.mark_check_sent(now);
        let relay_server = if entry.is_relay_pair() {
            entry.local.server_id
        } else {
            None
        };
        match self.build_check_message(tid, creds, use_candidate) {
            Ok(m) => actions.push(CheckAction::Check(PlannedSend {
                dest: entry.remote_endpoint,
                message: m,
                relay_server,
            })),
            Err(err) => log::warn!("building connectivity check failed: {err}"),
        }
        actions
    }

    // Keepalive and liveness accounting for the nominated pair.
    fn plan_keepalive(
        &self,
        checklist: &mut Checklist,
        now: Instant,
        creds: &Credentials,
    ) -> (Vec<CheckAction>, Option<ConnectionState>) {
        let Some(i) = checklist.nominated_index() else {
            return (vec![], None);
        };
        let use_candidate = self.role() == Role::Controlling;
        let entry = &mut checklist.entries[i];

        let last_heard = entry
            .last_activity()
            .or(entry.first_check_sent_at)
            .unwrap_or(now);
        let silence = now.duration_since(last_heard);

        let state = if silence >= FAILED_TIMEOUT {
            entry.state = ChecklistEntryState::Failed;
            Some(ConnectionState::Failed)
        } else if silence >= DISCONNECTED_TIMEOUT {
            Some(ConnectionState::Disconnected)
        } else {
            Some(ConnectionState::Connected)
        };

        if state == Some(ConnectionState::Failed) {
            return (vec![], state);
        }

        let due = entry
            .last_check_sent_at
            .map(|at| now.duration_since(at) >= CONNECTED_CHECK_PERIOD)
            .unwrap_or(true);
        if !due {
            return (vec![], state);
        }

        let tid = entry.mark_check_sent(now);
        let relay_server = if entry.is_relay_pair() {
            entry.local.server_id
        } else {
            None
        };
        match self.build_check_message(tid, creds, use_candidate) {
            Ok(m) => (
                vec![CheckAction::Check(PlannedSend {
                    dest: entry.remote_endpoint,
                    message: m,
                    relay_server,
                })],
                state,
            ),
            Err(err) => {
                log::warn!("building keepalive failed: {err}");
                (vec![], state)
            }
        }
    }

    fn build_check_message(
        &self,
        tid: TransactionId,
        creds: &Credentials,
        use_candidate: bool,
    ) -> Result<Message> {
        let username = format!("{}:{}", creds.remote_ufrag, creds.local_ufrag);
        let prflx_priority = compute_priority(
            CandidateType::PeerReflexive.preference(),
            DEFAULT_LOCAL_PREFERENCE,
            COMPONENT_RTP,
        );

        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(tid),
            Box::new(BINDING_REQUEST),
            Box::new(TextAttribute::new(ATTR_USERNAME, username)),
            Box::new(PriorityAttr(prflx_priority)),
            self.role().to_attribute(self.tie_breaker),
        ];
        if use_candidate {
            setters.push(Box::new(UseCandidateAttr::new()));
        }
        setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
            &creds.remote_pwd,
        )));
        setters.push(Box::new(FINGERPRINT));

        let mut m = Message::new();
        m.build(&setters)?;
        Ok(m)
    }

    // Controller-side nomination: once the highest-priority succeeded entry
    // has nothing above it still in flight, send a UseCandidate check on it.
    async fn nominate_if_ready(&self, now: Instant, creds: &Credentials) {
        if self.role() != Role::Controlling {
            return;
        }

        let planned = {
            let mut checklist = self.checklist.lock().await;
            if checklist.nominated_index().is_some() {
                None
            } else if let Some(best) = checklist.best_succeeded_index() {
                if checklist.has_higher_priority_pending(best) {
                    None
                } else if checklist.nominate(best) {
                    let entry = &mut checklist.entries[best];
                    let tid = entry.mark_check_sent(now);
                    let relay_server = if entry.is_relay_pair() {
                        entry.local.server_id
                    } else {
                        None
                    };
                    self.build_check_message(tid, creds, true)
                        .ok()
                        .map(|m| PlannedSend {
                            dest: entry.remote_endpoint,
                            message: m,
                            relay_server,
                        })
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some(planned) = planned {
            log::info!("nominating pair towards {}", planned.dest);
            self.send_stun(&planned.message, planned.dest, planned.relay_server)
                .await;
        }
    }

    // --- inbound --------------------------------------------------------

    pub(crate) async fn handle_datagram(&self, from: SocketAddr, data: &[u8]) {
        if self.is_closed() || data.is_empty() {
            return;
        }

        // TURN Data indication: unwrap before any STUN dispatch
        if data.len() >= 2 && data[0] == 0x00 && data[1] == 0x17 {
            self.handle_data_indication(from, data).await;
            return;
        }

        if is_message(data) {
            let mut m = Message::new();
            if let Err(err) = m.write(data) {
                log::warn!("dropping malformed STUN message from {from}: {err}");
                return;
            }
            self.handle_stun_message(m, from, false).await;
            return;
        }

        self.emit_data(from, data.to_vec()).await;
    }

    async fn handle_data_indication(&self, from: SocketAddr, data: &[u8]) {
        let mut m = Message::new();
        if let Err(err) = m.write(data) {
            log::warn!("dropping malformed Data indication from {from}: {err}");
            return;
        }

        // only servers we allocated on may relay traffic to us
        let known = {
            let servers = self.servers.lock().await;
            servers.iter().any(|s| s.server_endpoint == Some(from))
        };
        if !known {
            log::debug!("Data indication from unknown server {from}");
            return;
        }

        let (peer, payload) = match Allocation::parse_data_indication(&m) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("unusable Data indication from {from}: {err}");
                return;
            }
        };

        if is_message(&payload) {
            let mut inner = Message::new();
            if inner.write(&payload).is_ok() {
                self.handle_stun_message(inner, peer, true).await;
            }
        } else {
            self.emit_data(peer, payload).await;
        }
    }

    async fn handle_stun_message(&self, m: Message, from: SocketAddr, relayed: bool) {
        self.emit_stun_in(m.clone(), from, relayed).await;
        let now = Instant::now();

        if m.typ.class == CLASS_SUCCESS_RESPONSE || m.typ.class == CLASS_ERROR_RESPONSE {
            // a transaction-id prefix pins the response to its server entry
            let routed = {
                let mut servers = self.servers.lock().await;
                let mut routed = None;
                for s in servers.iter_mut() {
                    if s.owns_transaction(&m.transaction_id) {
                        routed = Some((s.id, s.on_response(&m, now)));
                        break;
                    }
                }
                routed
            };
            if let Some((server_id, update)) = routed {
                self.apply_server_update(server_id, update, now).await;
            } else {
                self.handle_check_response(m, from, relayed, now).await;
            }
            return;
        }

        if m.typ.class == CLASS_REQUEST && m.typ.method == METHOD_BINDING {
            self.handle_binding_request(m, from, relayed, now).await;
            return;
        }

        log::trace!("ignoring {} from {from}", m.typ);
    }

    async fn apply_server_update(&self, server_id: usize, update: ServerUpdate, now: Instant) {
        match update {
            ServerUpdate::None => {}
            ServerUpdate::SendRequest(m) => {
                let dest = {
                    let mut servers = self.servers.lock().await;
                    servers.iter_mut().find(|s| s.id == server_id).and_then(|s| {
                        s.note_request_sent(now);
                        s.server_endpoint
                    })
                };
                if let Some(dest) = dest {
                    self.send_stun(&m, dest, None).await;
                }
            }
            ServerUpdate::ServerReflexive(endpoint) => {
                self.add_server_reflexive_candidate(server_id, endpoint)
                    .await;
            }
            ServerUpdate::RelayReady { relay, mapped } => {
                if let Some(mapped) = mapped {
                    self.add_server_reflexive_candidate(server_id, mapped).await;
                }
                self.add_relay_candidate(server_id, relay).await;
            }
            ServerUpdate::PermissionGranted(peer) => {
                let mut checklist = self.checklist.lock().await;
                for e in checklist.entries.iter_mut() {
                    if e.is_relay_pair() && e.remote_endpoint.ip() == peer.ip() {
                        e.turn_permission_response_at = Some(now);
                    }
                }
            }
            ServerUpdate::Failed(reason) => {
                self.emit_candidate_error(None, reason).await;
            }
        }
    }

    async fn add_server_reflexive_candidate(&self, server_id: usize, endpoint: SocketAddr) {
        let protocol = {
            let servers = self.servers.lock().await;
            servers
                .iter()
                .find(|s| s.id == server_id)
                .map(|s| s.protocol())
                .unwrap_or(CandidateProtocol::Udp)
        };

        let mut c = Candidate::server_reflexive(endpoint, self.bind_addr, protocol);
        c.server_id = Some(server_id);

        {
            let mut locals = self.local_candidates.lock().await;
            let already_known = locals.iter().any(|x| {
                x.candidate_type == CandidateType::ServerReflexive
                    && x.endpoint() == Some(endpoint)
            });
            if already_known {
                return;
            }
            locals.push(c.clone());
        }
        self.emit_candidate(c).await;
    }

    async fn add_relay_candidate(&self, server_id: usize, relay: SocketAddr) {
        let protocol = {
            let servers = self.servers.lock().await;
            servers
                .iter()
                .find(|s| s.id == server_id)
                .map(|s| s.protocol())
                .unwrap_or(CandidateProtocol::Udp)
        };

        let c = Candidate::relay(relay, self.bind_addr, protocol, server_id);
        {
            let mut locals = self.local_candidates.lock().await;
            if locals
                .iter()
                .any(|x| x.candidate_type == CandidateType::Relay && x.endpoint() == Some(relay))
            {
                return;
            }
            locals.push(c.clone());
        }
        *self.relay_candidate.lock().await = Some(c.clone());

        // pair the fresh relay candidate with every known remote
        let remotes = self.remote_candidates.lock().await.clone();
        {
            let role = self.role();
            let mut checklist = self.checklist.lock().await;
            for remote in remotes {
                if let Ok(e) = ChecklistEntry::new(c.clone(), remote) {
                    checklist.insert(e, role);
                }
            }
        }

        self.emit_candidate(c).await;
    }

    async fn handle_check_response(
        &self,
        mut m: Message,
        from: SocketAddr,
        _relayed: bool,
        now: Instant,
    ) {
        let creds = self.credentials().await;

        // responses are signed with the same key as the request they answer
        if m.contains(ATTR_MESSAGE_INTEGRITY) && !creds.remote_pwd.is_empty() {
            let key = MessageIntegrity::new_short_term_integrity(&creds.remote_pwd);
            if let Err(err) = key.check(&mut m) {
                log::warn!("dropping response with bad integrity from {from}: {err}");
                return;
            }
        }

        let success = m.typ.class == CLASS_SUCCESS_RESPONSE;
        let mut code = ErrorCodeAttribute::default();
        let is_role_conflict = !success
            && code.get_from(&m).is_ok()
            && code.code == CODE_ROLE_CONFLICT;

        let nominated = {
            let mut checklist = self.checklist.lock().await;
            let Some(i) = checklist.find_by_transaction(&m.transaction_id) else {
                log::trace!("response from {from} matches no in-flight check");
                return;
            };
            let entry = &mut checklist.entries[i];
            if success {
                entry.state = ChecklistEntryState::Succeeded;
                entry.last_connected_response_at = Some(now);
                entry.nominated
            } else if is_role_conflict {
                // switch roles and try the pair again with a fresh transaction
                let flipped = self.role() == Role::Controlling;
                self.is_controller.store(!flipped, Ordering::SeqCst);
                log::warn!("role conflict against {from}, switching role");
                entry.state = ChecklistEntryState::Waiting;
                false
            } else {
                log::debug!("check failed against {from}: {code}");
                entry.state = ChecklistEntryState::Failed;
                false
            }
        };

        if success {
            if nominated {
                self.set_connection_state(ConnectionState::Connected).await;
            }
            self.nominate_if_ready(now, &creds).await;
        }
    }

    async fn handle_binding_request(
        &self,
        mut m: Message,
        from: SocketAddr,
        relayed: bool,
        now: Instant,
    ) {
        let creds = self.credentials().await;

        // a relay-only channel refuses direct peers outright
        if self.policy == TransportPolicy::Relay && !relayed {
            self.reply_binding_error(&m, from, relayed, CODE_FORBIDDEN, &creds.local_pwd)
                .await;
            return;
        }

        // the request must be keyed with our password
        let key = MessageIntegrity::new_short_term_integrity(&creds.local_pwd);
        if key.check(&mut m).is_err() {
            self.reply_binding_error(&m, from, relayed, CODE_UNAUTHORIZED, &creds.local_pwd)
                .await;
            return;
        }

        // USERNAME must open with our ufrag
        let username = match TextAttribute::get_from_as(&m, ATTR_USERNAME) {
            Ok(u) => u.text,
            Err(_) => {
                self.reply_binding_error(&m, from, relayed, CODE_BAD_REQUEST, &creds.local_pwd)
                    .await;
                return;
            }
        };
        let mut parts = username.splitn(2, ':');
        if parts.next() != Some(creds.local_ufrag.as_str()) {
            self.reply_binding_error(&m, from, relayed, CODE_UNAUTHORIZED, &creds.local_pwd)
                .await;
            return;
        }
        let their_ufrag = parts.next().map(str::to_owned);

        // both sides claiming the same role is a conflict settled by the
        // tie breaker
        if let Ok((their_role, their_tie_breaker)) = Role::of_message(&m) {
            if their_role == self.role() {
                let reply_conflict = match self.role() {
                    Role::Controlling => self.tie_breaker >= their_tie_breaker,
                    Role::Controlled => self.tie_breaker < their_tie_breaker,
                };
                if reply_conflict {
                    self.reply_binding_error(
                        &m,
                        from,
                        relayed,
                        CODE_ROLE_CONFLICT,
                        &creds.local_pwd,
                    )
                    .await;
                    return;
                }
                let flipped = self.role() == Role::Controlled;
                self.is_controller.store(flipped, Ordering::SeqCst);
                log::warn!("role conflict with {from}, switching to {}", self.role());
            }
        }

        let mut priority = PriorityAttr::default();
        let peer_priority = priority.get_from(&m).ok().map(|_| priority.0);

        let use_candidate = UseCandidateAttr::is_set(&m);
        let mut nominated_now = false;
        let mut discovered: Option<Candidate> = None;

        {
            let role = self.role();
            let host = self.host_candidate.lock().await.clone();
            let relay = self.relay_candidate.lock().await.clone();

            let mut checklist = self.checklist.lock().await;
            let mut index = checklist.find_by_remote_endpoint(from, relayed);

            if index.is_none() {
                // a source we never signalled: peer reflexive discovery
                let prflx = Candidate::peer_reflexive(from, peer_priority, their_ufrag);
                log::debug!("discovered peer reflexive candidate {prflx}");
                let local = if relayed { relay } else { host };
                if let Some(local) = local {
                    if let Ok(entry) = ChecklistEntry::new(local, prflx.clone()) {
                        if checklist.insert(entry, role) {
                            index = checklist.find_by_remote_endpoint(from, relayed);
                        }
                    }
                }
                discovered = Some(prflx);
            }

            if let Some(i) = index {
                let entry = &mut checklist.entries[i];
                entry.last_binding_request_received_at = Some(now);
                // permissions installed by the peer reaching us still count
                if relayed && entry.turn_permission_response_at.is_none() {
                    entry.turn_permission_response_at = Some(now);
                }
                if use_candidate && role == Role::Controlled && checklist.nominate(i) {
                    nominated_now = true;
                }
            }
        }

        if let Some(prflx) = discovered {
            self.remote_candidates.lock().await.push(prflx);
        }

        self.reply_binding_success(&m, from, relayed, &creds.local_pwd)
            .await;

        if nominated_now {
            self.set_connection_state(ConnectionState::Connected).await;
        }
    }

    async fn reply_binding_success(
        &self,
        req: &Message,
        from: SocketAddr,
        relayed: bool,
        local_pwd: &str,
    ) {
        let mut resp = Message::new();
        let built = resp.build(&[
            Box::new(req.clone()),
            Box::new(BINDING_SUCCESS),
            Box::new(XorMappedAddress {
                ip: from.ip(),
                port: from.port(),
            }),
            Box::new(MessageIntegrity::new_short_term_integrity(local_pwd)),
            Box::new(FINGERPRINT),
        ]);
        if let Err(err) = built {
            log::warn!("building binding response failed: {err}");
            return;
        }
        self.send_reply(resp, from, relayed).await;
    }

    async fn reply_binding_error(
        &self,
        req: &Message,
        from: SocketAddr,
        relayed: bool,
        code: ErrorCode,
        local_pwd: &str,
    ) {
        let mut resp = Message::new();
        let built = resp.build(&[
            Box::new(req.clone()),
            Box::new(BINDING_ERROR),
            Box::new(code),
            Box::new(MessageIntegrity::new_short_term_integrity(local_pwd)),
            Box::new(FINGERPRINT),
        ]);
        if let Err(err) = built {
            log::warn!("building binding error response failed: {err}");
            return;
        }
        self.send_reply(resp, from, relayed).await;
    }

    async fn send_reply(&self, resp: Message, from: SocketAddr, relayed: bool) {
        let relay_server = if relayed {
            self.relay_candidate
                .lock()
                .await
                .as_ref()
                .and_then(|c| c.server_id)
        } else {
            None
        };
        self.send_stun(&resp, from, relay_server).await;
    }
}
