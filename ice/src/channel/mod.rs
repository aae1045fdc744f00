#[cfg(test)]
mod channel_test;

pub mod channel_config;
pub(crate) mod channel_gather;
pub(crate) mod channel_internal;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use stun::message::Message;
use tokio::sync::Mutex;

use crate::candidate::{Candidate, CandidateInit};
use crate::error::*;
use crate::state::{ConnectionState, GatheringState};
use channel_internal::ChannelInternal;

pub use channel_config::{IceChannelConfig, IceServerConfig, TransportPolicy};

pub type OnCandidateHdlrFn =
    Box<dyn (FnMut(Candidate) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnCandidateErrorHdlrFn = Box<
    dyn (FnMut(Option<Candidate>, String) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnGatheringStateChangeHdlrFn = Box<
    dyn (FnMut(GatheringState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(ConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnStunMessageHdlrFn = Box<
    dyn (FnMut(Message, SocketAddr, bool) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;
pub type OnDataHdlrFn = Box<
    dyn (FnMut(u16, SocketAddr, Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// The ICE channel facade: one UDP socket, candidate gathering, the
/// checklist engine and the embedded TURN client behind a small surface.
pub struct IceChannel {
    pub(crate) internal: Arc<ChannelInternal>,
}

impl IceChannel {
    /// Binds the socket and readies the channel. Gathering starts when
    /// [`IceChannel::start_gather`] is called.
    pub async fn new(config: IceChannelConfig) -> Result<Self> {
        let internal = ChannelInternal::new(config).await?;
        internal.clone().spawn_read_loop();
        Ok(IceChannel { internal })
    }

    /// Fired for every local candidate once its endpoint is determined.
    pub fn on_candidate(&self, f: OnCandidateHdlrFn) {
        self.internal
            .on_candidate_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired when a candidate could not be produced or resolved.
    pub fn on_candidate_error(&self, f: OnCandidateErrorHdlrFn) {
        self.internal
            .on_candidate_error_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_gathering_state_change(&self, f: OnGatheringStateChangeHdlrFn) {
        self.internal
            .on_gathering_state_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_connection_state_change(&self, f: OnConnectionStateChangeHdlrFn) {
        self.internal
            .on_connection_state_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Taps every decoded STUN message received, with the sender and a flag
    /// telling whether it travelled through the relay.
    pub fn on_stun_message_received(&self, f: OnStunMessageHdlrFn) {
        self.internal
            .on_stun_in_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Taps every STUN message sent.
    pub fn on_stun_message_sent(&self, f: OnStunMessageHdlrFn) {
        self.internal
            .on_stun_out_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired for application payloads: `(local_port, remote, bytes)`.
    pub fn on_data(&self, f: OnDataHdlrFn) {
        self.internal
            .on_data_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Starts gathering: enumerates host candidates, kicks the ICE servers
    /// and starts the checklist timer.
    pub async fn start_gather(&self) -> Result<()> {
        self.internal.clone().start_gather().await
    }

    /// Installs the peer's ufrag/pwd and moves the connection to checking.
    pub async fn set_remote_credentials(&self, ufrag: &str, pwd: &str) -> Result<()> {
        self.internal.set_remote_credentials(ufrag, pwd).await
    }

    /// Queues a remote candidate received over signalling.
    pub async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()> {
        self.internal.clone().add_remote_candidate(candidate).await
    }

    /// Queues a remote candidate from its JSON initialisation form.
    pub async fn add_remote_candidate_init(&self, init: &CandidateInit) -> Result<()> {
        self.add_remote_candidate(init.to_candidate()?).await
    }

    /// Sends application data to `endpoint`, through the relay when the
    /// nominated pair is a relay pair for that endpoint.
    pub async fn send(&self, endpoint: SocketAddr, data: &[u8]) -> Result<usize> {
        self.internal.send_payload(endpoint, data).await
    }

    /// Resets everything except the socket and hands back fresh local
    /// credentials.
    pub async fn restart(&self) -> Result<()> {
        self.internal.restart().await
    }

    /// Stops timers, releases TURN allocations and closes the socket.
    /// Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.internal.close().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.internal.connection_state()
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.internal.gathering_state()
    }

    /// The socket's local port.
    pub fn local_port(&self) -> u16 {
        self.internal.local_port
    }

    pub async fn local_credentials(&self) -> (String, String) {
        self.internal.local_credentials().await
    }

    pub async fn local_candidates(&self) -> Vec<Candidate> {
        self.internal.local_candidates.lock().await.clone()
    }

    /// The nominated pair, once one exists.
    pub async fn nominated_pair(&self) -> Option<(Candidate, Candidate)> {
        self.internal.nominated_pair().await
    }
}
