
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Duration;
use util::vnet::net::Net;

use crate::error::*;

/// Budget for a single lookup; a slower resolver marks the owning
/// ICE-server entry failed.
pub const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolves an ICE server hostname to a concrete endpoint. Kept per channel
/// rather than process-wide so tests can substitute their own resolver.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr>;
}

/// Resolver backed by the system stack via [`util::vnet::net::Net`].
pub struct SystemDnsResolver {
    net: Arc<Net>,
}

impl SystemDnsResolver {
    pub fn new(net: Arc<Net>) -> Self {
        SystemDnsResolver { net }
    }
}

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        // IP literals short-circuit the lookup
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let addr = self
            .net
            .resolve_addr(true, &format!("{host}:{port}"))
            .await
            .map_err(|_| Error::ErrHostNotFound)?;
        Ok(addr)
    }
}

/// Optional resolver for remote `.local` candidate addresses. Resolution
/// internals live outside this crate; without a resolver such candidates
/// are dropped with a candidate error.
#[async_trait]
pub trait MdnsResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<IpAddr>;
}

/// Runs `resolve` under the fixed lookup budget.
pub async fn resolve_with_timeout(
    resolver: &Arc<dyn DnsResolver>,
    host: &str,
    port: u16,
) -> Result<SocketAddr> {
    match tokio::time::timeout(DNS_LOOKUP_TIMEOUT, resolver.resolve(host, port)).await {
        Ok(result) => result,
        Err(_) => Err(Error::ErrDnsTimeout),
    }
}
