use std::net::IpAddr;

use crate::candidate::{Candidate, CandidateProtocol};
use crate::channel::channel_config::TransportPolicy;
use crate::channel::channel_internal::ChannelInternal;

impl ChannelInternal {
    /// Enumerates host candidates and installs the wildcard checklist
    /// candidate standing for all of them.
    pub(crate) async fn gather_host_candidates(&self) {
        {
            let host = Candidate::wildcard_host(self.bind_addr.ip(), self.local_port);
            *self.host_candidate.lock().await = Some(host);
        }

        let ips = self.enumerate_host_addresses().await;
        if ips.is_empty() && self.policy != TransportPolicy::Relay {
            self.emit_candidate_error(None, "no usable host addresses".to_owned())
                .await;
            return;
        }

        let mut emitted = vec![];
        {
            let mut locals = self.local_candidates.lock().await;
            for (i, ip) in ips.iter().enumerate() {
                let iface_pref = 255u8.saturating_sub(i as u8);
                let c = Candidate::host(*ip, self.local_port, iface_pref, CandidateProtocol::Udp);
                locals.push(c.clone());
                emitted.push(c);
            }
        }
        for c in emitted {
            self.emit_candidate(c).await;
        }
    }

    async fn enumerate_host_addresses(&self) -> Vec<IpAddr> {
        // bound to a concrete address: that is the only base to advertise
        if !self.bind_addr.ip().is_unspecified() {
            return vec![self.bind_addr.ip()];
        }

        let mut ips: Vec<IpAddr> = vec![];
        for iface in self.net.get_interfaces().await {
            for ipnet in iface.addrs() {
                let ip = ipnet.addr();
                if usable_host_address(&ip) && !ips.contains(&ip) {
                    ips.push(ip);
                }
            }
        }

        if self.include_all_interface_addresses {
            return ips;
        }

        // Mode 2: advertise only the default-route address
        if let Some(ip) = default_route_ip().await {
            if usable_host_address(&ip) {
                return vec![ip];
            }
        }
        ips.truncate(1);
        ips
    }
}

// Learns the default-route source address by "connecting" a throwaway
// socket; no packet is sent.
async fn default_route_ip() -> Option<IpAddr> {
    let sock = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    sock.connect("8.8.8.8:53").await.ok()?;
    sock.local_addr().ok().map(|a| a.ip())
}

// Filters per RFC 6724 and draft-ietf-rtcweb-ip-handling: no loopback, no
// v4-mapped or v4-compatible forms, no link-local or site-local IPv6.
fn usable_host_address(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }
    match ip {
        IpAddr::V4(_) => true,
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            v6.to_ipv4_mapped().is_none()
                && v6.to_ipv4().is_none()
                && (seg[0] & 0xffc0) != 0xfe80
                && (seg[0] & 0xffc0) != 0xfec0
        }
    }
}
