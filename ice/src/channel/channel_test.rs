use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stun::attributes::{ATTR_ERROR_CODE, ATTR_USERNAME};
use stun::error_code::{ErrorCodeAttribute, CODE_FORBIDDEN, CODE_UNAUTHORIZED};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::TextAttribute;
use stun::xoraddr::XorMappedAddress;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::channel_config::{IceChannelConfig, IceServerConfig, TransportPolicy};
use super::IceChannel;
use crate::candidate::{unmarshal_candidate, CandidateType};
use crate::checklist::ChecklistEntryState;
use crate::control::AttrControlling;
use crate::priority::PriorityAttr;
use crate::state::{ConnectionState, GatheringState};
use crate::use_candidate::UseCandidateAttr;

fn loopback_config() -> IceChannelConfig {
    IceChannelConfig {
        bind_address: Some("127.0.0.1".parse().unwrap()),
        ..Default::default()
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, f: F) {
    for _ in 0..250 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn check_request(
    local_ufrag: &str,
    local_pwd: &str,
    remote_ufrag: &str,
    use_candidate: bool,
) -> Message {
    let mut setters: Vec<Box<dyn Setter>> = vec![
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(TextAttribute::new(
            ATTR_USERNAME,
            format!("{local_ufrag}:{remote_ufrag}"),
        )),
        Box::new(PriorityAttr(2_130_706_431)),
        Box::new(AttrControlling(99)),
    ];
    if use_candidate {
        setters.push(Box::new(UseCandidateAttr::new()));
    }
    setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
        local_pwd,
    )));
    setters.push(Box::new(FINGERPRINT));

    let mut m = Message::new();
    m.build(&setters).unwrap();
    m
}

async fn recv_message(sock: &UdpSocket) -> Message {
    let mut buf = vec![0u8; 2048];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), sock.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .unwrap();
    let mut m = Message::new();
    m.write(&buf[..n]).unwrap();
    m
}

#[tokio::test]
async fn test_gathering_completes_without_servers() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    ch.on_candidate(Box::new(move |c| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(c).await;
        })
    }));

    assert_eq!(ch.gathering_state(), GatheringState::New);
    ch.start_gather().await.unwrap();

    let internal = Arc::clone(&ch.internal);
    wait_until("gathering complete", || {
        internal.gathering_state() == GatheringState::Complete
    })
    .await;

    let c = rx.recv().await.expect("a host candidate");
    assert_eq!(c.candidate_type, CandidateType::Host);
    assert_eq!(c.address, "127.0.0.1");
    assert_eq!(c.port, ch.local_port());

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_peer_reflexive_discovery() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();
    let (ufrag, pwd) = ch.local_credentials().await;

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let dest: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();

    let req = check_request(&ufrag, &pwd, "remoteufrag", false);
    peer.send_to(&req.raw, dest).await.unwrap();

    // the agent answers with a success echoing our source address
    let resp = recv_message(&peer).await;
    assert_eq!(resp.typ, BINDING_SUCCESS);
    assert_eq!(resp.transaction_id, req.transaction_id);
    let mut mapped = XorMappedAddress::default();
    mapped.get_from(&resp).unwrap();
    assert_eq!(SocketAddr::new(mapped.ip, mapped.port), peer_addr);

    // and has grown a prflx entry in waiting state
    {
        let checklist = ch.internal.checklist.lock().await;
        assert_eq!(checklist.len(), 1);
        let entry = &checklist.entries[0];
        assert_eq!(entry.remote.candidate_type, CandidateType::PeerReflexive);
        assert_eq!(entry.remote_endpoint, peer_addr);
        assert_eq!(entry.state, ChecklistEntryState::Waiting);
        assert!(!entry.nominated);
    }

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_integrity_is_rejected() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();
    let (ufrag, _) = ch.local_credentials().await;

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();

    let req = check_request(&ufrag, "the-wrong-password", "remoteufrag", false);
    peer.send_to(&req.raw, dest).await.unwrap();

    let resp = recv_message(&peer).await;
    assert_eq!(resp.typ, BINDING_ERROR);
    let mut code = ErrorCodeAttribute::default();
    code.get_from(&resp).unwrap();
    assert_eq!(code.code, CODE_UNAUTHORIZED);

    // a rejected request must not create state
    assert_eq!(ch.internal.checklist.lock().await.len(), 0);

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_relay_policy_rejects_direct_checks() {
    let mut config = loopback_config();
    config.policy = TransportPolicy::Relay;
    let ch = IceChannel::new(config).await.unwrap();
    ch.start_gather().await.unwrap();
    let (ufrag, pwd) = ch.local_credentials().await;

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();

    let req = check_request(&ufrag, &pwd, "remoteufrag", false);
    peer.send_to(&req.raw, dest).await.unwrap();

    let resp = recv_message(&peer).await;
    assert_eq!(resp.typ, BINDING_ERROR);
    assert!(resp.contains(ATTR_ERROR_CODE));
    let mut code = ErrorCodeAttribute::default();
    code.get_from(&resp).unwrap();
    assert_eq!(code.code, CODE_FORBIDDEN);

    assert_eq!(ch.internal.checklist.lock().await.len(), 0);

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_use_candidate_nominates_immediately() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();
    ch.set_remote_credentials("remoteufrag", "remotepwd")
        .await
        .unwrap();
    assert_eq!(ch.connection_state(), ConnectionState::Checking);

    let (ufrag, pwd) = ch.local_credentials().await;
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let dest: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();

    let req = check_request(&ufrag, &pwd, "remoteufrag", true);
    peer.send_to(&req.raw, dest).await.unwrap();

    let resp = recv_message(&peer).await;
    assert_eq!(resp.typ, BINDING_SUCCESS);

    let internal = Arc::clone(&ch.internal);
    wait_until("nomination", || {
        internal.connection_state() == ConnectionState::Connected
    })
    .await;

    let (local, remote) = ch.nominated_pair().await.expect("a nominated pair");
    assert_eq!(local.candidate_type, CandidateType::Host);
    assert_eq!(remote.endpoint(), Some(peer_addr));

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_application_data_demux() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    ch.on_data(Box::new(move |port, from, payload| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send((port, from, payload)).await;
        })
    }));

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let dest: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();

    // 0x80 in the first byte: RTP-looking, must bypass the STUN paths
    peer.send_to(&[0x80, 1, 2, 3], dest).await.unwrap();

    let (port, from, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(port, ch.local_port());
    assert_eq!(from, peer_addr);
    assert_eq!(payload, vec![0x80, 1, 2, 3]);

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_host_to_host_connectivity() {
    let a = IceChannel::new(IceChannelConfig {
        is_controller: true,
        ..loopback_config()
    })
    .await
    .unwrap();
    let b = IceChannel::new(loopback_config()).await.unwrap();

    let (a_ufrag, a_pwd) = a.local_credentials().await;
    let (b_ufrag, b_pwd) = b.local_credentials().await;

    a.start_gather().await.unwrap();
    b.start_gather().await.unwrap();

    a.set_remote_credentials(&b_ufrag, &b_pwd).await.unwrap();
    b.set_remote_credentials(&a_ufrag, &a_pwd).await.unwrap();

    let line_a = format!(
        "candidate:1 1 udp 2130706431 127.0.0.1 {} typ host",
        a.local_port()
    );
    let line_b = format!(
        "candidate:1 1 udp 2130706431 127.0.0.1 {} typ host",
        b.local_port()
    );
    a.add_remote_candidate(unmarshal_candidate(&line_b).unwrap())
        .await
        .unwrap();
    b.add_remote_candidate(unmarshal_candidate(&line_a).unwrap())
        .await
        .unwrap();

    let ai = Arc::clone(&a.internal);
    let bi = Arc::clone(&b.internal);
    wait_until("both sides connected", || {
        ai.connection_state() == ConnectionState::Connected
            && bi.connection_state() == ConnectionState::Connected
    })
    .await;

    // both agree on a single nominated pair
    let (_, a_remote) = a.nominated_pair().await.unwrap();
    assert_eq!(
        a_remote.endpoint(),
        Some(format!("127.0.0.1:{}", b.local_port()).parse().unwrap())
    );

    // and the path carries application data
    let (tx, mut rx) = mpsc::channel(4);
    b.on_data(Box::new(move |_, _, payload| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(payload).await;
        })
    }));

    a.send(a_remote.endpoint().unwrap(), &[0x80, 9, 9, 9])
        .await
        .unwrap();
    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, vec![0x80, 9, 9, 9]);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

// A minimal TURN server: 401-challenges the first Allocate, then grants the
// allocation and any CreatePermission.
async fn run_mock_turn_server(sock: UdpSocket, relay_addr: SocketAddr) {
    let mut buf = vec![0u8; 2048];
    loop {
        let Ok((n, from)) = sock.recv_from(&mut buf).await else {
            return;
        };
        let mut req = Message::new();
        if req.write(&buf[..n]).is_err() {
            continue;
        }

        let resp = match (req.typ.method, req.typ.class) {
            (METHOD_ALLOCATE, CLASS_REQUEST) => {
                let mut resp = Message::new();
                if req.contains(stun::attributes::ATTR_MESSAGE_INTEGRITY) {
                    resp.build(&[
                        Box::new(req.clone()),
                        Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_SUCCESS_RESPONSE)),
                        Box::new(turn::proto::relayaddr::RelayedAddress {
                            ip: relay_addr.ip(),
                            port: relay_addr.port(),
                        }),
                        Box::new(XorMappedAddress {
                            ip: from.ip(),
                            port: from.port(),
                        }),
                        Box::new(turn::proto::lifetime::Lifetime(Duration::from_secs(600))),
                    ])
                    .unwrap();
                } else {
                    resp.build(&[
                        Box::new(req.clone()),
                        Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_ERROR_RESPONSE)),
                        Box::new(ErrorCodeAttribute {
                            code: CODE_UNAUTHORIZED,
                            reason: b"Unauthorized".to_vec(),
                        }),
                        Box::new(TextAttribute::new(
                            stun::attributes::ATTR_REALM,
                            "R".to_owned(),
                        )),
                        Box::new(TextAttribute::new(
                            stun::attributes::ATTR_NONCE,
                            "N".to_owned(),
                        )),
                    ])
                    .unwrap();
                }
                resp
            }
            (METHOD_CREATE_PERMISSION, CLASS_REQUEST) => {
                let mut resp = Message::new();
                resp.build(&[
                    Box::new(req.clone()),
                    Box::new(MessageType::new(
                        METHOD_CREATE_PERMISSION,
                        CLASS_SUCCESS_RESPONSE,
                    )),
                ])
                .unwrap();
                resp
            }
            (METHOD_REFRESH, CLASS_REQUEST) => {
                let mut resp = Message::new();
                resp.build(&[
                    Box::new(req.clone()),
                    Box::new(MessageType::new(METHOD_REFRESH, CLASS_SUCCESS_RESPONSE)),
                    Box::new(turn::proto::lifetime::Lifetime(Duration::from_secs(600))),
                ])
                .unwrap();
                resp
            }
            _ => continue,
        };

        let _ = sock.send_to(&resp.raw, from).await;
    }
}

#[tokio::test]
async fn test_turn_allocation_produces_relay_candidate() {
    let server_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_sock.local_addr().unwrap();
    let relay_addr: SocketAddr = "127.0.0.1:49999".parse().unwrap();
    tokio::spawn(run_mock_turn_server(server_sock, relay_addr));

    let config = IceChannelConfig {
        ice_servers: vec![IceServerConfig {
            urls: format!("turn:127.0.0.1:{}", server_addr.port()),
            username: Some("u".to_owned()),
            credential: Some("p".to_owned()),
        }],
        ..loopback_config()
    };
    let ch = IceChannel::new(config).await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    ch.on_candidate(Box::new(move |c| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(c).await;
        })
    }));

    ch.start_gather().await.unwrap();

    let mut saw_relay = false;
    let mut saw_srflx = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !(saw_relay && saw_srflx) {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("timed out waiting for candidates");
        let c = tokio::time::timeout(remaining, rx.recv())
            .await
            .expect("timed out waiting for candidates")
            .unwrap();
        match c.candidate_type {
            CandidateType::Relay => {
                assert_eq!(c.endpoint(), Some(relay_addr));
                assert_eq!(c.priority >> 24, 0, "relay type preference is zero");
                assert_eq!(c.priority & 0xff, 255);
                saw_relay = true;
            }
            CandidateType::ServerReflexive => {
                assert_eq!(c.port, ch.local_port());
                saw_srflx = true;
            }
            _ => {}
        }
    }

    let internal = Arc::clone(&ch.internal);
    wait_until("gathering complete", || {
        internal.gathering_state() == GatheringState::Complete
    })
    .await;

    ch.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();

    ch.close().await.unwrap();
    ch.close().await.unwrap();
    assert_eq!(ch.connection_state(), ConnectionState::Closed);

    // no operation may start new work afterwards
    let dest: SocketAddr = "127.0.0.1:5000".parse().unwrap();
    assert!(ch.send(dest, b"late").await.is_err());
    assert!(ch.start_gather().await.is_err());
    assert!(ch
        .set_remote_credentials("ufrag", "pwd")
        .await
        .is_err());
}

// A STUN-only server: echoes the source address of every Binding request.
async fn run_mock_stun_server(sock: UdpSocket) {
    let mut buf = vec![0u8; 2048];
    loop {
        let Ok((n, from)) = sock.recv_from(&mut buf).await else {
            return;
        };
        let mut req = Message::new();
        if req.write(&buf[..n]).is_err() || req.typ != BINDING_REQUEST {
            continue;
        }

        let mut resp = Message::new();
        resp.build(&[
            Box::new(req.clone()),
            Box::new(BINDING_SUCCESS),
            Box::new(XorMappedAddress {
                ip: from.ip(),
                port: from.port(),
            }),
        ])
        .unwrap();
        let _ = sock.send_to(&resp.raw, from).await;
    }
}

#[tokio::test]
async fn test_stun_binding_produces_srflx_candidate() {
    let server_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_sock.local_addr().unwrap();
    tokio::spawn(run_mock_stun_server(server_sock));

    let config = IceChannelConfig {
        ice_servers: vec![IceServerConfig {
            urls: format!("stun:127.0.0.1:{}", server_addr.port()),
            ..Default::default()
        }],
        ..loopback_config()
    };
    let ch = IceChannel::new(config).await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    ch.on_candidate(Box::new(move |c| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(c).await;
        })
    }));

    ch.start_gather().await.unwrap();

    // without a NAT in the way the reflexive address is our own socket
    let expected: SocketAddr = format!("127.0.0.1:{}", ch.local_port()).parse().unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("timed out waiting for the srflx candidate");
        let c = tokio::time::timeout(remaining, rx.recv())
            .await
            .expect("timed out waiting for the srflx candidate")
            .unwrap();
        if c.candidate_type == CandidateType::ServerReflexive {
            assert_eq!(c.endpoint(), Some(expected));
            assert_eq!(c.related_address.as_deref(), Some("127.0.0.1"));
            break;
        }
    }

    let internal = Arc::clone(&ch.internal);
    wait_until("gathering complete", || {
        internal.gathering_state() == GatheringState::Complete
    })
    .await;

    ch.close().await.unwrap();
}

struct LoopbackMdns;

#[async_trait::async_trait]
impl crate::dns::MdnsResolver for LoopbackMdns {
    async fn resolve(&self, _name: &str) -> crate::error::Result<std::net::IpAddr> {
        Ok("127.0.0.1".parse().unwrap())
    }
}

#[tokio::test]
async fn test_mdns_remote_candidate_resolves() {
    let config = IceChannelConfig {
        mdns_resolver: Some(Arc::new(LoopbackMdns)),
        ..loopback_config()
    };
    let ch = IceChannel::new(config).await.unwrap();
    ch.start_gather().await.unwrap();

    let line = "candidate:1 1 udp 2130706431 precious.local 50222 typ host";
    ch.add_remote_candidate(unmarshal_candidate(line).unwrap())
        .await
        .unwrap();

    let internal = Arc::clone(&ch.internal);
    wait_until("resolved entry", || {
        internal.checklist.try_lock().map(|c| c.len() == 1).unwrap_or(false)
    })
    .await;

    {
        let checklist = ch.internal.checklist.lock().await;
        assert_eq!(
            checklist.entries[0].remote_endpoint,
            "127.0.0.1:50222".parse().unwrap()
        );
    }

    ch.close().await.unwrap();
}

struct FailingResolver;

#[async_trait::async_trait]
impl crate::dns::DnsResolver for FailingResolver {
    async fn resolve(
        &self,
        _host: &str,
        _port: u16,
    ) -> crate::error::Result<SocketAddr> {
        Err(crate::error::Error::ErrHostNotFound)
    }
}

#[tokio::test]
async fn test_unresolvable_remote_candidate_is_dropped() {
    let config = IceChannelConfig {
        dns_resolver: Some(Arc::new(FailingResolver)),
        ..loopback_config()
    };
    let ch = IceChannel::new(config).await.unwrap();
    ch.start_gather().await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    ch.on_candidate_error(Box::new(move |c, reason| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send((c, reason)).await;
        })
    }));

    let line = "candidate:1 1 udp 2130706431 nosuch.example.org 50222 typ host";
    ch.add_remote_candidate(unmarshal_candidate(line).unwrap())
        .await
        .unwrap();

    let (candidate, _reason) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(candidate.unwrap().address, "nosuch.example.org");

    // the failed lookup dropped that candidate only
    assert_eq!(ch.internal.checklist.lock().await.len(), 0);

    ch.close().await.unwrap();
}

// Takes a full failed-timeout of wall clock; run with --ignored.
#[tokio::test]
#[ignore = "waits out the 16s failed timeout in real time"]
async fn test_lone_pair_timeout_fails_channel() {
    let ch = IceChannel::new(loopback_config()).await.unwrap();
    ch.start_gather().await.unwrap();
    ch.set_remote_credentials("remoteufrag", "remotepwd")
        .await
        .unwrap();

    // a blackhole: nothing answers on the discard port
    let line = "candidate:1 1 udp 2130706431 127.0.0.1 9 typ host";
    ch.add_remote_candidate(unmarshal_candidate(line).unwrap())
        .await
        .unwrap();

    let internal = Arc::clone(&ch.internal);
    for _ in 0..1000 {
        if internal.connection_state() == ConnectionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(ch.connection_state(), ConnectionState::Failed);

    ch.close().await.unwrap();
}
