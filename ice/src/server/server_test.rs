use stun::attributes::{ATTR_MESSAGE_INTEGRITY, ATTR_NONCE, ATTR_REALM, ATTR_USERNAME};
use stun::error_code::CODE_UNAUTHORIZED;
use turn::proto::relayaddr::RelayedAddress;

use super::*;

fn turn_server() -> IceServerConnection {
    let url = Url::parse_url("turn:203.0.113.1:3478").unwrap();
    let mut s =
        IceServerConnection::new(0, url, Some("u".to_owned()), Some("p".to_owned())).unwrap();
    s.set_resolved("203.0.113.1:3478".parse().unwrap());
    s
}

fn stun_server(id: usize) -> IceServerConnection {
    let url = Url::parse_url("stun:192.0.2.10:3478").unwrap();
    let mut s = IceServerConnection::new(id, url, None, None).unwrap();
    s.set_resolved("192.0.2.10:3478".parse().unwrap());
    s
}

fn unauthorized(req: &Message) -> Message {
    let mut resp = Message::new();
    resp.build(&[
        Box::new(req.clone()),
        Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_ERROR_RESPONSE)),
        Box::new(ErrorCodeAttribute {
            code: CODE_UNAUTHORIZED,
            reason: b"Unauthorized".to_vec(),
        }),
        Box::new(TextAttribute::new(ATTR_REALM, "R".to_owned())),
        Box::new(TextAttribute::new(ATTR_NONCE, "N".to_owned())),
    ])
    .unwrap();
    resp
}

#[test]
fn test_turn_requires_credentials() {
    let url = Url::parse_url("turn:203.0.113.1").unwrap();
    assert_eq!(
        IceServerConnection::new(0, url, None, None).err(),
        Some(Error::ErrUsernameEmpty)
    );
}

#[test]
fn test_server_id_bounds() {
    let url = Url::parse_url("stun:192.0.2.10").unwrap();
    assert_eq!(
        IceServerConnection::new(MAX_ICE_SERVERS, url, None, None).err(),
        Some(Error::ErrTooManyServers)
    );
}

#[test]
fn test_transaction_prefix_binds_responses() {
    let s = stun_server(3);
    assert_eq!(&s.transaction_prefix(), b"912453");

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::with_prefix(b"912453")),
        Box::new(BINDING_REQUEST),
    ])
    .unwrap();
    assert!(s.owns_transaction(&m.transaction_id));

    let other = TransactionId::with_prefix(b"912451");
    assert!(!s.owns_transaction(&other));
}

#[test]
fn test_binding_flow() {
    let now = Instant::now();
    let mut s = stun_server(0);

    let req = s.initial_request().unwrap();
    assert_eq!(req.typ, BINDING_REQUEST);
    assert_eq!(s.state, IceServerState::Binding);
    s.note_request_sent(now);

    let mut resp = Message::new();
    resp.build(&[
        Box::new(req.clone()),
        Box::new(BINDING_SUCCESS),
        Box::new(XorMappedAddress {
            ip: "198.51.100.1".parse().unwrap(),
            port: 40000,
        }),
    ])
    .unwrap();

    match s.on_response(&resp, now) {
        ServerUpdate::ServerReflexive(endpoint) => {
            assert_eq!(endpoint, "198.51.100.1:40000".parse().unwrap());
        }
        other => panic!("unexpected update {other:?}"),
    }
    assert_eq!(s.state, IceServerState::Usable);
    assert_eq!(
        s.server_reflexive_endpoint,
        Some("198.51.100.1:40000".parse().unwrap())
    );
}

#[test]
fn test_allocate_401_flow() {
    let now = Instant::now();
    let mut s = turn_server();

    let req = s.initial_request().unwrap();
    assert_eq!(s.state, IceServerState::Allocating);
    assert_eq!(&req.transaction_id.0[..6], b"912450");
    assert!(!req.contains(ATTR_USERNAME));
    s.note_request_sent(now);

    // the 401 challenge must trigger an authenticated retry with a fresh
    // transaction id under the same prefix
    let update = s.on_response(&unauthorized(&req), now);
    let retry = match update {
        ServerUpdate::SendRequest(m) => m,
        other => panic!("unexpected update {other:?}"),
    };
    assert_ne!(retry.transaction_id, req.transaction_id);
    assert!(s.owns_transaction(&retry.transaction_id));
    assert!(retry.contains(ATTR_USERNAME));
    assert!(retry.contains(ATTR_REALM));
    assert!(retry.contains(ATTR_NONCE));
    assert!(retry.contains(ATTR_MESSAGE_INTEGRITY));

    let mut success = Message::new();
    success
        .build(&[
            Box::new(retry.clone()),
            Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_SUCCESS_RESPONSE)),
            Box::new(RelayedAddress {
                ip: "198.51.100.9".parse().unwrap(),
                port: 49200,
            }),
            Box::new(XorMappedAddress {
                ip: "192.0.2.7".parse().unwrap(),
                port: 41000,
            }),
            Box::new(turn::proto::lifetime::Lifetime(DEFAULT_LIFETIME)),
        ])
        .unwrap();

    match s.on_response(&success, now) {
        ServerUpdate::RelayReady { relay, mapped } => {
            assert_eq!(relay, "198.51.100.9:49200".parse().unwrap());
            assert_eq!(mapped, Some("192.0.2.7:41000".parse().unwrap()));
        }
        other => panic!("unexpected update {other:?}"),
    }
    assert_eq!(s.state, IceServerState::Usable);
    assert_eq!(s.turn_expiry_at(), Some(now + DEFAULT_LIFETIME));
}

#[test]
fn test_error_response_cutoff() {
    let now = Instant::now();
    let mut s = stun_server(0);
    let req = s.initial_request().unwrap();
    s.note_request_sent(now);

    let mut err_resp = Message::new();
    err_resp
        .build(&[
            Box::new(req.clone()),
            Box::new(BINDING_ERROR),
            Box::new(ErrorCodeAttribute {
                code: stun::error_code::CODE_SERVER_ERROR,
                reason: b"Server Error".to_vec(),
            }),
        ])
        .unwrap();

    for _ in 0..MAX_ERROR_RESPONSES - 1 {
        s.on_response(&err_resp, now);
        assert_ne!(s.state, IceServerState::Failed);
    }
    match s.on_response(&err_resp, now) {
        ServerUpdate::Failed(_) => {}
        other => panic!("unexpected update {other:?}"),
    }
    assert_eq!(s.state, IceServerState::Failed);
}

#[test]
fn test_retransmit_and_request_cutoff() {
    let mut now = Instant::now();
    let mut s = stun_server(0);
    let _req = s.initial_request().unwrap();
    s.note_request_sent(now);

    // not due yet
    assert!(s.retransmit_due(now).is_none());

    for _ in 0..MAX_REQUESTS_PER_SERVER - 1 {
        now += SERVER_RETRY_INTERVAL;
        assert!(s.retransmit_due(now).is_some());
        s.note_request_sent(now);
    }

    // request 25 was the last one; the next attempt fails the server
    now += SERVER_RETRY_INTERVAL;
    assert!(s.retransmit_due(now).is_none());
    assert_eq!(s.state, IceServerState::Failed);
}

#[test]
fn test_permission_grant_round_trip() {
    let now = Instant::now();
    let mut s = turn_server();
    let req = s.initial_request().unwrap();
    let update = s.on_response(&unauthorized(&req), now);
    let retry = match update {
        ServerUpdate::SendRequest(m) => m,
        other => panic!("unexpected update {other:?}"),
    };

    let mut success = Message::new();
    success
        .build(&[
            Box::new(retry.clone()),
            Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_SUCCESS_RESPONSE)),
            Box::new(RelayedAddress {
                ip: "198.51.100.9".parse().unwrap(),
                port: 49200,
            }),
        ])
        .unwrap();
    s.on_response(&success, now);

    let peer: SocketAddr = "10.0.0.2:50000".parse().unwrap();
    let perm_req = s.create_permission(peer, now).unwrap();
    assert!(s.owns_transaction(&perm_req.transaction_id));

    let mut perm_resp = Message::new();
    perm_resp
        .build(&[
            Box::new(perm_req.clone()),
            Box::new(MessageType::new(
                METHOD_CREATE_PERMISSION,
                CLASS_SUCCESS_RESPONSE,
            )),
        ])
        .unwrap();

    match s.on_response(&perm_resp, now) {
        ServerUpdate::PermissionGranted(p) => assert_eq!(p, peer),
        other => panic!("unexpected update {other:?}"),
    }
    assert!(s.allocation().unwrap().has_permission(peer));
}
