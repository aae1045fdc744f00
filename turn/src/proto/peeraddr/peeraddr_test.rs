use super::*;

#[test]
fn test_peer_address_round_trip() -> Result<(), stun::Error> {
    let peer = PeerAddress {
        ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        port: 50000,
    };

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_CREATE_PERMISSION, CLASS_REQUEST)),
        Box::new(peer),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let mut got = PeerAddress::default();
    got.get_from(&decoded)?;
    assert_eq!(got, peer);
    Ok(())
}

#[test]
fn test_peer_address_missing() {
    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(SEND_INDICATION)])
        .unwrap();

    let mut got = PeerAddress::default();
    assert_eq!(got.get_from(&m), Err(stun::Error::ErrAttributeNotFound));
}
