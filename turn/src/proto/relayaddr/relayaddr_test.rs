use super::*;

#[test]
fn test_relayed_address_round_trip() -> Result<(), stun::Error> {
    let relay = RelayedAddress {
        ip: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)),
        port: 49200,
    };

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_SUCCESS_RESPONSE)),
        Box::new(relay),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let mut got = RelayedAddress::default();
    got.get_from(&decoded)?;
    assert_eq!(got, relay);
    Ok(())
}
