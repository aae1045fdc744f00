use super::*;

#[test]
fn test_connection_id_round_trip() -> Result<(), stun::Error> {
    let id = ConnectionId(0xdeadbeef);

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_CONNECTION_BIND, CLASS_REQUEST)),
        Box::new(id),
    ])?;

    let mut got = ConnectionId::default();
    got.get_from(&m)?;
    assert_eq!(got, id);
    Ok(())
}
