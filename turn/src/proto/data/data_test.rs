use super::*;

#[test]
fn test_data_round_trip() -> Result<(), stun::Error> {
    let payload = Data(vec![0x80, 0x00, 0x01, 0x02, 0x03]);

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(SEND_INDICATION),
        Box::new(payload.clone()),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let mut got = Data::default();
    got.get_from(&decoded)?;
    assert_eq!(got, payload);
    Ok(())
}

#[test]
fn test_data_unpadded_length_survives() -> Result<(), stun::Error> {
    // a 3-byte payload forces one padding byte that must not leak back
    let payload = Data(vec![1, 2, 3]);

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(SEND_INDICATION),
        Box::new(payload.clone()),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let mut got = Data::default();
    got.get_from(&decoded)?;
    assert_eq!(got.0.len(), 3);
    assert_eq!(got, payload);
    Ok(())
}
