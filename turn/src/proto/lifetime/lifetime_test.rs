use super::*;

#[test]
fn test_lifetime_round_trip() -> Result<(), stun::Error> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_REFRESH, CLASS_REQUEST)),
        Box::new(Lifetime(Duration::from_secs(600))),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let mut got = Lifetime::default();
    got.get_from(&decoded)?;
    assert_eq!(got.0, Duration::from_secs(600));
    Ok(())
}

#[test]
fn test_lifetime_zero_releases() -> Result<(), stun::Error> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_REFRESH, CLASS_REQUEST)),
        Box::new(Lifetime(Duration::from_secs(0))),
    ])?;

    let mut got = Lifetime(Duration::from_secs(1));
    got.get_from(&m)?;
    assert_eq!(got.0, Duration::from_secs(0));
    Ok(())
}

#[test]
fn test_lifetime_bad_size() {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_REFRESH, CLASS_REQUEST)),
    ])
    .unwrap();
    m.add(ATTR_LIFETIME, &[0, 0]);

    let mut got = Lifetime::default();
    assert_eq!(
        got.get_from(&m),
        Err(stun::Error::ErrAttributeSizeInvalid)
    );
}
