use super::*;

#[test]
fn test_channel_number_round_trip() -> Result<(), stun::Error> {
    let n = ChannelNumber(MIN_CHANNEL_NUMBER + 1);

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_CHANNEL_BIND, CLASS_REQUEST)),
        Box::new(n),
    ])?;

    let v = m.get(ATTR_CHANNEL_NUMBER)?;
    assert_eq!(v.len(), 4);
    assert_eq!(&v[2..], &[0, 0], "RFFU bytes must be zero");

    let mut got = ChannelNumber::default();
    got.get_from(&m)?;
    assert_eq!(got, n);
    Ok(())
}
