use super::*;
use crate::textattrs::TextAttribute;

#[test]
fn test_message_type_value_round_trip() {
    let tests = [
        (BINDING_REQUEST, 0x0001),
        (BINDING_SUCCESS, 0x0101),
        (BINDING_ERROR, 0x0111),
        (
            MessageType::new(METHOD_ALLOCATE, CLASS_REQUEST),
            0x0003,
        ),
        (
            MessageType::new(METHOD_CREATE_PERMISSION, CLASS_REQUEST),
            0x0008,
        ),
        (SEND_INDICATION, 0x0016),
        (DATA_INDICATION, 0x0017),
        (
            MessageType::new(METHOD_REFRESH, CLASS_SUCCESS_RESPONSE),
            0x0104,
        ),
    ];

    for (typ, value) in tests {
        assert_eq!(typ.value(), value, "{typ}");
        let mut decoded = MessageType::default();
        decoded.read_value(value);
        assert_eq!(decoded, typ, "0x{value:04x}");
    }
}

#[test]
fn test_message_encode_decode() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(TextAttribute::new(ATTR_USERNAME, "remote:local".to_owned())),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    assert_eq!(decoded, m, "decoded message differs");
    assert_eq!(decoded.typ, BINDING_REQUEST);
    assert_eq!(
        decoded.get(ATTR_USERNAME)?,
        b"remote:local".to_vec(),
        "attribute value differs"
    );
    Ok(())
}

#[test]
fn test_message_decode_malformed_header() {
    let mut m = Message::new();
    m.raw = vec![0u8; MESSAGE_HEADER_SIZE - 1];
    assert_eq!(m.decode(), Err(Error::ErrMalformedHeader));

    // valid length, broken cookie
    let mut m = Message::new();
    m.raw = vec![0u8; MESSAGE_HEADER_SIZE];
    assert_eq!(m.decode(), Err(Error::ErrBadMagicCookie));
}

#[test]
fn test_message_decode_truncated_attribute() {
    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])
        .unwrap();
    // an 8-byte attribute section whose TLV claims an 8-byte value
    m.raw[2..4].copy_from_slice(&8u16.to_be_bytes());
    m.raw.extend_from_slice(&[0x00, 0x06, 0x00, 0x08]);
    m.raw.extend_from_slice(&[b'a', b'b', b'c', b'd']);

    assert_eq!(m.decode(), Err(Error::ErrTruncatedAttribute));
}

#[test]
fn test_attribute_padding() -> Result<()> {
    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])?;
    m.add(ATTR_USERNAME, b"abc"); // needs one padding byte

    assert_eq!(m.length % 4, 0, "length must stay 4-byte aligned");

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    assert_eq!(decoded.get(ATTR_USERNAME)?, b"abc".to_vec());
    Ok(())
}

#[test]
fn test_is_message() {
    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])
        .unwrap();
    assert!(is_message(&m.raw));

    assert!(!is_message(&[]), "empty buffer");
    assert!(!is_message(&[0; 19]), "short buffer");

    // RTP-looking first byte
    let mut rtp = m.raw.clone();
    rtp[0] = 0x80;
    assert!(!is_message(&rtp));

    // broken cookie
    let mut bad = m.raw;
    bad[4] = 0;
    assert!(!is_message(&bad));
}

#[test]
fn test_transaction_id_with_prefix() {
    let tid = TransactionId::with_prefix(b"912453");
    assert_eq!(&tid.0[..6], b"912453");

    let other = TransactionId::with_prefix(b"912453");
    // same prefix, random remainder
    assert_eq!(&other.0[..6], &tid.0[..6]);
}

#[test]
fn test_message_as_setter_copies_transaction_id() -> Result<()> {
    let mut req = Message::new();
    req.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])?;

    let mut resp = Message::new();
    resp.build(&[Box::new(BINDING_SUCCESS), Box::new(req.clone())])?;

    assert_eq!(resp.transaction_id, req.transaction_id);
    Ok(())
}
