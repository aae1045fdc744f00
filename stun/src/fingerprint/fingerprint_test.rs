use super::*;
use crate::textattrs::TextAttribute;

#[test]
fn test_fingerprint_value_uses_xor() {
    let b = b"\x00\x01\x00\x00\x21\x12\xa4\x42";
    let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(b);
    assert_eq!(fingerprint_value(b), crc ^ FINGERPRINT_XOR_VALUE);
}

#[test]
fn test_fingerprint_round_trip() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(TextAttribute::new(ATTR_SOFTWARE, "rtcice".to_owned())),
        Box::new(FINGERPRINT),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    FINGERPRINT.check(&decoded)?;
    Ok(())
}

#[test]
fn test_fingerprint_detects_corruption() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(FINGERPRINT),
    ])?;

    // flip one payload byte
    m.raw[9] ^= 0xff;
    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    assert_eq!(
        FINGERPRINT.check(&decoded),
        Err(Error::ErrFingerprintMismatch)
    );
    Ok(())
}
