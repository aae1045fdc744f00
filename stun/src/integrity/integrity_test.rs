use super::*;
use crate::fingerprint::FINGERPRINT;
use crate::textattrs::TextAttribute;

#[test]
fn test_long_term_key_derivation() {
    // RFC 5389 appendix A: key = MD5("user:realm:pass")
    let i = MessageIntegrity::new_long_term_integrity("user", "realm", "pass");
    assert_eq!(
        i.0,
        vec![
            0x84, 0x93, 0xfb, 0xc5, 0x3b, 0xa5, 0x82, 0xfb, 0x4c, 0x04, 0x4c, 0x45, 0x6b, 0xdc,
            0x40, 0xeb,
        ]
    );
}

#[test]
fn test_integrity_round_trip() -> Result<()> {
    let key = MessageIntegrity::new_short_term_integrity("thepassword");

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(TextAttribute::new(ATTR_USERNAME, "a:b".to_owned())),
        Box::new(key.clone()),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    key.check(&mut decoded)?;
    Ok(())
}

#[test]
fn test_integrity_mismatch() -> Result<()> {
    let key = MessageIntegrity::new_short_term_integrity("thepassword");

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(key),
    ])?;

    let wrong = MessageIntegrity::new_short_term_integrity("otherpassword");
    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    assert_eq!(wrong.check(&mut decoded), Err(Error::ErrIntegrityMismatch));
    Ok(())
}

#[test]
fn test_integrity_ignores_trailing_fingerprint() -> Result<()> {
    let key = MessageIntegrity::new_short_term_integrity("thepassword");

    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(key.clone()),
        Box::new(FINGERPRINT),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    key.check(&mut decoded)?;
    Ok(())
}

#[test]
fn test_fingerprint_must_come_last() -> Result<()> {
    let key = MessageIntegrity::new_short_term_integrity("pwd");

    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])?;
    FINGERPRINT.add_to(&mut m)?;

    assert_eq!(
        key.add_to(&mut m),
        Err(Error::ErrFingerprintBeforeIntegrity)
    );
    Ok(())
}
