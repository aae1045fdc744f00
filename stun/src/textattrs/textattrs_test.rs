use super::*;

#[test]
fn test_text_attribute_round_trip() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(TextAttribute::new(ATTR_REALM, "example.org".to_owned())),
        Box::new(TextAttribute::new(ATTR_NONCE, "nonce-1".to_owned())),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;

    let realm = TextAttribute::get_from_as(&decoded, ATTR_REALM)?;
    assert_eq!(realm.text, "example.org");
    let nonce = TextAttribute::get_from_as(&decoded, ATTR_NONCE)?;
    assert_eq!(nonce.text, "nonce-1");
    Ok(())
}

#[test]
fn test_text_attribute_overflow() {
    let long = "x".repeat(MAX_USERNAME_B + 1);
    let a = TextAttribute::new(ATTR_USERNAME, long);

    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])
        .unwrap();
    assert_eq!(a.add_to(&mut m), Err(Error::ErrAttributeSizeOverflow));
}

#[test]
fn test_text_attribute_unsupported_type() {
    let a = TextAttribute::new(ATTR_PRIORITY, "nope".to_owned());
    let mut m = Message::new();
    m.build(&[Box::new(TransactionId::new()), Box::new(BINDING_REQUEST)])
        .unwrap();
    assert!(a.add_to(&mut m).is_err());
}

#[test]
fn test_text_attribute_missing() {
    let m = Message::new();
    assert_eq!(
        TextAttribute::get_from_as(&m, ATTR_REALM),
        Err(Error::ErrAttributeNotFound)
    );
}
