use super::*;

#[test]
fn test_use_candidate_flag() -> Result<(), stun::Error> {
    let mut m = Message::new();
    assert!(!UseCandidateAttr::is_set(&m));

    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(BINDING_REQUEST),
        Box::new(UseCandidateAttr::new()),
    ])?;

    let mut decoded = Message::new();
    decoded.write(&m.raw)?;
    assert!(UseCandidateAttr::is_set(&decoded));
    Ok(())
}
