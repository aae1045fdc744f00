use std::net::Ipv6Addr;

use super::*;

#[test]
fn test_requested_family_round_trip() -> Result<(), stun::Error> {
    for family in [RequestedAddressFamily::Ipv4, RequestedAddressFamily::Ipv6] {
        let mut m = Message::new();
        m.build(&[
            Box::new(TransactionId::new()),
            Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_REQUEST)),
            Box::new(family),
        ])?;

        let mut got = RequestedAddressFamily::default();
        got.get_from(&m)?;
        assert_eq!(got, family);
    }
    Ok(())
}

#[test]
fn test_requested_family_for_addr() {
    assert_eq!(
        RequestedAddressFamily::for_addr(&IpAddr::V4([203, 0, 113, 1].into())),
        RequestedAddressFamily::Ipv4
    );
    assert_eq!(
        RequestedAddressFamily::for_addr(&IpAddr::V6(Ipv6Addr::LOCALHOST)),
        RequestedAddressFamily::Ipv6
    );
}

#[test]
fn test_requested_family_unknown_value() {
    let mut m = Message::new();
    m.build(&[
        Box::new(TransactionId::new()),
        Box::new(MessageType::new(METHOD_ALLOCATE, CLASS_REQUEST)),
    ])
    .unwrap();
    m.add(ATTR_REQUESTED_ADDRESS_FAMILY, &[0x03, 0, 0, 0]);

    let mut got = RequestedAddressFamily::default();
    assert_eq!(got.get_from(&m), Err(stun::Error::ErrUnsupportedFamily));
}
