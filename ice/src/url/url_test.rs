use super::*;

#[test]
fn test_parse_stun_url() -> Result<()> {
    let u = Url::parse_url("stun:stun.l.google.com:19302")?;
    assert_eq!(u.scheme, SchemeType::Stun);
    assert_eq!(u.host, "stun.l.google.com");
    assert_eq!(u.port, 19302);
    assert_eq!(u.proto, ProtoType::Udp);
    Ok(())
}

#[test]
fn test_parse_default_port() -> Result<()> {
    let u = Url::parse_url("stun:example.org")?;
    assert_eq!(u.port, DEFAULT_STUN_PORT);

    let u = Url::parse_url("turn:203.0.113.1")?;
    assert_eq!(u.port, DEFAULT_STUN_PORT);
    Ok(())
}

#[test]
fn test_parse_turn_transport() -> Result<()> {
    let u = Url::parse_url("turn:turn.example.org:3478?transport=tcp")?;
    assert_eq!(u.scheme, SchemeType::Turn);
    assert_eq!(u.proto, ProtoType::Tcp);

    let u = Url::parse_url("turn:turn.example.org")?;
    assert_eq!(u.proto, ProtoType::Udp);
    Ok(())
}

#[test]
fn test_secure_schemes_rejected() {
    assert_eq!(
        Url::parse_url("stuns:example.org"),
        Err(Error::ErrSchemeNotSupported)
    );
    assert_eq!(
        Url::parse_url("turns:example.org?transport=tcp"),
        Err(Error::ErrSchemeNotSupported)
    );
}

#[test]
fn test_parse_errors() {
    assert_eq!(Url::parse_url("google.de"), Err(Error::ErrSchemeType));
    assert_eq!(
        Url::parse_url("stun://example.org"),
        Err(Error::ErrInvalidUrl)
    );
    assert_eq!(
        Url::parse_url("stun:example.org?transport=udp"),
        Err(Error::ErrStunQuery)
    );
    assert_eq!(
        Url::parse_url("turn:example.org?transport=ipx"),
        Err(Error::ErrProtoType)
    );
    assert_eq!(
        Url::parse_url("turn:example.org?foo=bar"),
        Err(Error::ErrInvalidQuery)
    );
}

#[test]
fn test_parse_ipv6_host() -> Result<()> {
    let u = Url::parse_url("stun:[2001:db8::1]:3478")?;
    assert_eq!(u.host, "2001:db8::1");
    assert_eq!(u.port, 3478);
    Ok(())
}

#[test]
fn test_parse_url_list() -> Result<()> {
    let urls = Url::parse_urls("stun:a.example.org, turn:b.example.org:5000?transport=tcp")?;
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0].scheme, SchemeType::Stun);
    assert_eq!(urls[1].scheme, SchemeType::Turn);
    assert_eq!(urls[1].port, 5000);
    Ok(())
}

#[test]
fn test_display_round_trip() -> Result<()> {
    let u = Url::parse_url("turn:turn.example.org:3478?transport=udp")?;
    assert_eq!(u.to_string(), "turn:turn.example.org:3478?transport=udp");
    Ok(())
}
