use super::*;

#[test]
fn test_tcp_type_parse() {
    assert_eq!(TcpType::from("active"), TcpType::Active);
    assert_eq!(TcpType::from("passive"), TcpType::Passive);
    assert_eq!(TcpType::from("so"), TcpType::SimultaneousOpen);
    assert_eq!(TcpType::from("something"), TcpType::Unspecified);
}

#[test]
fn test_tcp_type_display() {
    assert_eq!(TcpType::SimultaneousOpen.to_string(), "so");
    assert_eq!(TcpType::default().to_string(), "unspecified");
}
