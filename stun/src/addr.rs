
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::attributes::*;
use crate::error::*;
use crate::message::*;

pub(crate) const FAMILY_IPV4: u16 = 0x01;
pub(crate) const FAMILY_IPV6: u16 = 0x02;
pub(crate) const IPV4LEN: usize = 4;
pub(crate) const IPV6LEN: usize = 16;

/// MAPPED-ADDRESS attribute (RFC 5389 section 15.1).
///
/// Deprecated in favour of XOR-MAPPED-ADDRESS but still emitted by RFC 3489
/// era servers, so both IPv4 and IPv6 values round-trip here.
pub struct MappedAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for MappedAddress {
    fn default() -> Self {
        MappedAddress {
            ip: IpAddr::V4(Ipv4Addr::from(0)),
            port: 0,
        }
    }
}

impl fmt::Display for MappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(_) => write!(f, "{}:{}", self.ip, self.port),
            IpAddr::V6(_) => write!(f, "[{}]:{}", self.ip, self.port),
        }
    }
}

impl Setter for MappedAddress {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        self.add_to_as(m, ATTR_MAPPED_ADDRESS)
    }
}

impl Getter for MappedAddress {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        self.get_from_as(m, ATTR_MAPPED_ADDRESS)
    }
}

impl MappedAddress {
    /// Decodes an address value stored in `m` as attribute type `t`.
    pub fn get_from_as(&mut self, m: &Message, t: AttrType) -> Result<()> {
        let v = m.get(t)?;
        if v.len() <= 4 {
            return Err(Error::ErrUnexpectedEof);
        }

        let family = u16::from_be_bytes([v[0], v[1]]);
        self.port = u16::from_be_bytes([v[2], v[3]]);

        match family {
            FAMILY_IPV4 => {
                if v[4..].len() < IPV4LEN {
                    return Err(Error::ErrUnexpectedEof);
                }
                let mut ip = [0; IPV4LEN];
                ip.copy_from_slice(&v[4..4 + IPV4LEN]);
                self.ip = IpAddr::V4(Ipv4Addr::from(ip));
            }
            FAMILY_IPV6 => {
                if v[4..].len() < IPV6LEN {
                    return Err(Error::ErrUnexpectedEof);
                }
                let mut ip = [0; IPV6LEN];
                ip.copy_from_slice(&v[4..4 + IPV6LEN]);
                self.ip = IpAddr::V6(Ipv6Addr::from(ip));
            }
            _ => return Err(Error::ErrUnsupportedFamily),
        }

        Ok(())
    }

    /// Encodes the address into `m` as attribute type `t`.
    pub fn add_to_as(&self, m: &mut Message, t: AttrType) -> Result<()> {
        let family = match self.ip {
            IpAddr::V4(_) => FAMILY_IPV4,
            IpAddr::V6(_) => FAMILY_IPV6,
        };

        let mut value = vec![0u8; 4];
        value[0..2].copy_from_slice(&family.to_be_bytes());
        value[2..4].copy_from_slice(&self.port.to_be_bytes());
        match self.ip {
            IpAddr::V4(ip) => value.extend_from_slice(&ip.octets()),
            IpAddr::V6(ip) => value.extend_from_slice(&ip.octets()),
        };

        m.add(t, &value);
        Ok(())
    }
}
