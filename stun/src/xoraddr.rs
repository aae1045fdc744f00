
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::addr::*;
use crate::attributes::*;
use crate::error::*;
use crate::message::*;

fn xor_bytes(dst: &mut [u8], a: &[u8], b: &[u8]) {
    let n = a.len().min(b.len()).min(dst.len());
    for i in 0..n {
        dst[i] = a[i] ^ b[i];
    }
}

/// XOR-MAPPED-ADDRESS attribute (RFC 5389 section 15.2).
///
/// The port is XORed with the top half of the magic cookie; the address with
/// the cookie (IPv4) or the cookie concatenated with the transaction id
/// (IPv6).
pub struct XorMappedAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for XorMappedAddress {
    fn default() -> Self {
        XorMappedAddress {
            ip: IpAddr::V4(Ipv4Addr::from(0)),
            port: 0,
        }
    }
}

impl fmt::Display for XorMappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(_) => write!(f, "{}:{}", self.ip, self.port),
            IpAddr::V6(_) => write!(f, "[{}]:{}", self.ip, self.port),
        }
    }
}

impl Setter for XorMappedAddress {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        self.add_to_as(m, ATTR_XORMAPPED_ADDRESS)
    }
}

impl Getter for XorMappedAddress {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        self.get_from_as(m, ATTR_XORMAPPED_ADDRESS)
    }
}

impl XorMappedAddress {
    /// Encodes the XORed address into `m` as attribute type `t`. The XOR
    /// mask depends on the transaction id already written to `m`.
    pub fn add_to_as(&self, m: &mut Message, t: AttrType) -> Result<()> {
        let (family, ip) = match self.ip {
            IpAddr::V4(ip) => (FAMILY_IPV4, ip.octets().to_vec()),
            IpAddr::V6(ip) => (FAMILY_IPV6, ip.octets().to_vec()),
        };

        let mut mask = [0u8; IPV6LEN];
        mask[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        mask[4..].copy_from_slice(&m.transaction_id.0);

        let mut value = vec![0u8; 4 + ip.len()];
        value[0..2].copy_from_slice(&family.to_be_bytes());
        value[2..4].copy_from_slice(&(self.port ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());
        xor_bytes(&mut value[4..], &ip, &mask);

        m.add(t, &value);
        Ok(())
    }

    /// Decodes an XORed address stored in `m` as attribute type `t`.
    pub fn get_from_as(&mut self, m: &Message, t: AttrType) -> Result<()> {
        let v = m.get(t)?;
        if v.len() <= 4 {
            return Err(Error::ErrUnexpectedEof);
        }

        let family = u16::from_be_bytes([v[0], v[1]]);
        self.port = u16::from_be_bytes([v[2], v[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

        let mut mask = [0u8; IPV6LEN];
        mask[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        mask[4..].copy_from_slice(&m.transaction_id.0);

        match family {
            FAMILY_IPV4 => {
                if v[4..].len() < IPV4LEN {
                    return Err(Error::ErrUnexpectedEof);
                }
                let mut ip = [0; IPV4LEN];
                xor_bytes(&mut ip, &v[4..], &mask);
                self.ip = IpAddr::V4(Ipv4Addr::from(ip));
            }
            FAMILY_IPV6 => {
                if v[4..].len() < IPV6LEN {
                    return Err(Error::ErrUnexpectedEof);
                }
                let mut ip = [0; IPV6LEN];
                xor_bytes(&mut ip, &v[4..], &mask);
                self.ip = IpAddr::V6(Ipv6Addr::from(ip));
            }
            _ => return Err(Error::ErrUnsupportedFamily),
        }

        Ok(())
    }
}
