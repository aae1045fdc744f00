#[cfg(test)]
mod reqfamily_test;

use std::fmt;
use std::net::IpAddr;

use stun::attributes::ATTR_REQUESTED_ADDRESS_FAMILY;
use stun::message::*;

const REQUESTED_FAMILY_SIZE: usize = 4;

/// REQUESTED-ADDRESS-FAMILY attribute (RFC 6156 section 4.1.1).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub enum RequestedAddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl RequestedAddressFamily {
    /// Picks the family matching a server endpoint.
    pub fn for_addr(ip: &IpAddr) -> Self {
        if ip.is_ipv4() {
            RequestedAddressFamily::Ipv4
        } else {
            RequestedAddressFamily::Ipv6
        }
    }

    fn value(&self) -> u8 {
        match self {
            RequestedAddressFamily::Ipv4 => 0x01,
            RequestedAddressFamily::Ipv6 => 0x02,
        }
    }
}

impl fmt::Display for RequestedAddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestedAddressFamily::Ipv4 => "IPv4",
            RequestedAddressFamily::Ipv6 => "IPv6",
        };
        write!(f, "{s}")
    }
}

impl Setter for RequestedAddressFamily {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let v = [self.value(), 0, 0, 0];
        m.add(ATTR_REQUESTED_ADDRESS_FAMILY, &v);
        Ok(())
    }
}

impl Getter for RequestedAddressFamily {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_REQUESTED_ADDRESS_FAMILY)?;
        if v.len() != REQUESTED_FAMILY_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        *self = match v[0] {
            0x01 => RequestedAddressFamily::Ipv4,
            0x02 => RequestedAddressFamily::Ipv6,
            _ => return Err(stun::Error::ErrUnsupportedFamily),
        };
        Ok(())
    }
}
