
use std::fmt;

use crate::attributes::*;
use crate::checks::*;
use crate::error::*;
use crate::message::*;

const CHANGE_REQUEST_SIZE: usize = 4;
const CHANGE_IP_FLAG: u32 = 0x04;
const CHANGE_PORT_FLAG: u32 = 0x02;

/// CHANGE-REQUEST attribute (RFC 5780 section 7.2): asks the server to
/// answer from a different IP and/or port.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct ChangeRequest {
    pub change_ip: bool,
    pub change_port: bool,
}

impl fmt::Display for ChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "change-ip={} change-port={}", self.change_ip, self.change_port)
    }
}

impl Setter for ChangeRequest {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let mut v = 0u32;
        if self.change_ip {
            v |= CHANGE_IP_FLAG;
        }
        if self.change_port {
            v |= CHANGE_PORT_FLAG;
        }
        m.add(ATTR_CHANGE_REQUEST, &v.to_be_bytes());
        Ok(())
    }
}

impl Getter for ChangeRequest {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_CHANGE_REQUEST)?;
        check_size(ATTR_CHANGE_REQUEST, v.len(), CHANGE_REQUEST_SIZE)?;
        let flags = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        self.change_ip = flags & CHANGE_IP_FLAG != 0;
        self.change_port = flags & CHANGE_PORT_FLAG != 0;
        Ok(())
    }
}
