
use std::fmt;

use stun::attributes::ATTR_REQUESTED_TRANSPORT;
use stun::message::*;

use super::*;

const REQUESTED_TRANSPORT_SIZE: usize = 4;

/// REQUESTED-TRANSPORT attribute (RFC 5766 section 14.7): the transport
/// protocol the allocation should relay, followed by three RFFU bytes.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct RequestedTransport {
    pub protocol: Protocol,
}

impl fmt::Display for RequestedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol: {}", self.protocol)
    }
}

impl Setter for RequestedTransport {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let v = [self.protocol.0, 0, 0, 0];
        m.add(ATTR_REQUESTED_TRANSPORT, &v);
        Ok(())
    }
}

impl Getter for RequestedTransport {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_REQUESTED_TRANSPORT)?;
        if v.len() != REQUESTED_TRANSPORT_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.protocol = Protocol(v[0]);
        Ok(())
    }
}
