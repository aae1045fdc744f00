
use stun::attributes::ATTR_PRIORITY;
use stun::message::*;

pub(crate) const PRIORITY_SIZE: usize = 4;

/// PRIORITY attribute (RFC 8445 section 7.1.1): the priority the peer
/// reflexive candidate would get if this check discovered one.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct PriorityAttr(pub u32);

impl Setter for PriorityAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_PRIORITY, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for PriorityAttr {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_PRIORITY)?;
        if v.len() != PRIORITY_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        Ok(())
    }
}
