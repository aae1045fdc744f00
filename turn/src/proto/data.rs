#[cfg(test)]
mod data_test;

use stun::attributes::ATTR_DATA;
use stun::message::*;

/// DATA attribute (RFC 5766 section 14.4): the application payload carried
/// by a Send or Data indication, opaque to the relay.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Data(pub Vec<u8>);

impl Setter for Data {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_DATA, &self.0);
        Ok(())
    }
}

impl Getter for Data {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        self.0 = m.get(ATTR_DATA)?;
        Ok(())
    }
}
