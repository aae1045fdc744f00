#[cfg(test)]
mod channum_test;

use std::fmt;

use stun::attributes::ATTR_CHANNEL_NUMBER;
use stun::message::*;

const CHANNEL_NUMBER_SIZE: usize = 4;

/// Channel numbers live in 0x4000..=0x7FFF (RFC 5766 section 11).
pub const MIN_CHANNEL_NUMBER: u16 = 0x4000;
pub const MAX_CHANNEL_NUMBER: u16 = 0x7fff;

/// CHANNEL-NUMBER attribute (RFC 5766 section 14.1).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct ChannelNumber(pub u16);

impl fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl Setter for ChannelNumber {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let mut v = [0u8; CHANNEL_NUMBER_SIZE];
        v[0..2].copy_from_slice(&self.0.to_be_bytes());
        // the trailing two bytes are RFFU and stay zero
        m.add(ATTR_CHANNEL_NUMBER, &v);
        Ok(())
    }
}

impl Getter for ChannelNumber {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_CHANNEL_NUMBER)?;
        if v.len() != CHANNEL_NUMBER_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u16::from_be_bytes([v[0], v[1]]);
        Ok(())
    }
}
