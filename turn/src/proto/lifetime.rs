#[cfg(test)]
mod lifetime_test;

use std::fmt;
use std::time::Duration;

use stun::attributes::ATTR_LIFETIME;
use stun::message::*;

/// Default allocation lifetime the client asks for on Refresh.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);

/// LIFETIME attribute (RFC 5766 section 14.2): allocation duration in
/// seconds, rounded down.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct Lifetime(pub Duration);

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs())
    }
}

const LIFETIME_SIZE: usize = 4;

impl Setter for Lifetime {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_LIFETIME, &(self.0.as_secs() as u32).to_be_bytes());
        Ok(())
    }
}

impl Getter for Lifetime {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let v = m.get(ATTR_LIFETIME)?;
        if v.len() != LIFETIME_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        let seconds = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        self.0 = Duration::from_secs(seconds as u64);
        Ok(())
    }
}
