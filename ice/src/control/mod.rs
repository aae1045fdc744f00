
use std::fmt;

use stun::attributes::*;
use stun::message::*;

use crate::error::Error;

pub(crate) const TIE_BREAKER_SIZE: usize = 8;

/// The 64-bit tie breaker carried by ICE-CONTROLLING / ICE-CONTROLLED.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct TieBreaker(pub u64);

impl TieBreaker {
    /// Writes the tie breaker to `m` as attribute type `t`.
    pub fn add_to_as(self, m: &mut Message, t: AttrType) -> Result<(), stun::Error> {
        m.add(t, &self.0.to_be_bytes());
        Ok(())
    }

    /// Reads the tie breaker stored in `m` as attribute type `t`.
    pub fn get_from_as(&mut self, m: &Message, t: AttrType) -> Result<(), stun::Error> {
        let v = m.get(t)?;
        if v.len() != TIE_BREAKER_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        self.0 = u64::from_be_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        Ok(())
    }
}

/// ICE-CONTROLLED attribute.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct AttrControlled(pub u64);

impl Setter for AttrControlled {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        TieBreaker(self.0).add_to_as(m, ATTR_ICE_CONTROLLED)
    }
}

impl Getter for AttrControlled {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let mut t = TieBreaker::default();
        t.get_from_as(m, ATTR_ICE_CONTROLLED)?;
        self.0 = t.0;
        Ok(())
    }
}

/// ICE-CONTROLLING attribute.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct AttrControlling(pub u64);

impl Setter for AttrControlling {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        TieBreaker(self.0).add_to_as(m, ATTR_ICE_CONTROLLING)
    }
}

impl Getter for AttrControlling {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        let mut t = TieBreaker::default();
        t.get_from_as(m, ATTR_ICE_CONTROLLING)?;
        self.0 = t.0;
        Ok(())
    }
}

/// Role of the agent in the session, decided at channel creation.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Role {
    Controlling,
    Controlled,
}

impl Role {
    /// Returns the attribute announcing this role together with the tie
    /// breaker.
    pub fn to_attribute(self, tie_breaker: u64) -> Box<dyn Setter> {
        match self {
            Role::Controlling => Box::new(AttrControlling(tie_breaker)),
            Role::Controlled => Box::new(AttrControlled(tie_breaker)),
        }
    }

    /// Reads the role the sender of `m` claims, with its tie breaker.
    pub fn of_message(m: &Message) -> Result<(Role, u64), Error> {
        if m.contains(ATTR_ICE_CONTROLLING) {
            let mut a = AttrControlling::default();
            a.get_from(m).map_err(Error::Stun)?;
            return Ok((Role::Controlling, a.0));
        }
        if m.contains(ATTR_ICE_CONTROLLED) {
            let mut a = AttrControlled::default();
            a.get_from(m).map_err(Error::Stun)?;
            return Ok((Role::Controlled, a.0));
        }
        Err(Error::Stun(stun::Error::ErrAttributeNotFound))
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Controlled
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        match raw {
            "controlling" => Self::Controlling,
            _ => Self::Controlled,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Controlling => "controlling",
            Self::Controlled => "controlled",
        };
        write!(f, "{s}")
    }
}
