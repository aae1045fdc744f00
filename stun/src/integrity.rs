#[cfg(test)]
mod integrity_test;

use std::fmt;

use md5::{Digest, Md5};
use ring::hmac;

use crate::attributes::*;
use crate::checks::*;
use crate::error::*;
use crate::message::*;

pub(crate) const CREDENTIALS_SEP: &str = ":";
pub(crate) const MESSAGE_INTEGRITY_SIZE: usize = 20;

/// MESSAGE-INTEGRITY attribute (RFC 5389 section 15.4): HMAC-SHA1 over the
/// message prefix, with the header length adjusted to cover the attribute
/// itself. The wrapped value is the HMAC key.
#[derive(Default, Clone)]
pub struct MessageIntegrity(pub Vec<u8>);

fn new_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::sign(&key, message).as_ref().to_vec()
}

impl fmt::Display for MessageIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KEY: 0x{:x?}", self.0)
    }
}

impl Setter for MessageIntegrity {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        // FINGERPRINT must stay the last attribute.
        if m.contains(ATTR_FINGERPRINT) {
            return Err(Error::ErrFingerprintBeforeIntegrity);
        }

        // The HMAC input is the message up to and including the attribute
        // preceding MESSAGE-INTEGRITY, with the header length field already
        // counting the integrity TLV.
        let length = m.length;
        m.length += (MESSAGE_INTEGRITY_SIZE + ATTRIBUTE_HEADER_SIZE) as u32;
        m.write_length();
        let v = new_hmac(&self.0, &m.raw);
        m.length = length;

        m.add(ATTR_MESSAGE_INTEGRITY, &v);
        Ok(())
    }
}

impl MessageIntegrity {
    /// Returns an integrity attribute keyed for long-term credentials:
    /// `MD5(username ":" realm ":" password)`.
    pub fn new_long_term_integrity(username: &str, realm: &str, password: &str) -> Self {
        let s = [username, realm, password].join(CREDENTIALS_SEP);

        let mut h = Md5::new();
        h.update(s.as_bytes());

        MessageIntegrity(h.finalize().as_slice().to_vec())
    }

    /// Returns an integrity attribute keyed for short-term credentials,
    /// i.e. the raw password. ICE connectivity checks use the remote
    /// party's password here.
    pub fn new_short_term_integrity(password: &str) -> Self {
        MessageIntegrity(password.as_bytes().to_vec())
    }

    /// Verifies the MESSAGE-INTEGRITY attribute of `m` against this key.
    /// Attributes after the integrity TLV (i.e. FINGERPRINT) are excluded
    /// from the covered prefix.
    pub fn check(&self, m: &mut Message) -> Result<()> {
        let v = m.get(ATTR_MESSAGE_INTEGRITY)?;

        let length = m.length;
        let mut after_integrity = false;
        let mut size_reduced = 0;
        for a in &m.attributes.0 {
            if after_integrity {
                size_reduced += nearest_padded_value_length(a.length as usize);
                size_reduced += ATTRIBUTE_HEADER_SIZE;
            }
            if a.typ == ATTR_MESSAGE_INTEGRITY {
                after_integrity = true;
            }
        }
        m.length -= size_reduced as u32;
        m.write_length();

        let start_of_hmac = MESSAGE_HEADER_SIZE + m.length as usize
            - (ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE);
        let expected = new_hmac(&self.0, &m.raw[..start_of_hmac]);

        m.length = length;
        m.write_length();

        check_hmac(&v, &expected)
    }
}
