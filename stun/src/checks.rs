use subtle::ConstantTimeEq;

use crate::attributes::*;
use crate::error::*;

// check_size returns ErrAttributeSizeInvalid if got differs from expected.
pub(crate) fn check_size(_at: AttrType, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::ErrAttributeSizeInvalid)
    }
}

// check_overflow returns ErrAttributeSizeOverflow if got is bigger than max.
pub(crate) fn check_overflow(_at: AttrType, got: usize, max: usize) -> Result<()> {
    if got <= max {
        Ok(())
    } else {
        Err(Error::ErrAttributeSizeOverflow)
    }
}

// Constant-time comparison of a received HMAC against the expected one.
pub(crate) fn check_hmac(got: &[u8], expected: &[u8]) -> Result<()> {
    if got.ct_eq(expected).into() {
        Ok(())
    } else {
        Err(Error::ErrIntegrityMismatch)
    }
}

pub(crate) fn check_fingerprint(got: u32, expected: u32) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::ErrFingerprintMismatch)
    }
}
