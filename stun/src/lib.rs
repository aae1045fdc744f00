#![warn(rust_2018_idioms)]

#[macro_use]
extern crate lazy_static;

pub mod addr;
pub mod attributes;
mod checks;
pub mod chgreq;
pub mod error;
pub mod error_code;
pub mod fingerprint;
pub mod integrity;
pub mod message;
pub mod textattrs;
pub mod xoraddr;

pub use error::Error;
