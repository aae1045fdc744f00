#[cfg(test)]
mod message_test;

use std::fmt;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::Rng;

use crate::attributes::*;
use crate::error::*;

/// Fixed value distinguishing STUN packets from other protocols multiplexed
/// on the same port, in network byte order.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const TRANSACTION_ID_SIZE: usize = 12;

/// Setter writes an attribute (or header field) into a [`Message`].
pub trait Setter {
    fn add_to(&self, m: &mut Message) -> Result<()>;
}

/// Getter reads an attribute out of a [`Message`].
pub trait Getter {
    fn get_from(&mut self, m: &Message) -> Result<()>;
}

/// 96-bit identifier matching requests to responses.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Returns a fully random transaction id.
    pub fn new() -> Self {
        let mut tid = TransactionId::default();
        rand::thread_rng().fill(&mut tid.0);
        tid
    }

    /// Returns a transaction id whose leading bytes are `prefix` and whose
    /// remainder is random. Used to stamp every request of one client so
    /// responses can be routed without a transaction table.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        let mut tid = TransactionId::new();
        let n = prefix.len().min(TRANSACTION_ID_SIZE);
        tid.0[..n].copy_from_slice(&prefix[..n]);
        tid
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64_STANDARD.encode(self.0))
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        m.write_transaction_id();
        Ok(())
    }
}

/// Returns true if `b` looks like a STUN message: long enough for a header,
/// most significant two bits zero, and the magic cookie in place. Useful for
/// multiplexing; does not guarantee that decoding will succeed.
pub fn is_message(b: &[u8]) -> bool {
    b.len() >= MESSAGE_HEADER_SIZE
        && b[0] & 0xc0 == 0
        && u32::from_be_bytes([b[4], b[5], b[6], b[7]]) == MAGIC_COOKIE
}

const DEFAULT_RAW_CAPACITY: usize = 120;

/// A single STUN packet. The wire image is kept in `raw` so that attributes
/// covering a prefix of the message (MESSAGE-INTEGRITY, FINGERPRINT) can be
/// computed without re-encoding.
#[derive(Default, Debug, Clone)]
pub struct Message {
    pub typ: MessageType,
    pub length: u32, // of the attribute section, excluding the header
    pub transaction_id: TransactionId,
    pub attributes: Attributes,
    pub raw: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={}",
            self.typ,
            self.length,
            self.attributes.0.len(),
            self.transaction_id
        )
    }
}

// raw is a cache of the other fields and is excluded from equality.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ
            && self.length == other.length
            && self.transaction_id == other.transaction_id
            && self.attributes == other.attributes
    }
}

impl Message {
    pub fn new() -> Self {
        Message {
            raw: {
                let mut raw = Vec::with_capacity(DEFAULT_RAW_CAPACITY);
                raw.extend_from_slice(&[0; MESSAGE_HEADER_SIZE]);
                raw
            },
            ..Default::default()
        }
    }

    /// Resets the message and underlying buffer.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.length = 0;
        self.attributes.0.clear();
    }

    fn grow(&mut self, n: usize, resize: bool) {
        if self.raw.len() >= n {
            if resize {
                self.raw.resize(n, 0);
            }
            return;
        }
        self.raw.resize(n, 0);
    }

    /// Appends a new attribute TLV, padding the value to a 4-byte boundary.
    /// The value is copied into the internal buffer.
    pub fn add(&mut self, t: AttrType, v: &[u8]) {
        let alloc_size = ATTRIBUTE_HEADER_SIZE + v.len();
        let first = MESSAGE_HEADER_SIZE + self.length as usize;
        let mut last = first + alloc_size;
        self.grow(last, true);
        self.length += alloc_size as u32;

        let buf = &mut self.raw[first..last];
        buf[0..2].copy_from_slice(&t.value().to_be_bytes());
        buf[2..4].copy_from_slice(&(v.len() as u16).to_be_bytes());
        buf[ATTRIBUTE_HEADER_SIZE..].copy_from_slice(v);

        if v.len() % PADDING != 0 {
            let padded = nearest_padded_value_length(v.len()) - v.len();
            last += padded;
            self.grow(last, true);
            // zero the padding so stale buffer contents never leak
            for b in &mut self.raw[last - padded..last] {
                *b = 0;
            }
            self.length += padded as u32;
        }

        self.attributes.0.push(RawAttribute {
            typ: t,
            length: v.len() as u16,
            value: v.to_vec(),
        });
        self.write_length();
    }

    pub fn write_length(&mut self) {
        self.grow(4, false);
        self.raw[2..4].copy_from_slice(&(self.length as u16).to_be_bytes());
    }

    pub fn write_type(&mut self) {
        self.grow(2, false);
        self.raw[..2].copy_from_slice(&self.typ.value().to_be_bytes());
    }

    pub fn write_transaction_id(&mut self) {
        self.raw[8..MESSAGE_HEADER_SIZE].copy_from_slice(&self.transaction_id.0);
    }

    pub fn write_header(&mut self) {
        self.grow(MESSAGE_HEADER_SIZE, false);
        self.write_type();
        self.write_length();
        self.raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        self.write_transaction_id();
    }

    pub fn set_type(&mut self, t: MessageType) {
        self.typ = t;
        self.write_type();
    }

    /// Re-encodes the message into `raw` from its parts.
    pub fn encode(&mut self) {
        self.raw.clear();
        self.write_header();
        self.length = 0;
        let attributes: Vec<RawAttribute> = self.attributes.0.drain(..).collect();
        for a in &attributes {
            self.add(a.typ, &a.value);
        }
        self.attributes = Attributes(attributes);
    }

    /// Decodes `raw` into the message parts.
    pub fn decode(&mut self) -> Result<()> {
        let buf = &self.raw;
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrMalformedHeader);
        }

        let t = u16::from_be_bytes([buf[0], buf[1]]);
        let size = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let full_size = MESSAGE_HEADER_SIZE + size;

        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrBadMagicCookie);
        }
        if buf.len() < full_size {
            return Err(Error::ErrMalformedHeader);
        }

        self.typ.read_value(t);
        self.length = size as u32;
        self.transaction_id
            .0
            .copy_from_slice(&buf[8..MESSAGE_HEADER_SIZE]);

        self.attributes.0.clear();
        let mut offset = 0;
        let mut b = &buf[MESSAGE_HEADER_SIZE..full_size];

        while offset < size {
            if b.len() < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::ErrTruncatedAttribute);
            }

            let typ = AttrType(u16::from_be_bytes([b[0], b[1]]));
            let length = u16::from_be_bytes([b[2], b[3]]);
            let a_len = length as usize;
            let a_padded = nearest_padded_value_length(a_len);

            b = &b[ATTRIBUTE_HEADER_SIZE..];
            offset += ATTRIBUTE_HEADER_SIZE;
            if b.len() < a_padded {
                return Err(Error::ErrTruncatedAttribute);
            }

            self.attributes.0.push(RawAttribute {
                typ,
                length,
                value: b[..a_len].to_vec(),
            });
            offset += a_padded;
            b = &b[a_padded..];
        }

        Ok(())
    }

    /// Replaces the wire image with `buf` and decodes it.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.raw.clear();
        self.raw.extend_from_slice(buf);
        self.decode()?;
        Ok(buf.len())
    }

    /// Clones this message into `b`, securing `b` against later mutation of
    /// self.
    pub fn clone_to(&self, b: &mut Message) -> Result<()> {
        b.raw.clear();
        b.raw.extend_from_slice(&self.raw);
        b.decode()
    }

    pub fn contains(&self, t: AttrType) -> bool {
        self.attributes.0.iter().any(|a| a.typ == t)
    }

    /// Returns the value of the first attribute of type `t`.
    pub fn get(&self, t: AttrType) -> Result<Vec<u8>> {
        let (v, ok) = self.attributes.get(t);
        if ok {
            Ok(v.value)
        } else {
            Err(Error::ErrAttributeNotFound)
        }
    }

    /// Resets the message and applies `setters` in order, stopping at the
    /// first error.
    pub fn build(&mut self, setters: &[Box<dyn Setter>]) -> Result<()> {
        self.reset();
        self.write_header();
        for s in setters {
            s.add_to(self)?;
        }
        Ok(())
    }
}

impl Setter for Message {
    // Copies the transaction id, to aid in crafting responses.
    fn add_to(&self, b: &mut Message) -> Result<()> {
        b.transaction_id = self.transaction_id;
        b.write_transaction_id();
        Ok(())
    }
}

/// 2-bit STUN message class.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct MessageClass(pub(crate) u8);

pub const CLASS_REQUEST: MessageClass = MessageClass(0x00);
pub const CLASS_INDICATION: MessageClass = MessageClass(0x01);
pub const CLASS_SUCCESS_RESPONSE: MessageClass = MessageClass(0x02);
pub const CLASS_ERROR_RESPONSE: MessageClass = MessageClass(0x03);

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CLASS_REQUEST => "request",
            CLASS_INDICATION => "indication",
            CLASS_SUCCESS_RESPONSE => "success response",
            CLASS_ERROR_RESPONSE => "error response",
            _ => "unknown message class",
        };
        write!(f, "{s}")
    }
}

/// 12-bit STUN method.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub struct Method(pub(crate) u16);

pub const METHOD_BINDING: Method = Method(0x001);
pub const METHOD_ALLOCATE: Method = Method(0x003);
pub const METHOD_REFRESH: Method = Method(0x004);
pub const METHOD_SEND: Method = Method(0x006);
pub const METHOD_DATA: Method = Method(0x007);
pub const METHOD_CREATE_PERMISSION: Method = Method(0x008);
pub const METHOD_CHANNEL_BIND: Method = Method(0x009);

// Methods from RFC 6062.
pub const METHOD_CONNECT: Method = Method(0x00a);
pub const METHOD_CONNECTION_BIND: Method = Method(0x00b);
pub const METHOD_CONNECTION_ATTEMPT: Method = Method(0x00c);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = format!("0x{:x}", self.0);
        let s = match *self {
            METHOD_BINDING => "Binding",
            METHOD_ALLOCATE => "Allocate",
            METHOD_REFRESH => "Refresh",
            METHOD_SEND => "Send",
            METHOD_DATA => "Data",
            METHOD_CREATE_PERMISSION => "CreatePermission",
            METHOD_CHANNEL_BIND => "ChannelBind",
            METHOD_CONNECT => "Connect",
            METHOD_CONNECTION_BIND => "ConnectionBind",
            METHOD_CONNECTION_ATTEMPT => "ConnectionAttempt",
            _ => unknown.as_str(),
        };
        write!(f, "{s}")
    }
}

/// STUN message type: method plus class.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct MessageType {
    pub method: Method,
    pub class: MessageClass,
}

pub const BINDING_REQUEST: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_REQUEST,
};
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_SUCCESS_RESPONSE,
};
pub const BINDING_ERROR: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_ERROR_RESPONSE,
};
pub const DATA_INDICATION: MessageType = MessageType {
    method: METHOD_DATA,
    class: CLASS_INDICATION,
};
pub const SEND_INDICATION: MessageType = MessageType {
    method: METHOD_SEND,
    class: CLASS_INDICATION,
};

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

// Method bits are split A(M0-M3), B(M4-M6), D(M7-M11) around the two class
// bits C0 (bit 4) and C1 (bit 8). See RFC 5389 figure 3.
const METHOD_ABITS: u16 = 0x000f;
const METHOD_BBITS: u16 = 0x0070;
const METHOD_DBITS: u16 = 0x0f80;

const METHOD_BSHIFT: u16 = 1;
const METHOD_DSHIFT: u16 = 2;

const C0BIT: u16 = 0x1;
const C1BIT: u16 = 0x2;

const CLASS_C0SHIFT: u16 = 4;
const CLASS_C1SHIFT: u16 = 7;

impl Setter for MessageType {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.set_type(*self);
        Ok(())
    }
}

impl MessageType {
    pub fn new(method: Method, class: MessageClass) -> Self {
        MessageType { method, class }
    }

    /// Returns the 16-bit wire representation.
    pub fn value(&self) -> u16 {
        let method = self.method.0;
        let a = method & METHOD_ABITS;
        let b = method & METHOD_BBITS;
        let d = method & METHOD_DBITS;
        let method = a + (b << METHOD_BSHIFT) + (d << METHOD_DSHIFT);

        let c = self.class.0 as u16;
        let class = ((c & C0BIT) << CLASS_C0SHIFT) + ((c & C1BIT) << CLASS_C1SHIFT);

        method + class
    }

    /// Decodes the 16-bit wire representation.
    pub fn read_value(&mut self, value: u16) {
        let c0 = (value >> CLASS_C0SHIFT) & C0BIT;
        let c1 = (value >> CLASS_C1SHIFT) & C1BIT;
        self.class = MessageClass((c0 + c1) as u8);

        let a = value & METHOD_ABITS;
        let b = (value >> METHOD_BSHIFT) & METHOD_BBITS;
        let d = (value >> METHOD_DSHIFT) & METHOD_DBITS;
        self.method = Method(a + b + d);
    }
}
