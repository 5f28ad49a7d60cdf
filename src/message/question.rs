use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

use super::name::Name;
use super::packer::*;
use super::{DnsClass, DnsType, CLASS_INET};

// The top bit of QCLASS is the unicast-response bit (RFC 6762 §5.4),
// not the cache-flush bit; it is split out the same way.
const UNICAST_RESPONSE_BIT: u16 = 0x8000;

/// A Question is a DNS query for one (name, type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub typ: DnsType,
    pub class: DnsClass,
    /// RFC 6762's QU bit: the querier would accept a unicast response.
    pub unicast_response: bool,
}

impl Default for Question {
    fn default() -> Self {
        Self {
            name: Name::default(),
            typ: DnsType::default(),
            class: CLASS_INET,
            unicast_response: false,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Question{{name: {}, typ: {}, class: {}}}",
            self.name, self.typ, self.class
        )
    }
}

impl Question {
    /// An Internet-class question for `name` and `typ`.
    pub fn new(name: Name, typ: DnsType) -> Self {
        Self {
            name,
            typ,
            class: CLASS_INET,
            unicast_response: false,
        }
    }

    // pack appends the wire format of the Question to msg.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        msg = self.name.pack(msg, compression, compression_off)?;
        msg = self.typ.pack(msg);
        let mut class = self.class.0 & !UNICAST_RESPONSE_BIT;
        if self.unicast_response {
            class |= UNICAST_RESPONSE_BIT;
        }
        Ok(pack_uint16(msg, class))
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let new_off = self.name.unpack(msg, off)?;
        let new_off = self.typ.unpack(msg, new_off)?;
        let (class, new_off) = unpack_uint16(msg, new_off)?;
        self.unicast_response = class & UNICAST_RESPONSE_BIT != 0;
        self.class = DnsClass(class & !UNICAST_RESPONSE_BIT);
        Ok(new_off)
    }

    /// Whether a record with `name`/`typ` answers this question. The name
    /// comparison is case-insensitive; QTYPE ANY matches every type.
    pub(crate) fn matches(&self, name: &Name, typ: DnsType) -> bool {
        self.name == *name && (self.typ == typ || self.typ == DnsType::Any)
    }
}
