use std::fmt;

use crate::error::{Error, Result};

use super::super::packer::*;
use super::super::DnsType;

// An OpaqueResource carries the raw RDATA of a record type this crate
// does not interpret. It re-encodes byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueResource {
    pub typ: DnsType,
    pub data: Vec<u8>,
}

impl Default for OpaqueResource {
    fn default() -> Self {
        Self {
            typ: DnsType::Unknown(0),
            data: Vec::new(),
        }
    }
}

impl fmt::Display for OpaqueResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque{{typ: {}, {} bytes}}", self.typ, self.data.len())
    }
}

impl OpaqueResource {
    pub(crate) fn pack(&self, msg: Vec<u8>) -> Vec<u8> {
        pack_bytes(msg, &self.data)
    }

    pub(crate) fn unpack(
        &mut self,
        typ: DnsType,
        msg: &[u8],
        off: usize,
        length: usize,
    ) -> Result<usize> {
        if off + length > msg.len() {
            return Err(Error::ErrResourceLen);
        }
        self.typ = typ;
        self.data = msg[off..off + length].to_vec();
        Ok(off + length)
    }
}
