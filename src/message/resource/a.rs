use std::fmt;
use std::net::Ipv4Addr;

use crate::error::Result;

use super::super::packer::*;

// An AResource is an IPv4 address record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AResource {
    pub a: Ipv4Addr,
}

impl Default for AResource {
    fn default() -> Self {
        Self {
            a: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for AResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{{{}}}", self.a)
    }
}

impl AResource {
    pub(crate) fn pack(&self, msg: Vec<u8>) -> Vec<u8> {
        pack_bytes(msg, &self.a.octets())
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let mut octets = [0u8; 4];
        let off = unpack_bytes(msg, off, &mut octets)?;
        self.a = Ipv4Addr::from(octets);
        Ok(off)
    }
}
