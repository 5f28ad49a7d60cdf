use std::fmt;
use std::net::Ipv6Addr;

use crate::error::Result;

use super::super::packer::*;

// An AaaaResource is an IPv6 address record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaaaResource {
    pub aaaa: Ipv6Addr,
}

impl Default for AaaaResource {
    fn default() -> Self {
        Self {
            aaaa: Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for AaaaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AAAA{{{}}}", self.aaaa)
    }
}

impl AaaaResource {
    pub(crate) fn pack(&self, msg: Vec<u8>) -> Vec<u8> {
        pack_bytes(msg, &self.aaaa.octets())
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let mut octets = [0u8; 16];
        let off = unpack_bytes(msg, off, &mut octets)?;
        self.aaaa = Ipv6Addr::from(octets);
        Ok(off)
    }
}
