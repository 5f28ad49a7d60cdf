use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

use super::super::name::Name;
use super::super::packer::*;

// An SrvResource carries the location of a service instance.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SrvResource {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

impl fmt::Display for SrvResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SRV{{priority: {}, weight: {}, port: {}, target: {}}}",
            self.priority, self.weight, self.port, self.target
        )
    }
}

impl SrvResource {
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        msg = pack_uint16(msg, self.priority);
        msg = pack_uint16(msg, self.weight);
        msg = pack_uint16(msg, self.port);
        self.target.pack(msg, compression, compression_off)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let (priority, off) = unpack_uint16(msg, off)?;
        self.priority = priority;
        let (weight, off) = unpack_uint16(msg, off)?;
        self.weight = weight;
        let (port, off) = unpack_uint16(msg, off)?;
        self.port = port;
        self.target.unpack(msg, off)
    }
}
