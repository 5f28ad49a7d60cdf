use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

use super::super::name::Name;

// A PtrResource is a pointer to another name.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PtrResource {
    pub ptr: Name,
}

impl fmt::Display for PtrResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PTR{{{}}}", self.ptr)
    }
}

impl PtrResource {
    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        self.ptr.pack(msg, compression, compression_off)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        self.ptr.unpack(msg, off)
    }
}
