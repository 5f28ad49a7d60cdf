use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

use super::super::name::Name;
use super::super::packer::*;

// The restricted mDNS form (RFC 6762 §6.1): a single window block 0
// whose bitmap covers type numbers 0–255.
const MAX_BITMAP_LEN: usize = 32;

// An NsecResource asserts which record types exist at a name. mDNS uses
// it purely as a non-existence signal for the types NOT listed.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct NsecResource {
    pub next_domain: Name,
    /// Type numbers present at the name, sorted ascending, all ≤ 255.
    pub types: Vec<u16>,
}

impl fmt::Display for NsecResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NSEC{{next_domain: {}, types: {:?}}}", self.next_domain, self.types)
    }
}

impl NsecResource {
    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let mut msg = self.next_domain.pack(msg, compression, compression_off)?;

        let mut types: Vec<u16> = self.types.iter().copied().filter(|&t| t <= 255).collect();
        types.sort_unstable();
        types.dedup();

        let bitmap_len = types.last().map_or(0, |&t| t as usize / 8 + 1);
        let mut bitmap = vec![0u8; bitmap_len];
        for t in types {
            // Bit b of byte i (MSB = bit 0) carries type 8*i + (7-b),
            // so type t lands on the 1 << (t % 8) bit of its byte.
            bitmap[t as usize / 8] |= 1 << (t % 8);
        }

        msg = pack_byte(msg, 0); // window 0
        msg = pack_byte(msg, bitmap_len as u8);
        Ok(pack_bytes(msg, &bitmap))
    }

    // unpack reads the restricted form. Ok(None) means the wire data is
    // valid but outside the restricted form (window ≠ 0 or bitmap > 32
    // bytes); the caller keeps such a record opaque.
    pub(crate) fn unpack(
        &mut self,
        msg: &[u8],
        off: usize,
        length: usize,
    ) -> Result<Option<usize>> {
        let end = off + length;
        let new_off = self.next_domain.unpack(msg, off)?;

        let (window, new_off) = unpack_byte(msg, new_off)?;
        let (bitmap_len, new_off) = unpack_byte(msg, new_off)?;
        if window != 0 || bitmap_len as usize > MAX_BITMAP_LEN {
            return Ok(None);
        }
        if new_off + bitmap_len as usize > end {
            return Err(Error::ErrCalcLen);
        }

        let mut types = Vec::new();
        for i in 0..bitmap_len as usize {
            let byte = msg[new_off + i];
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    types.push((i * 8 + bit) as u16);
                }
            }
        }
        self.types = types;
        Ok(Some(new_off + bitmap_len as usize))
    }
}
