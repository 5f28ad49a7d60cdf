use std::fmt;

use crate::error::Result;

use super::packer::*;
use super::{OpCode, RCode};

const HEADER_BIT_QR: u16 = 1 << 15; // query/response (response=1)
const HEADER_BIT_AA: u16 = 1 << 10; // authoritative
const HEADER_BIT_TC: u16 = 1 << 9; // truncated
const HEADER_BIT_RD: u16 = 1 << 8; // recursion desired
const HEADER_BIT_RA: u16 = 1 << 7; // recursion available
const HEADER_BIT_Z: u16 = 1 << 6; // reserved
const HEADER_BIT_AD: u16 = 1 << 5; // authentic data
const HEADER_BIT_CD: u16 = 1 << 4; // checking disabled

/// The parsed representation of a DNS message header's ID and flag words.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub response: bool,
    pub op_code: OpCode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub zero: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub rcode: RCode,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header{{id: {}, response: {}, op_code: {}, authoritative: {}, truncated: {}, recursion_desired: {}, recursion_available: {}, rcode: {}}}",
            self.id,
            self.response,
            self.op_code,
            self.authoritative,
            self.truncated,
            self.recursion_desired,
            self.recursion_available,
            self.rcode,
        )
    }
}

impl Header {
    // pack returns the wire values of the first two header words.
    pub(crate) fn pack(&self) -> (u16, u16) {
        let mut bits = (self.op_code as u16) << 11 | self.rcode as u16;
        if self.response {
            bits |= HEADER_BIT_QR;
        }
        if self.authoritative {
            bits |= HEADER_BIT_AA;
        }
        if self.truncated {
            bits |= HEADER_BIT_TC;
        }
        if self.recursion_desired {
            bits |= HEADER_BIT_RD;
        }
        if self.recursion_available {
            bits |= HEADER_BIT_RA;
        }
        if self.zero {
            bits |= HEADER_BIT_Z;
        }
        if self.authentic_data {
            bits |= HEADER_BIT_AD;
        }
        if self.checking_disabled {
            bits |= HEADER_BIT_CD;
        }
        (self.id, bits)
    }

    pub(crate) fn set_from_bits(&mut self, id: u16, bits: u16) {
        self.id = id;
        self.response = bits & HEADER_BIT_QR != 0;
        self.op_code = ((bits >> 11) & 0x0f) as OpCode;
        self.authoritative = bits & HEADER_BIT_AA != 0;
        self.truncated = bits & HEADER_BIT_TC != 0;
        self.recursion_desired = bits & HEADER_BIT_RD != 0;
        self.recursion_available = bits & HEADER_BIT_RA != 0;
        self.zero = bits & HEADER_BIT_Z != 0;
        self.authentic_data = bits & HEADER_BIT_AD != 0;
        self.checking_disabled = bits & HEADER_BIT_CD != 0;
        self.rcode = RCode::from((bits & 0x0f) as u8);
    }
}

// The header as it sits on the wire: the flag word plus four section
// counts, packed as six big-endian u16s.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderInternal {
    pub(crate) id: u16,
    pub(crate) bits: u16,
    pub(crate) questions: u16,
    pub(crate) answers: u16,
    pub(crate) authorities: u16,
    pub(crate) additionals: u16,
}

impl HeaderInternal {
    pub(crate) fn pack(&self, mut msg: Vec<u8>) -> Vec<u8> {
        msg = pack_uint16(msg, self.id);
        msg = pack_uint16(msg, self.bits);
        msg = pack_uint16(msg, self.questions);
        msg = pack_uint16(msg, self.answers);
        msg = pack_uint16(msg, self.authorities);
        pack_uint16(msg, self.additionals)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let (id, off) = unpack_uint16(msg, off)?;
        self.id = id;
        let (bits, off) = unpack_uint16(msg, off)?;
        self.bits = bits;
        let (questions, off) = unpack_uint16(msg, off)?;
        self.questions = questions;
        let (answers, off) = unpack_uint16(msg, off)?;
        self.answers = answers;
        let (authorities, off) = unpack_uint16(msg, off)?;
        self.authorities = authorities;
        let (additionals, off) = unpack_uint16(msg, off)?;
        self.additionals = additionals;
        Ok(off)
    }
}
