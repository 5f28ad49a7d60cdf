//! DNS wire codec (RFC 1035) with the mDNS extensions of RFC 6762:
//! the cache-flush and unicast-response bits, and the record types
//! DNS-SD composes (A, AAAA, PTR, TXT, SRV, NSEC).

#[cfg(test)]
mod message_test;

pub(crate) mod header;
pub(crate) mod name;
mod packer;
pub(crate) mod question;
pub(crate) mod resource;

use std::fmt;

use header::HeaderInternal;
use packer::*;

pub use header::Header;
pub use name::Name;
pub use question::Question;
pub use resource::{
    AResource, AaaaResource, NsecResource, OpaqueResource, PtrResource, RData,
    Resource, SrvResource, TxtAttribute, TxtResource, TxtValue,
};
pub(crate) use resource::compare_records;

use crate::error::{Error, Result};

/// A Type is a type of DNS request and response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DnsType {
    A,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Nsec,
    /// QTYPE ANY (255); only meaningful in questions.
    Any,
    /// Any other type number; its records stay opaque.
    Unknown(u16),
}

impl Default for DnsType {
    fn default() -> Self {
        DnsType::Unknown(0)
    }
}

impl DnsType {
    /// The IANA type number.
    pub fn value(&self) -> u16 {
        match self {
            DnsType::A => 1,
            DnsType::Ptr => 12,
            DnsType::Txt => 16,
            DnsType::Aaaa => 28,
            DnsType::Srv => 33,
            DnsType::Nsec => 47,
            DnsType::Any => 255,
            DnsType::Unknown(v) => *v,
        }
    }

    pub(crate) fn pack(&self, msg: Vec<u8>) -> Vec<u8> {
        pack_uint16(msg, self.value())
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let (t, o) = unpack_uint16(msg, off)?;
        *self = DnsType::from(t);
        Ok(o)
    }
}

impl From<u16> for DnsType {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsType::A,
            12 => DnsType::Ptr,
            16 => DnsType::Txt,
            28 => DnsType::Aaaa,
            33 => DnsType::Srv,
            47 => DnsType::Nsec,
            255 => DnsType::Any,
            _ => DnsType::Unknown(v),
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsType::A => write!(f, "A"),
            DnsType::Ptr => write!(f, "PTR"),
            DnsType::Txt => write!(f, "TXT"),
            DnsType::Aaaa => write!(f, "AAAA"),
            DnsType::Srv => write!(f, "SRV"),
            DnsType::Nsec => write!(f, "NSEC"),
            DnsType::Any => write!(f, "ANY"),
            DnsType::Unknown(v) => write!(f, "TYPE{v}"),
        }
    }
}

/// A Class is a type of network.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DnsClass(pub u16);

/// Internet class (IN) - the only class mDNS traffic uses.
pub const CLASS_INET: DnsClass = DnsClass(1);

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CLASS_INET => write!(f, "ClassINET"),
            DnsClass(v) => write!(f, "Class{v}"),
        }
    }
}

/// An OpCode is a DNS operation code.
pub type OpCode = u16;

/// An RCode is a DNS response status code.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RCode {
    #[default]
    Success = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
    Unsupported,
}

impl From<u8> for RCode {
    fn from(v: u8) -> Self {
        match v {
            0 => RCode::Success,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            _ => RCode::Unsupported,
        }
    }
}

impl fmt::Display for RCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RCode::Success => "Success",
            RCode::FormatError => "FormatError",
            RCode::ServerFailure => "ServerFailure",
            RCode::NameError => "NameError",
            RCode::NotImplemented => "NotImplemented",
            RCode::Refused => "Refused",
            RCode::Unsupported => "Unsupported",
        };
        write!(f, "{s}")
    }
}

// Internal constants.

// The default initial buffer size allocated during packing. Most mDNS
// messages fit comfortably inside one UDP datagram.
const PACK_STARTING_CAP: usize = 512;

const UINT16LEN: usize = 2;
const UINT32LEN: usize = 4;

/// A Message is a representation of a DNS message.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Resource>,
    pub authorities: Vec<Resource>,
    pub additionals: Vec<Resource>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_list = |v: &[Resource]| -> String {
            v.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "Message{{header: {}, questions: [{}], answers: [{}], authorities: [{}], additionals: [{}]}}",
            self.header,
            self.questions
                .iter()
                .map(|q| q.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            fmt_list(&self.answers),
            fmt_list(&self.authorities),
            fmt_list(&self.additionals),
        )
    }
}

impl Message {
    /// Decode a full message from wire format. The four section counts in
    /// the header must match the records actually present.
    pub fn unpack(&mut self, msg: &[u8]) -> Result<()> {
        let mut h = HeaderInternal::default();
        let mut off = h.unpack(msg, 0)?;
        self.header.set_from_bits(h.id, h.bits);

        self.questions = Vec::with_capacity(h.questions as usize);
        for _ in 0..h.questions {
            let mut q = Question::default();
            off = q.unpack(msg, off)?;
            self.questions.push(q);
        }

        for (count, section) in [
            (h.answers, &mut self.answers),
            (h.authorities, &mut self.authorities),
            (h.additionals, &mut self.additionals),
        ] {
            section.clear();
            section.reserve(count as usize);
            for _ in 0..count {
                let mut r = Resource::default();
                off = r.unpack(msg, off)?;
                section.push(r);
            }
        }
        Ok(())
    }

    /// Encode the full message into wire format, compressing names.
    pub fn pack(&self) -> Result<Vec<u8>> {
        self.append_pack(Vec::with_capacity(PACK_STARTING_CAP))
    }

    // append_pack is like pack but appends to b and returns the extended
    // buffer.
    pub(crate) fn append_pack(&self, b: Vec<u8>) -> Result<Vec<u8>> {
        if self.questions.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyQuestions);
        }
        if self.answers.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAnswers);
        }
        if self.authorities.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAuthorities);
        }
        if self.additionals.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAdditionals);
        }

        let (id, bits) = self.header.pack();
        let h = HeaderInternal {
            id,
            bits,
            questions: self.questions.len() as u16,
            answers: self.answers.len() as u16,
            authorities: self.authorities.len() as u16,
            additionals: self.additionals.len() as u16,
        };

        let compression_off = b.len();
        let mut msg = h.pack(b);

        // RFC 1035 allows compression when packing and requires support
        // for it when unpacking, so it is always on.
        let mut compression = Some(std::collections::HashMap::new());

        for question in &self.questions {
            msg = question.pack(msg, &mut compression, compression_off)?;
        }
        for answer in &self.answers {
            msg = answer.pack(msg, &mut compression, compression_off)?;
        }
        for authority in &self.authorities {
            msg = authority.pack(msg, &mut compression, compression_off)?;
        }
        for additional in &self.additionals {
            msg = additional.pack(msg, &mut compression, compression_off)?;
        }

        Ok(msg)
    }
}
