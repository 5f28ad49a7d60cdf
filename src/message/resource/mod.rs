pub(crate) mod a;
pub(crate) mod aaaa;
pub(crate) mod nsec;
pub(crate) mod opaque;
pub(crate) mod ptr;
pub(crate) mod srv;
pub(crate) mod txt;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

pub use a::AResource;
pub use aaaa::AaaaResource;
pub use nsec::NsecResource;
pub use opaque::OpaqueResource;
pub use ptr::PtrResource;
pub use srv::SrvResource;
pub use txt::{TxtAttribute, TxtResource, TxtValue};

use crate::error::{Error, Result};

use super::name::Name;
use super::packer::*;
use super::{DnsClass, DnsType, CLASS_INET};

// The cache-flush bit: the top bit of a record's class field (RFC 6762
// §10.2). Never set on questions.
const CACHE_FLUSH_BIT: u16 = 0x8000;

/// A Resource is a DNS resource record.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub header: ResourceHeader,
    pub rdata: RData,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource{{header: {}, rdata: {}}}", self.header, self.rdata)
    }
}

impl Resource {
    /// A record of Internet class with `typ` derived from the rdata.
    pub fn new(name: Name, rdata: RData, ttl: u32, cache_flush: bool) -> Self {
        Self {
            header: ResourceHeader {
                typ: rdata.real_type(),
                name,
                class: CLASS_INET,
                cache_flush,
                ttl,
                length: 0,
            },
            rdata,
        }
    }

    // pack appends the wire format of the Resource to msg. The RDLENGTH
    // field is patched once the body is materialised, since compression
    // can shrink it below its canonical size.
    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let typ = self.rdata.real_type();
        let (mut msg, len_off) = self.header.pack_with_type(msg, typ, compression, compression_off)?;
        let pre_len = msg.len();
        msg = self.rdata.pack(msg, compression, compression_off)?;
        ResourceHeader::fix_len(&mut msg, len_off, pre_len)?;
        Ok(msg)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let off = self.header.unpack(msg, off)?;
        if off + self.header.length as usize > msg.len() {
            return Err(Error::ErrResourceLen);
        }
        let (rdata, new_off) =
            RData::unpack_rdata(self.header.typ, msg, off, self.header.length as usize)?;
        if new_off != off + self.header.length as usize {
            return Err(Error::ErrResourceLen);
        }
        self.rdata = rdata;
        Ok(new_off)
    }

    /// The RDATA in uncompressed wire format, for canonical comparison.
    pub(crate) fn canonical_rdata(&self) -> Vec<u8> {
        self.rdata
            .pack(Vec::new(), &mut None, 0)
            .unwrap_or_default()
    }

    /// Same (name, type, class), ignoring TTL, cache-flush and RDATA.
    pub(crate) fn same_tuple(&self, other: &Resource) -> bool {
        self.header.name == other.header.name
            && self.rdata.real_type() == other.rdata.real_type()
            && self.header.class == other.header.class
    }

    /// Same (name, type, class, RDATA): the full record identity.
    pub(crate) fn same_identity(&self, other: &Resource) -> bool {
        self.same_tuple(other) && self.rdata == other.rdata
    }
}

// The RFC 6762 §8.2.1 lexicographic record order used for probe
// tie-breaking: class, then type, then raw RDATA bytes (re-encoded
// without compression so the comparison is canonical; on prefix
// equality the shorter RDATA orders first).
pub(crate) fn compare_records(a: &Resource, b: &Resource) -> Ordering {
    (a.header.class.0 & !CACHE_FLUSH_BIT)
        .cmp(&(b.header.class.0 & !CACHE_FLUSH_BIT))
        .then_with(|| a.rdata.real_type().value().cmp(&b.rdata.real_type().value()))
        .then_with(|| a.canonical_rdata().cmp(&b.canonical_rdata()))
}

/// Header for a DNS resource record: the fields common to every record
/// type, with the cache-flush bit split out of the class word.
///
/// Equality ignores `length`: RDLENGTH is a wire artifact that changes
/// with compression, not part of a record's identity.
#[derive(Default, Debug, Clone)]
pub struct ResourceHeader {
    /// The domain name this record pertains to.
    pub name: Name,

    /// The record type. Derived from the rdata during packing.
    pub typ: DnsType,

    /// The class of network; always [`CLASS_INET`] in mDNS.
    pub class: DnsClass,

    /// RFC 6762's cache-flush bit: this record replaces all previously
    /// cached records with the same (name, type, class).
    pub cache_flush: bool,

    /// Time to live in seconds.
    pub ttl: u32,

    /// Length of the RDATA. Set automatically during packing.
    pub length: u16,
}

impl PartialEq for ResourceHeader {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.typ == other.typ
            && self.class == other.class
            && self.cache_flush == other.cache_flush
            && self.ttl == other.ttl
    }
}

impl Eq for ResourceHeader {}

impl fmt::Display for ResourceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResourceHeader{{name: {}, typ: {}, class: {}, cache_flush: {}, ttl: {}, length: {}}}",
            self.name, self.typ, self.class, self.cache_flush, self.ttl, self.length,
        )
    }
}

impl ResourceHeader {
    // pack_with_type appends the wire format of the header, returning the
    // offset of the Length field so it can be patched afterwards.
    pub(crate) fn pack_with_type(
        &self,
        mut msg: Vec<u8>,
        typ: DnsType,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<(Vec<u8>, usize)> {
        msg = self.name.pack(msg, compression, compression_off)?;
        msg = typ.pack(msg);
        let mut class = self.class.0 & !CACHE_FLUSH_BIT;
        if self.cache_flush {
            class |= CACHE_FLUSH_BIT;
        }
        msg = pack_uint16(msg, class);
        msg = pack_uint32(msg, self.ttl);
        let len_off = msg.len();
        msg = pack_uint16(msg, self.length);
        Ok((msg, len_off))
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let new_off = self.name.unpack(msg, off)?;
        let new_off = self.typ.unpack(msg, new_off)?;
        let (class, new_off) = unpack_uint16(msg, new_off)?;
        self.cache_flush = class & CACHE_FLUSH_BIT != 0;
        self.class = DnsClass(class & !CACHE_FLUSH_BIT);
        let (ttl, new_off) = unpack_uint32(msg, new_off)?;
        self.ttl = ttl;
        let (length, new_off) = unpack_uint16(msg, new_off)?;
        self.length = length;
        Ok(new_off)
    }

    // fix_len patches a packed header's Length field now that the body
    // size is known. len_off is the offset of the Length field; pre_len
    // is the message length before the body was packed.
    pub(crate) fn fix_len(msg: &mut [u8], len_off: usize, pre_len: usize) -> Result<()> {
        if msg.len() < pre_len || msg.len() > pre_len + u16::MAX as usize {
            return Err(Error::ErrResTooLong);
        }
        let con_len = msg.len() - pre_len;
        msg[len_off] = ((con_len >> 8) & 0xff) as u8;
        msg[len_off + 1] = (con_len & 0xff) as u8;
        Ok(())
    }
}

/// The RDATA of a record: a closed tagged union over the types mDNS
/// service discovery uses, with an opaque passthrough for the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(AResource),
    Aaaa(AaaaResource),
    Ptr(PtrResource),
    Txt(TxtResource),
    Srv(SrvResource),
    Nsec(NsecResource),
    Opaque(OpaqueResource),
}

impl Default for RData {
    fn default() -> Self {
        RData::Opaque(OpaqueResource::default())
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(r) => r.fmt(f),
            RData::Aaaa(r) => r.fmt(f),
            RData::Ptr(r) => r.fmt(f),
            RData::Txt(r) => r.fmt(f),
            RData::Srv(r) => r.fmt(f),
            RData::Nsec(r) => r.fmt(f),
            RData::Opaque(r) => r.fmt(f),
        }
    }
}

impl RData {
    // real_type returns the record type this body belongs to, used to
    // fill in the header's Type field.
    pub fn real_type(&self) -> DnsType {
        match self {
            RData::A(_) => DnsType::A,
            RData::Aaaa(_) => DnsType::Aaaa,
            RData::Ptr(_) => DnsType::Ptr,
            RData::Txt(_) => DnsType::Txt,
            RData::Srv(_) => DnsType::Srv,
            RData::Nsec(_) => DnsType::Nsec,
            RData::Opaque(r) => r.typ,
        }
    }

    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        match self {
            RData::A(r) => Ok(r.pack(msg)),
            RData::Aaaa(r) => Ok(r.pack(msg)),
            RData::Ptr(r) => r.pack(msg, compression, compression_off),
            RData::Txt(r) => r.pack(msg),
            RData::Srv(r) => r.pack(msg, compression, compression_off),
            RData::Nsec(r) => r.pack(msg, compression, compression_off),
            RData::Opaque(r) => Ok(r.pack(msg)),
        }
    }

    pub(crate) fn unpack_rdata(
        typ: DnsType,
        msg: &[u8],
        off: usize,
        length: usize,
    ) -> Result<(RData, usize)> {
        match typ {
            DnsType::A => {
                let mut r = AResource::default();
                let new_off = r.unpack(msg, off)?;
                Ok((RData::A(r), new_off))
            }
            DnsType::Aaaa => {
                let mut r = AaaaResource::default();
                let new_off = r.unpack(msg, off)?;
                Ok((RData::Aaaa(r), new_off))
            }
            DnsType::Ptr => {
                let mut r = PtrResource::default();
                let new_off = r.unpack(msg, off)?;
                Ok((RData::Ptr(r), new_off))
            }
            DnsType::Txt => {
                let mut r = TxtResource::default();
                let new_off = r.unpack(msg, off, length)?;
                Ok((RData::Txt(r), new_off))
            }
            DnsType::Srv => {
                let mut r = SrvResource::default();
                let new_off = r.unpack(msg, off)?;
                Ok((RData::Srv(r), new_off))
            }
            DnsType::Nsec => {
                let mut r = NsecResource::default();
                if let Some(new_off) = r.unpack(msg, off, length)? {
                    Ok((RData::Nsec(r), new_off))
                } else {
                    // Outside the restricted form; keep the bytes opaque.
                    let mut r = OpaqueResource::default();
                    let new_off = r.unpack(typ, msg, off, length)?;
                    Ok((RData::Opaque(r), new_off))
                }
            }
            _ => {
                let mut r = OpaqueResource::default();
                let new_off = r.unpack(typ, msg, off, length)?;
                Ok((RData::Opaque(r), new_off))
            }
        }
    }
}
