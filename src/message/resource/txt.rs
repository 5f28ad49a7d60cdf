use std::fmt;

use crate::error::{Error, Result};

use super::super::packer::*;

/// The value of one TXT attribute.
///
/// RFC 6763 distinguishes `key=value`, `key=` and a bare `key`; user
/// attributes round-trip through all three forms unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtValue {
    /// `key=value` — an attribute with a byte-string value.
    Bytes(Vec<u8>),
    /// `key=` — present, with an explicitly empty value.
    Empty,
    /// `key` — present, with no value at all.
    Present,
}

/// One TXT attribute: a case-insensitive key and its tri-state value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtAttribute {
    pub key: String,
    pub value: TxtValue,
}

// A TxtResource is an ordered set of key/value attributes.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TxtResource {
    pub attributes: Vec<TxtAttribute>,
}

impl fmt::Display for TxtResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TXT{{")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &attr.value {
                TxtValue::Bytes(v) => write!(f, "{}={}", attr.key, String::from_utf8_lossy(v))?,
                TxtValue::Empty => write!(f, "{}=", attr.key)?,
                TxtValue::Present => write!(f, "{}", attr.key)?,
            }
        }
        write!(f, "}}")
    }
}

impl TxtResource {
    /// Look up an attribute by key, ASCII case-insensitively.
    pub fn get(&self, key: &str) -> Option<&TxtValue> {
        self.attributes
            .iter()
            .find(|a| a.key.eq_ignore_ascii_case(key))
            .map(|a| &a.value)
    }

    pub(crate) fn pack(&self, mut msg: Vec<u8>) -> Result<Vec<u8>> {
        if self.attributes.is_empty() {
            // An empty attribute set is a single zero-length string.
            return pack_str(msg, &[]);
        }
        for attr in &self.attributes {
            let mut block = attr.key.as_bytes().to_vec();
            match &attr.value {
                TxtValue::Bytes(v) => {
                    block.push(b'=');
                    block.extend_from_slice(v);
                }
                TxtValue::Empty => block.push(b'='),
                TxtValue::Present => {}
            }
            msg = pack_str(msg, &block)?;
        }
        Ok(msg)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize, length: usize) -> Result<usize> {
        let mut attributes = Vec::new();
        let mut new_off = off;
        let end = off + length;
        while new_off < end {
            let (block, next_off) = unpack_str(msg, new_off)?;
            if next_off > end {
                return Err(Error::ErrCalcLen);
            }
            new_off = next_off;
            if block.is_empty() {
                continue;
            }
            let (key, value) = match block.iter().position(|&b| b == b'=') {
                None => (block.as_slice(), TxtValue::Present),
                Some(i) if i == block.len() - 1 => (&block[..i], TxtValue::Empty),
                Some(i) => (&block[..i], TxtValue::Bytes(block[i + 1..].to_vec())),
            };
            if key.is_empty() {
                continue;
            }
            attributes.push(TxtAttribute {
                key: String::from_utf8_lossy(key).into_owned(),
                value,
            });
        }
        self.attributes = attributes;
        Ok(new_off)
    }
}
