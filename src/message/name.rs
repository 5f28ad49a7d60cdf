use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

use super::packer::*;

// The maximum encoded length of a name: 255 bytes including the root label.
const MAX_NAME_LEN: usize = 255;

// The maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

// Pointer chains are legal in inbound messages but bounded, so a
// malicious datagram cannot keep the decoder busy.
const MAX_POINTERS: usize = 10;

/// A domain name: an ordered sequence of labels, each 1–63 raw bytes.
///
/// Labels are bytes, not text. DNS-SD instance labels routinely contain
/// spaces, dots and other characters that would be mangled by a dotted
/// string representation, so the labels are kept separate and only joined
/// (with escaping) for display. Comparison and hashing are ASCII
/// case-insensitive per RFC 1035.
#[derive(Default, Clone, Debug)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(other.labels.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            state.write_usize(label.len());
            for b in label {
                state.write_u8(b.to_ascii_lowercase());
            }
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for label in &self.labels {
            for &b in label {
                match b {
                    b'.' | b'\\' => write!(f, "\\{}", b as char)?,
                    0x20..=0x7e => write!(f, "{}", b as char)?,
                    _ => write!(f, "\\x{b:02x}")?,
                }
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl Name {
    /// Parse a dotted name. `\.` escapes a literal dot inside a label and
    /// `\\` a literal backslash; a trailing dot is accepted and ignored.
    pub fn new(name: &str) -> Result<Self> {
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut label: Vec<u8> = Vec::new();
        let mut escaped = false;
        for &b in name.as_bytes() {
            if escaped {
                label.push(b);
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'.' {
                if label.is_empty() {
                    return Err(Error::ErrZeroSegLen);
                }
                labels.push(std::mem::take(&mut label));
            } else {
                label.push(b);
            }
        }
        if !label.is_empty() {
            labels.push(label);
        }
        Self::from_labels(labels)
    }

    /// Build a name from raw labels, validating label and name lengths.
    pub fn from_labels<I, L>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<Vec<u8>>,
    {
        let labels: Vec<Vec<u8>> = labels.into_iter().map(Into::into).collect();
        let mut encoded_len = 1; // root label
        for label in &labels {
            if label.is_empty() {
                return Err(Error::ErrZeroSegLen);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::ErrSegTooLong);
            }
            encoded_len += label.len() + 1;
        }
        if encoded_len > MAX_NAME_LEN {
            return Err(Error::ErrNameTooLong);
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// The leading label, if any. For a DNS-SD discovery name this is the
    /// service instance label.
    pub fn first_label(&self) -> Option<&[u8]> {
        self.labels.first().map(|l| l.as_slice())
    }

    /// A new name with `label` prepended.
    pub fn prepend(&self, label: impl Into<Vec<u8>>) -> Result<Self> {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(label.into());
        labels.extend(self.labels.iter().cloned());
        Self::from_labels(labels)
    }

    /// Case-insensitive suffix test: does `self` end with all of
    /// `suffix`'s labels?
    pub fn ends_with(&self, suffix: &Name) -> bool {
        if suffix.labels.len() > self.labels.len() {
            return false;
        }
        let skip = self.labels.len() - suffix.labels.len();
        self.labels[skip..]
            .iter()
            .zip(suffix.labels.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    // Canonical map key for a label-sequence suffix: length-prefixed,
    // lowercased label bytes. Compression matches are case-insensitive.
    fn compression_key(labels: &[Vec<u8>]) -> Vec<u8> {
        let mut key = Vec::new();
        for label in labels {
            key.push(label.len() as u8);
            key.extend(label.iter().map(|b| b.to_ascii_lowercase()));
        }
        key
    }

    // pack appends the wire format of the name to msg.
    //
    // When a compression map is supplied, the longest suffix of this name
    // already present in the message is replaced by a pointer, and every
    // suffix emitted literally is recorded so later names can point at
    // it. Offsets are relative to compression_off (the start of the
    // message) and only recorded while they fit in a 14-bit pointer, so a
    // pointer always references strictly earlier bytes that hold an
    // uncompressed label.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<Vec<u8>, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        for i in 0..self.labels.len() {
            let key = Self::compression_key(&self.labels[i..]);
            if let Some(map) = compression.as_ref() {
                if let Some(&ptr) = map.get(&key) {
                    return Ok(pack_uint16(msg, 0xc000 | ptr as u16));
                }
            }

            let off = msg.len() - compression_off;
            if off < 0x4000 {
                if let Some(map) = compression.as_mut() {
                    map.insert(key, off);
                }
            }

            let label = &self.labels[i];
            if label.is_empty() {
                return Err(Error::ErrZeroSegLen);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::ErrSegTooLong);
            }
            msg = pack_byte(msg, label.len() as u8);
            msg = pack_bytes(msg, label);
        }
        Ok(pack_byte(msg, 0))
    }

    // unpack reads a name from msg at off, following compression
    // pointers, and returns the offset of the first byte after the name
    // in the original (unpointed) stream.
    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut name_len = 1;
        let mut curr_off = off;
        let mut new_off = off;
        let mut pointers = 0;

        loop {
            if curr_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[curr_off] as usize;
            match c & 0xc0 {
                0x00 => {
                    if c == 0 {
                        // terminator
                        if pointers == 0 {
                            new_off = curr_off + 1;
                        }
                        break;
                    }
                    let end = curr_off + 1 + c;
                    if end > msg.len() {
                        return Err(Error::ErrCalcLen);
                    }
                    name_len += c + 1;
                    if name_len > MAX_NAME_LEN {
                        return Err(Error::ErrNameTooLong);
                    }
                    labels.push(msg[curr_off + 1..end].to_vec());
                    curr_off = end;
                }
                0xc0 => {
                    if curr_off + 2 > msg.len() {
                        return Err(Error::ErrBaseLen);
                    }
                    if pointers == 0 {
                        new_off = curr_off + 2;
                    }
                    pointers += 1;
                    if pointers > MAX_POINTERS {
                        return Err(Error::ErrTooManyPtr);
                    }
                    let target = (c ^ 0xc0) << 8 | msg[curr_off + 1] as usize;
                    // Pointers may only reference earlier bytes; this also
                    // rules out loops.
                    if target >= curr_off {
                        return Err(Error::ErrInvalidPtr);
                    }
                    curr_off = target;
                }
                _ => return Err(Error::ErrReservedBits),
            }
        }

        self.labels = labels;
        Ok(new_off)
    }
}
