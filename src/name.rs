//! Domain names as sequences of raw label octets, with the RFC 1035
//! compression-pointer decode scheme.

use std::fmt;

use crate::packet::DnsParseError;
use crate::reader::ByteReader;

/// RFC 1035 §2.3.4: labels are at most 63 octets, whole names at most 255.
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
/// Upper bound on pointer chases while expanding one name.
const MAX_POINTER_HOPS: usize = 32;

/// A domain name. Labels are kept as raw octets so that anything parsed off
/// the wire re-encodes byte-for-byte; the dotted text form is only for
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    pub fn from_dotted(text: &str) -> Self {
        Self {
            labels: text
                .split('.')
                .filter(|label| !label.is_empty())
                .map(|label| label.as_bytes().to_vec())
                .collect(),
        }
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Reads a name off the wire, expanding compression pointers.
    ///
    /// A pointer target must lie strictly before the pointer itself. After a
    /// chase the reader is left two bytes past the first pointer, i.e. past
    /// the encoded form rather than the expansion.
    pub fn read_from(r: &mut ByteReader<'_>) -> Result<Self, DnsParseError> {
        let mut labels = Vec::new();
        let mut encoded_len = 1usize; // terminating zero octet
        let mut resume_at: Option<usize> = None;
        let mut hops = 0usize;

        loop {
            let here = r.pos();
            let len = r.read_u8()? as usize;

            if len & 0xC0 == 0xC0 {
                let low = r.read_u8()? as usize;
                let target = ((len & 0x3F) << 8) | low;
                if target >= here {
                    return Err(DnsParseError::MalformedName(here));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(DnsParseError::MalformedName(here));
                }
                if resume_at.is_none() {
                    resume_at = Some(r.pos());
                }
                r.seek(target);
                continue;
            }

            // 0b01/0b10 length prefixes are reserved
            if len & 0xC0 != 0 {
                return Err(DnsParseError::MalformedName(here));
            }

            if len == 0 {
                break;
            }

            encoded_len += len + 1;
            if encoded_len > MAX_NAME_LEN {
                return Err(DnsParseError::MalformedName(here));
            }
            labels.push(r.read(len)?.to_vec());
        }

        if let Some(pos) = resume_at {
            r.seek(pos);
        }
        Ok(Self { labels })
    }

    /// Appends the uncompressed wire form: length-prefixed labels and a zero
    /// terminator. The encoder never emits compression pointers.
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), DnsParseError> {
        for label in &self.labels {
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsParseError::NameTooLong);
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label);
        }
        buf.push(0);
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", String::from_utf8_lossy(label))?;
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self::from_dotted(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &Name) -> Vec<u8> {
        let mut buf = Vec::new();
        name.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let name = Name::from_dotted("www.example.com");
        let buf = encode(&name);
        assert_eq!(buf, b"\x03www\x07example\x03com\x00");

        let mut r = ByteReader::new(&buf);
        let parsed = Name::read_from(&mut r).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(r.pos(), buf.len());
    }

    #[test]
    fn test_root_name() {
        let buf = encode(&Name::root());
        assert_eq!(buf, b"\x00");
        assert_eq!(Name::root().to_string(), ".");
    }

    #[test]
    fn test_pointer_expansion_and_cursor_position() {
        // "example.com" at offset 0, then a name "www." + pointer to it
        let mut buf = encode(&Name::from_dotted("example.com"));
        let start = buf.len();
        buf.extend_from_slice(b"\x03www");
        buf.push(0xC0);
        buf.push(0x00);

        let mut r = ByteReader::new(&buf);
        r.seek(start);
        let parsed = Name::read_from(&mut r).unwrap();
        assert_eq!(parsed, Name::from_dotted("www.example.com"));
        // cursor rests past the two pointer bytes, not the expansion
        assert_eq!(r.pos(), buf.len());
    }

    #[test]
    fn test_forward_pointer_rejected() {
        // pointer at offset 0 referencing offset 4 (not strictly earlier)
        let buf = [0xC0, 0x04, 0x00, 0x00, 0x00];
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            Name::read_from(&mut r),
            Err(DnsParseError::MalformedName(0))
        ));
    }

    #[test]
    fn test_self_pointer_rejected() {
        let buf = [0x00, 0xC0, 0x01];
        let mut r = ByteReader::new(&buf);
        r.seek(1);
        assert!(matches!(
            Name::read_from(&mut r),
            Err(DnsParseError::MalformedName(1))
        ));
    }

    #[test]
    fn test_pointer_hop_limit() {
        // a chain of pointers, each referencing the one two bytes earlier
        let mut buf = vec![0x00];
        for _ in 0..40 {
            let target = buf.len().saturating_sub(2);
            buf.push(0xC0 | ((target >> 8) as u8));
            buf.push(target as u8);
        }
        let start = buf.len() - 2;
        let mut r = ByteReader::new(&buf);
        r.seek(start);
        assert!(matches!(
            Name::read_from(&mut r),
            Err(DnsParseError::MalformedName(_))
        ));
    }

    #[test]
    fn test_reserved_length_prefix_rejected() {
        let buf = [0x40, 0x61, 0x00];
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            Name::read_from(&mut r),
            Err(DnsParseError::MalformedName(0))
        ));
    }

    #[test]
    fn test_name_length_limit() {
        // five 63-octet labels push the encoded length past 255
        let mut buf = Vec::new();
        for _ in 0..5 {
            buf.push(63);
            buf.extend_from_slice(&[b'a'; 63]);
        }
        buf.push(0);
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            Name::read_from(&mut r),
            Err(DnsParseError::MalformedName(_))
        ));
    }

    #[test]
    fn test_oversized_label_fails_encode() {
        let long = "a".repeat(64);
        let name = Name::from_dotted(&format!("{long}.com"));
        let mut buf = Vec::new();
        assert!(matches!(
            name.write_to(&mut buf),
            Err(DnsParseError::NameTooLong)
        ));
    }

    #[test]
    fn test_opaque_label_bytes_round_trip() {
        // labels are not validated as text
        let buf = vec![2, 0xff, 0x00, 3, b'f', b'o', b'o', 0];
        let mut r = ByteReader::new(&buf);
        let parsed = Name::read_from(&mut r).unwrap();
        assert_eq!(parsed.labels()[0], vec![0xff, 0x00]);
        assert_eq!(encode(&parsed), buf);
    }
}
