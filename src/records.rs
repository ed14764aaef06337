//! DNS resource record model.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::Name;

/// DNS record types. Unrecognized values keep their on-wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    OPT,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(val: u16) -> Self {
        match val {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            15 => Self::MX,
            16 => Self::TXT,
            28 => Self::AAAA,
            41 => Self::OPT,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::MX => 15,
            Self::TXT => 16,
            Self::AAAA => 28,
            Self::OPT => 41,
            Self::Unknown(v) => v,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::NS => write!(f, "NS"),
            Self::CNAME => write!(f, "CNAME"),
            Self::SOA => write!(f, "SOA"),
            Self::PTR => write!(f, "PTR"),
            Self::MX => write!(f, "MX"),
            Self::TXT => write!(f, "TXT"),
            Self::AAAA => write!(f, "AAAA"),
            Self::OPT => write!(f, "OPT"),
            Self::Unknown(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// DNS record class. Only IN is meaningful here; for OPT pseudo-records the
/// class field carries the requestor's UDP payload size, which is preserved
/// as an uninterpreted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordClass {
    IN,
    Unknown(u16),
}

impl RecordClass {
    pub fn from_u16(val: u16) -> Self {
        match val {
            1 => Self::IN,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::IN => 1,
            Self::Unknown(v) => v,
        }
    }
}

/// Record payload, one variant per structured type. OPT and anything not
/// parsed structurally are carried as opaque octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(Name),
    CNAME(Name),
    MX {
        preference: u16,
        exchange: Name,
    },
    SOA {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    OPT(Vec<u8>),
    Raw(Vec<u8>),
}

/// A complete resource record.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub name: Name,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    /// RDATA length as it appeared on the wire. Advisory: the encoder always
    /// recomputes it from the actual payload.
    pub rdata_len: u16,
    pub rdata: RData,
}

impl PartialEq for DnsRecord {
    // rdata_len is recomputed on emit and does not participate in equality
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.rtype == other.rtype
            && self.class == other.class
            && self.ttl == other.ttl
            && self.rdata == other.rdata
    }
}

impl Eq for DnsRecord {}

impl DnsRecord {
    pub fn a(name: &str, addr: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: Name::from_dotted(name),
            rtype: RecordType::A,
            class: RecordClass::IN,
            ttl,
            rdata_len: 0,
            rdata: RData::A(addr),
        }
    }

    pub fn aaaa(name: &str, addr: Ipv6Addr, ttl: u32) -> Self {
        Self {
            name: Name::from_dotted(name),
            rtype: RecordType::AAAA,
            class: RecordClass::IN,
            ttl,
            rdata_len: 0,
            rdata: RData::AAAA(addr),
        }
    }

    pub fn ns(name: &str, nsdname: &str, ttl: u32) -> Self {
        Self {
            name: Name::from_dotted(name),
            rtype: RecordType::NS,
            class: RecordClass::IN,
            ttl,
            rdata_len: 0,
            rdata: RData::NS(Name::from_dotted(nsdname)),
        }
    }

    pub fn cname(name: &str, target: &str, ttl: u32) -> Self {
        Self {
            name: Name::from_dotted(name),
            rtype: RecordType::CNAME,
            class: RecordClass::IN,
            ttl,
            rdata_len: 0,
            rdata: RData::CNAME(Name::from_dotted(target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_round_trip() {
        for code in [1u16, 2, 5, 6, 12, 15, 16, 28, 41] {
            assert_eq!(RecordType::from_u16(code).to_u16(), code);
        }
        // unrecognized codes keep their wire value
        assert_eq!(RecordType::from_u16(65), RecordType::Unknown(65));
        assert_eq!(RecordType::Unknown(65).to_u16(), 65);
    }

    #[test]
    fn test_record_class_preserves_payload_size() {
        // OPT abuses the class field for the requestor's UDP payload size
        let class = RecordClass::from_u16(1232);
        assert_eq!(class, RecordClass::Unknown(1232));
        assert_eq!(class.to_u16(), 1232);
    }

    #[test]
    fn test_equality_ignores_advisory_length() {
        let mut left = DnsRecord::a("example.com", Ipv4Addr::new(1, 2, 3, 4), 60);
        let right = DnsRecord::a("example.com", Ipv4Addr::new(1, 2, 3, 4), 60);
        left.rdata_len = 4;
        assert_eq!(left, right);
    }
}
