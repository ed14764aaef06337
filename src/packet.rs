//! DNS wire format parser and serializer (RFC 1035).

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::name::Name;
use crate::reader::ByteReader;
use crate::records::{DnsRecord, RData, RecordClass, RecordType};

#[derive(Error, Debug)]
pub enum DnsParseError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),
    #[error("malformed name at offset {0}")]
    MalformedName(usize),
    #[error("{0} record data does not match its declared length")]
    MalformedRecord(RecordType),
    #[error("label exceeds 63 octets")]
    NameTooLong,
}

/// 4-bit response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Unknown(u8),
}

impl ResponseCode {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NxDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NxDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::Unknown(v) => v,
        }
    }
}

/// Parsed DNS header (12 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub is_query: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: u8,
    pub rcode: ResponseCode,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,
            is_query: false,
            opcode: 0,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            z: 0,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }
}

impl Header {
    fn parse(r: &mut ByteReader<'_>) -> Result<Self, DnsParseError> {
        let id = r.read_u16_be()?;
        let b1 = r.read_u8()?;
        let b2 = r.read_u8()?;
        Ok(Self {
            id,
            is_query: b1 & 0x80 == 0,
            opcode: (b1 >> 3) & 0x0F,
            authoritative: b1 & 0x04 != 0,
            truncated: b1 & 0x02 != 0,
            recursion_desired: b1 & 0x01 != 0,
            recursion_available: b2 & 0x80 != 0,
            z: (b2 >> 4) & 0x07,
            rcode: ResponseCode::from_u8(b2 & 0x0F),
            qd_count: r.read_u16_be()?,
            an_count: r.read_u16_be()?,
            ns_count: r.read_u16_be()?,
            ar_count: r.read_u16_be()?,
        })
    }
}

/// A parsed question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    fn parse(r: &mut ByteReader<'_>) -> Result<Self, DnsParseError> {
        Ok(Self {
            name: Name::read_from(r)?,
            qtype: RecordType::from_u16(r.read_u16_be()?),
            qclass: RecordClass::from_u16(r.read_u16_be()?),
        })
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), DnsParseError> {
        self.name.write_to(buf)?;
        buf.extend_from_slice(&self.qtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_u16().to_be_bytes());
        Ok(())
    }
}

/// A complete DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<DnsRecord>,
    pub authority: Vec<DnsRecord>,
    pub additional: Vec<DnsRecord>,
}

impl Packet {
    /// A fresh recursive query with a single question.
    pub fn query(id: u16, name: Name, qtype: RecordType) -> Self {
        Self {
            header: Header {
                id,
                is_query: true,
                recursion_desired: true,
                qd_count: 1,
                ..Header::default()
            },
            questions: vec![Question {
                name,
                qtype,
                qclass: RecordClass::IN,
            }],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, DnsParseError> {
        let mut r = ByteReader::new(buf);
        let mut header = Header::parse(&mut r)?;

        let mut questions = Vec::with_capacity(header.qd_count as usize);
        for _ in 0..header.qd_count {
            questions.push(Question::parse(&mut r)?);
        }

        let mut answers = Vec::new();
        let mut authority = Vec::new();
        let mut additional = Vec::new();
        if header.is_query {
            // Client-supplied additional records (EDNS OPT) are not parsed;
            // queries carry questions only.
            header.ar_count = 0;
        } else {
            for _ in 0..header.an_count {
                answers.push(parse_record(&mut r)?);
            }
            for _ in 0..header.ns_count {
                authority.push(parse_record(&mut r)?);
            }
            for _ in 0..header.ar_count {
                additional.push(parse_record(&mut r)?);
            }
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// Serializes the message. Section counts are taken from the actual
    /// section lengths, and names are emitted without compression. Of the
    /// flag bits only qr, rd, ra, z and rcode are written; opcode, aa and tc
    /// always emit as zero.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsParseError> {
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&self.header.id.to_be_bytes());

        let mut b1 = 0u8;
        if !self.header.is_query {
            b1 |= 0x80;
        }
        if self.header.recursion_desired {
            b1 |= 0x01;
        }
        buf.push(b1);

        let mut b2 = (self.header.z & 0x07) << 4;
        if self.header.recursion_available {
            b2 |= 0x80;
        }
        b2 |= self.header.rcode.to_u8() & 0x0F;
        buf.push(b2);

        for count in [
            self.questions.len(),
            self.answers.len(),
            self.authority.len(),
            self.additional.len(),
        ] {
            buf.extend_from_slice(&(count as u16).to_be_bytes());
        }

        for question in &self.questions {
            question.write_to(&mut buf)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            encode_record(record, &mut buf)?;
        }
        Ok(buf)
    }
}

fn parse_record(r: &mut ByteReader<'_>) -> Result<DnsRecord, DnsParseError> {
    let name = Name::read_from(r)?;
    let rtype = RecordType::from_u16(r.read_u16_be()?);
    let class = RecordClass::from_u16(r.read_u16_be()?);
    let ttl = r.read_u32_be()?;
    let rdata_len = r.read_u16_be()?;
    let rdata_start = r.pos();

    let rdata = match rtype {
        RecordType::A => {
            let b = r.read(4)?;
            RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        RecordType::AAAA => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(r.read(16)?);
            RData::AAAA(Ipv6Addr::from(octets))
        }
        RecordType::NS => RData::NS(Name::read_from(r)?),
        RecordType::CNAME => RData::CNAME(Name::read_from(r)?),
        RecordType::MX => RData::MX {
            preference: r.read_u16_be()?,
            exchange: Name::read_from(r)?,
        },
        RecordType::SOA => RData::SOA {
            mname: Name::read_from(r)?,
            rname: Name::read_from(r)?,
            serial: r.read_u32_be()?,
            refresh: r.read_u32_be()?,
            retry: r.read_u32_be()?,
            expire: r.read_u32_be()?,
            minimum: r.read_u32_be()?,
        },
        RecordType::OPT => RData::OPT(r.read(rdata_len as usize)?.to_vec()),
        _ => RData::Raw(r.read(rdata_len as usize)?.to_vec()),
    };

    // structured payloads must consume exactly rdata_len bytes
    if !matches!(rdata, RData::OPT(_) | RData::Raw(_))
        && r.pos() != rdata_start + rdata_len as usize
    {
        return Err(DnsParseError::MalformedRecord(rtype));
    }

    Ok(DnsRecord {
        name,
        rtype,
        class,
        ttl,
        rdata_len,
        rdata,
    })
}

fn encode_record(record: &DnsRecord, buf: &mut Vec<u8>) -> Result<(), DnsParseError> {
    record.name.write_to(buf)?;
    buf.extend_from_slice(&record.rtype.to_u16().to_be_bytes());
    buf.extend_from_slice(&record.class.to_u16().to_be_bytes());
    buf.extend_from_slice(&record.ttl.to_be_bytes());

    let mut rdata = Vec::new();
    match &record.rdata {
        RData::A(addr) => rdata.extend_from_slice(&addr.octets()),
        RData::AAAA(addr) => rdata.extend_from_slice(&addr.octets()),
        RData::NS(name) | RData::CNAME(name) => name.write_to(&mut rdata)?,
        RData::MX {
            preference,
            exchange,
        } => {
            rdata.extend_from_slice(&preference.to_be_bytes());
            exchange.write_to(&mut rdata)?;
        }
        RData::SOA {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            mname.write_to(&mut rdata)?;
            rname.write_to(&mut rdata)?;
            for value in [serial, refresh, retry, expire, minimum] {
                rdata.extend_from_slice(&value.to_be_bytes());
            }
        }
        RData::OPT(bytes) | RData::Raw(bytes) => rdata.extend_from_slice(bytes),
    }

    // rdlength always reflects the payload as emitted
    buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    buf.extend_from_slice(&rdata);
    Ok(())
}
