use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::QName;

/// DNS record types the proxy cares about. Everything else is carried
/// opaquely as [`RecordType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    CNAME,
    AAAA,
    OPT,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            5 => Self::CNAME,
            28 => Self::AAAA,
            41 => Self::OPT,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::CNAME => 5,
            Self::AAAA => 28,
            Self::OPT => 41,
            Self::Unknown(value) => value,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::CNAME => write!(f, "CNAME"),
            Self::AAAA => write!(f, "AAAA"),
            Self::OPT => write!(f, "OPT"),
            Self::Unknown(value) => write!(f, "TYPE{}", value),
        }
    }
}

// Header flag masks, MSB first: QR(1) OPCODE(4) AA(1) TC(1) RD(1) RA(1) Z(3) RCODE(4).
const FLAG_QR: u16 = 0b10000000_00000000;
const FLAG_AA: u16 = 0b00000100_00000000;
const FLAG_TC: u16 = 0b00000010_00000000;
const FLAG_RD: u16 = 0b00000001_00000000;
const FLAG_RA: u16 = 0b00000000_10000000;

/// Fixed 12-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub questions: u16,
    pub answers: u16,
    pub authorities: u16,
    pub additions: u16,
}

impl Header {
    pub fn qr(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0xF) as u8
    }

    pub fn aa(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    pub fn tc(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    pub fn rd(&self) -> bool {
        self.flags & FLAG_RD != 0
    }

    pub fn ra(&self) -> bool {
        self.flags & FLAG_RA != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & 0xF) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: QName,
    pub rr_type: RecordType,
    pub rr_class: u16,
}

/// Resource record payload.
///
/// CNAME rdata is decoded into a [`QName`] at parse time and re-encoded
/// uncompressed at serialization time; `Raw` bytes are written back verbatim,
/// embedded compression pointers included. In both cases the record's
/// `rr_data_length` field from the wire is what gets serialized, so a parsed
/// length is preserved even when the uncompressed encoding differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    Name(QName),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: QName,
    pub rr_type: RecordType,
    pub rr_class: u16,
    pub ttl: u32,
    pub rr_data_length: u16,
    pub rr_data: RData,
}

impl ResourceRecord {
    /// Human-readable rdata for log lines: addresses for A/AAAA, dotted names
    /// for decoded rdata, hex for anything else.
    pub fn rr_data_text(&self) -> String {
        match (&self.rr_type, &self.rr_data) {
            (_, RData::Name(name)) => name.to_string(),
            (RecordType::A, RData::Raw(data)) if data.len() == 4 => {
                Ipv4Addr::new(data[0], data[1], data[2], data[3]).to_string()
            }
            (RecordType::AAAA, RData::Raw(data)) if data.len() == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(data);
                Ipv6Addr::from(octets).to_string()
            }
            (_, RData::Raw(data)) => data.iter().map(|byte| format!("{byte:02x}")).collect(),
        }
    }
}

/// A complete DNS message: header plus the four ordered sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additions: Vec<ResourceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_u16_roundtrip() {
        for value in [1u16, 5, 28, 41, 2, 16, 257] {
            assert_eq!(RecordType::from_u16(value).to_u16(), value);
        }
    }

    #[test]
    fn test_record_type_display() {
        assert_eq!(RecordType::AAAA.to_string(), "AAAA");
        assert_eq!(RecordType::Unknown(16).to_string(), "TYPE16");
    }

    #[test]
    fn test_header_flags() {
        let header = Header {
            id: 0xADAA,
            flags: 0b10000001_10000000,
            questions: 1,
            answers: 5,
            authorities: 0,
            additions: 1,
        };
        assert!(header.qr());
        assert!(header.rd());
        assert!(header.ra());
        assert!(!header.aa());
        assert!(!header.tc());
        assert_eq!(header.opcode(), 0);
        assert_eq!(header.rcode(), 0);
    }

    #[test]
    fn test_rr_data_text() {
        let record = ResourceRecord {
            name: QName::from_dotted("example.com"),
            rr_type: RecordType::A,
            rr_class: 1,
            ttl: 300,
            rr_data_length: 4,
            rr_data: RData::Raw(vec![93, 184, 216, 34]),
        };
        assert_eq!(record.rr_data_text(), "93.184.216.34");

        let aaaa = ResourceRecord {
            rr_type: RecordType::AAAA,
            rr_data_length: 16,
            rr_data: RData::Raw(vec![
                0x2a, 0x00, 0x14, 0x50, 0x40, 0x05, 0x08, 0x0b, 0, 0, 0, 0, 0, 0, 0x20, 0x0e,
            ]),
            ..record.clone()
        };
        assert_eq!(aaaa.rr_data_text(), "2a00:1450:4005:80b::200e");

        let cname = ResourceRecord {
            rr_type: RecordType::CNAME,
            rr_data_length: 22,
            rr_data: RData::Name(QName::from_dotted("youtube-ui.l.google.com")),
            ..record
        };
        assert_eq!(cname.rr_data_text(), "youtube-ui.l.google.com");
    }
}
