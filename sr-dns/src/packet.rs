//! Wire-format parser and serializer.
//!
//! Parsing follows compression pointers with an explicit depth budget;
//! serialization always emits uncompressed names. See [`RData`] for the
//! CNAME round-trip rules.

use thiserror::Error;

use crate::message::{Header, Message, Question, RData, RecordType, ResourceRecord};
use crate::name::QName;

// RFC 1035 §2.3.4: a name occupies at most 255 wire octets. The shortest
// useful label is two octets, so no valid chain needs more pointers than
// this; anything deeper is a loop.
const MAX_DOMAIN_NAME_WIRE_OCTETS: usize = 255;
pub const MAX_POINTERS: usize = (MAX_DOMAIN_NAME_WIRE_OCTETS + 1) / 2 - 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsParseError {
    #[error("unexpected end of message at offset {0}")]
    Unpack(usize),
    #[error("the limit of {} compression pointers has been reached", MAX_POINTERS)]
    PointerRecursion,
    #[error("Invalid label length {0}")]
    InvalidLabelLength(u8),
}

/// Byte cursor over the whole message. Kept over the full buffer rather
/// than per-section slices because compression pointers are absolute.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, DnsParseError> {
        let byte = *self.data.get(self.pos).ok_or(DnsParseError::Unpack(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DnsParseError> {
        let end = self.pos.checked_add(len).ok_or(DnsParseError::Unpack(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(DnsParseError::Unpack(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, DnsParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DnsParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn parse_header(reader: &mut Reader) -> Result<Header, DnsParseError> {
    Ok(Header {
        id: reader.read_u16()?,
        flags: reader.read_u16()?,
        questions: reader.read_u16()?,
        answers: reader.read_u16()?,
        authorities: reader.read_u16()?,
        additions: reader.read_u16()?,
    })
}

/// Read labels until the terminating zero octet or a compression pointer.
///
/// A pointer jumps the cursor to its 14-bit absolute offset, continues
/// there, and then restores the cursor to the byte after the pointer; it
/// also ends the name. `depth` counts pointers already followed.
fn parse_name(reader: &mut Reader, depth: usize) -> Result<Vec<Vec<u8>>, DnsParseError> {
    let mut labels = Vec::new();

    loop {
        let length = reader.read_u8()?;
        match length {
            0 => break,
            1..=63 => labels.push(reader.read_slice(length as usize)?.to_vec()),
            _ if length & 0b1100_0000 == 0b1100_0000 => {
                if depth >= MAX_POINTERS {
                    return Err(DnsParseError::PointerRecursion);
                }
                let low = reader.read_u8()?;
                let target = usize::from(length & 0b0011_1111) << 8 | usize::from(low);
                let after_pointer = reader.pos;

                reader.pos = target;
                labels.extend(parse_name(reader, depth + 1)?);
                reader.pos = after_pointer;
                break;
            }
            _ => return Err(DnsParseError::InvalidLabelLength(length)),
        }
    }

    Ok(labels)
}

fn parse_qname(reader: &mut Reader) -> Result<QName, DnsParseError> {
    Ok(QName(parse_name(reader, 0)?))
}

fn parse_question(reader: &mut Reader) -> Result<Question, DnsParseError> {
    Ok(Question {
        name: parse_qname(reader)?,
        rr_type: RecordType::from_u16(reader.read_u16()?),
        rr_class: reader.read_u16()?,
    })
}

fn parse_record(reader: &mut Reader) -> Result<ResourceRecord, DnsParseError> {
    let name = parse_qname(reader)?;
    let rr_type = RecordType::from_u16(reader.read_u16()?);
    let rr_class = reader.read_u16()?;
    let ttl = reader.read_u32()?;
    let rr_data_length = reader.read_u16()?;

    let rr_data = if rr_type == RecordType::CNAME {
        RData::Name(parse_qname(reader)?)
    } else {
        RData::Raw(reader.read_slice(rr_data_length as usize)?.to_vec())
    };

    Ok(ResourceRecord { name, rr_type, rr_class, ttl, rr_data_length, rr_data })
}

fn parse_section(reader: &mut Reader, count: u16) -> Result<Vec<ResourceRecord>, DnsParseError> {
    (0..count).map(|_| parse_record(reader)).collect()
}

/// Parse a whole DNS message.
pub fn parse(data: &[u8]) -> Result<Message, DnsParseError> {
    let reader = &mut Reader::new(data);
    let header = parse_header(reader)?;

    Ok(Message {
        header,
        questions: (0..header.questions).map(|_| parse_question(reader)).collect::<Result<_, _>>()?,
        answers: parse_section(reader, header.answers)?,
        authorities: parse_section(reader, header.authorities)?,
        additions: parse_section(reader, header.additions)?,
    })
}

fn encode_qname(name: &QName, buf: &mut Vec<u8>) {
    for label in name.labels() {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label);
    }
    buf.push(0);
}

fn encode_question(question: &Question, buf: &mut Vec<u8>) {
    encode_qname(&question.name, buf);
    buf.extend_from_slice(&question.rr_type.to_u16().to_be_bytes());
    buf.extend_from_slice(&question.rr_class.to_be_bytes());
}

fn encode_record(record: &ResourceRecord, buf: &mut Vec<u8>) {
    encode_qname(&record.name, buf);
    buf.extend_from_slice(&record.rr_type.to_u16().to_be_bytes());
    buf.extend_from_slice(&record.rr_class.to_be_bytes());
    buf.extend_from_slice(&record.ttl.to_be_bytes());
    // The parsed length is written back as-is; a decoded name may re-encode
    // to a different size than its compressed wire form occupied.
    buf.extend_from_slice(&record.rr_data_length.to_be_bytes());
    match &record.rr_data {
        RData::Name(name) => encode_qname(name, buf),
        RData::Raw(data) => buf.extend_from_slice(data),
    }
}

/// Serialize a message. Names are always written uncompressed; no pointer
/// references are ever produced.
pub fn serialize(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);

    buf.extend_from_slice(&message.header.id.to_be_bytes());
    buf.extend_from_slice(&message.header.flags.to_be_bytes());
    buf.extend_from_slice(&message.header.questions.to_be_bytes());
    buf.extend_from_slice(&message.header.answers.to_be_bytes());
    buf.extend_from_slice(&message.header.authorities.to_be_bytes());
    buf.extend_from_slice(&message.header.additions.to_be_bytes());

    for question in &message.questions {
        encode_question(question, &mut buf);
    }
    for record in message
        .answers
        .iter()
        .chain(&message.authorities)
        .chain(&message.additions)
    {
        encode_record(record, &mut buf);
    }

    buf
}

impl Message {
    pub fn parse(data: &[u8]) -> Result<Self, DnsParseError> {
        parse(data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Five-answer AAAA response for www.youtube.com with a CNAME to
    /// youtube-ui.l.google.com, as captured off the wire (compressed).
    const RAW_AAAA_RESPONSE: &[u8] =
        b"\xad\xaa\x81\x80\x00\x01\x00\x05\x00\x00\x00\x01\x03\x77\x77\x77\x07\x79\x6f\x75\x74\x75\x62\x65\x03\x63\x6f\
\x6d\x00\x00\x1c\x00\x01\xc0\x0c\x00\x05\x00\x01\x00\x00\x03\x2a\x00\x16\x0a\x79\x6f\x75\x74\x75\x62\x65\x2d\
\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\xc0\x18\xc0\x2d\x00\x1c\x00\x01\x00\x00\x03\x2a\x00\x10\x2a\x00\
\x14\x50\x40\x05\x08\x0b\x00\x00\x00\x00\x00\x00\x20\x0e\xc0\x2d\x00\x1c\x00\x01\x00\x00\x03\x2a\x00\x10\x2a\
\x00\x14\x50\x40\x05\x08\x02\x00\x00\x00\x00\x00\x00\x20\x0e\xc0\x2d\x00\x1c\x00\x01\x00\x00\x03\x2a\x00\x10\
\x2a\x00\x14\x50\x40\x05\x08\x00\x00\x00\x00\x00\x00\x00\x20\x0e\xc0\x2d\x00\x1c\x00\x01\x00\x00\x03\x2a\x00\
\x10\x2a\x00\x14\x50\x40\x05\x08\x01\x00\x00\x00\x00\x00\x00\x20\x0e\x00\x00\x29\xff\xd6\x00\x00\x00\x00\x00\
\x00";

    /// The same message serialized by this module: names uncompressed, the
    /// caller-supplied raw CNAME rdata (pointer included) verbatim.
    const SERIALIZED_AAAA_RESPONSE: &[u8] =
        b"\xad\xaa\x81\x80\x00\x01\x00\x05\x00\x00\x00\x01\x03\x77\x77\x77\x07\x79\x6f\x75\x74\x75\x62\x65\x03\x63\x6f\
\x6d\x00\x00\x1c\x00\x01\x03\x77\x77\x77\x07\x79\x6f\x75\x74\x75\x62\x65\x03\x63\x6f\x6d\x00\x00\x05\x00\x01\
\x00\x00\x03\x2a\x00\x16\x0a\x79\x6f\x75\x74\x75\x62\x65\x2d\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\xc0\
\x18\x0a\x79\x6f\x75\x74\x75\x62\x65\x2d\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\x03\x63\x6f\x6d\x00\x00\
\x1c\x00\x01\x00\x00\x03\x2a\x00\x10\x2a\x00\x14\x50\x40\x05\x08\x0b\x00\x00\x00\x00\x00\x00\x20\x0e\x0a\x79\
\x6f\x75\x74\x75\x62\x65\x2d\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\x03\x63\x6f\x6d\x00\x00\x1c\x00\x01\
\x00\x00\x03\x2a\x00\x10\x2a\x00\x14\x50\x40\x05\x08\x02\x00\x00\x00\x00\x00\x00\x20\x0e\x0a\x79\x6f\x75\x74\
\x75\x62\x65\x2d\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\x03\x63\x6f\x6d\x00\x00\x1c\x00\x01\x00\x00\x03\
\x2a\x00\x10\x2a\x00\x14\x50\x40\x05\x08\x00\x00\x00\x00\x00\x00\x00\x20\x0e\x0a\x79\x6f\x75\x74\x75\x62\x65\
\x2d\x75\x69\x01\x6c\x06\x67\x6f\x6f\x67\x6c\x65\x03\x63\x6f\x6d\x00\x00\x1c\x00\x01\x00\x00\x03\x2a\x00\x10\
\x2a\x00\x14\x50\x40\x05\x08\x01\x00\x00\x00\x00\x00\x00\x20\x0e\x00\x00\x29\xff\xd6\x00\x00\x00\x00\x00\x00";

    fn youtube_name() -> QName {
        QName::from_dotted("www.youtube.com")
    }

    fn target_name() -> QName {
        QName::from_dotted("youtube-ui.l.google.com")
    }

    fn aaaa_answer(last: u8) -> ResourceRecord {
        ResourceRecord {
            name: target_name(),
            rr_type: RecordType::AAAA,
            rr_class: 1,
            ttl: 810,
            rr_data_length: 16,
            rr_data: RData::Raw(vec![
                0x2a, 0x00, 0x14, 0x50, 0x40, 0x05, 0x08, last, 0, 0, 0, 0, 0, 0, 0x20, 0x0e,
            ]),
        }
    }

    fn aaaa_response(cname_data: RData) -> Message {
        Message {
            header: Header {
                id: 0xADAA,
                flags: 0b10000001_10000000,
                questions: 1,
                answers: 5,
                authorities: 0,
                additions: 1,
            },
            questions: vec![Question {
                name: youtube_name(),
                rr_type: RecordType::AAAA,
                rr_class: 1,
            }],
            answers: vec![
                ResourceRecord {
                    name: youtube_name(),
                    rr_type: RecordType::CNAME,
                    rr_class: 1,
                    ttl: 810,
                    rr_data_length: 22,
                    rr_data: cname_data,
                },
                aaaa_answer(0x0b),
                aaaa_answer(0x02),
                aaaa_answer(0x00),
                aaaa_answer(0x01),
            ],
            authorities: vec![],
            additions: vec![ResourceRecord {
                name: QName::root(),
                rr_type: RecordType::OPT,
                rr_class: 65494,
                ttl: 0,
                rr_data_length: 0,
                rr_data: RData::Raw(vec![]),
            }],
        }
    }

    #[test]
    fn test_parse_aaaa_response() {
        let message = parse(RAW_AAAA_RESPONSE).unwrap();
        assert_eq!(message, aaaa_response(RData::Name(target_name())));
    }

    #[test]
    fn test_parse_header_fields() {
        let message = parse(RAW_AAAA_RESPONSE).unwrap();
        assert_eq!(message.header.id, 0xADAA);
        assert_eq!(message.header.flags, 0x8180);
        assert!(message.header.qr());
        assert!(!message.header.aa());
        assert_eq!(message.answers.len(), 5);
        assert_eq!(message.additions.len(), 1);
    }

    #[test]
    fn test_serialize_raw_cname_verbatim() {
        let message = aaaa_response(RData::Raw(b"\x0ayoutube-ui\x01l\x06google\xc0\x18".to_vec()));
        assert_eq!(serialize(&message), SERIALIZED_AAAA_RESPONSE);
    }

    #[test]
    fn test_serialize_decoded_cname_uncompressed() {
        // A decoded CNAME re-encodes without the pointer; the stored
        // rr_data_length (22) is still written verbatim.
        let bytes = serialize(&aaaa_response(RData::Name(target_name())));
        let uncompressed: &[u8] = b"\x0ayoutube-ui\x01l\x06google\x03com\x00";
        assert!(bytes.windows(uncompressed.len()).any(|w| w == uncompressed));
        assert_eq!(&bytes[..12], &SERIALIZED_AAAA_RESPONSE[..12]);
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let parsed = parse(RAW_AAAA_RESPONSE).unwrap();
        let reparsed = parse(&serialize(&parsed)).unwrap();
        assert_eq!(reparsed, parsed);
    }

    #[test]
    fn test_roundtrip_uncompressed_message() {
        let message = Message {
            header: Header {
                id: 0x1234,
                flags: 0x0100,
                questions: 1,
                answers: 1,
                authorities: 1,
                additions: 0,
            },
            questions: vec![Question {
                name: QName::from_dotted("example.com"),
                rr_type: RecordType::A,
                rr_class: 1,
            }],
            answers: vec![ResourceRecord {
                name: QName::from_dotted("example.com"),
                rr_type: RecordType::A,
                rr_class: 1,
                ttl: 300,
                rr_data_length: 4,
                rr_data: RData::Raw(vec![93, 184, 216, 34]),
            }],
            authorities: vec![ResourceRecord {
                name: QName::from_dotted("example.com"),
                rr_type: RecordType::Unknown(2),
                rr_class: 1,
                ttl: 300,
                rr_data_length: 6,
                rr_data: RData::Raw(b"\x02ns\x01x\x00".to_vec()),
            }],
            additions: vec![],
        };
        assert_eq!(parse(&serialize(&message)).unwrap(), message);
    }

    #[test]
    fn test_parse_invalid_label_length() {
        // Overwrite the CNAME rdata's compression pointer with every byte
        // whose top two bits are 01 or 10.
        let pointer_at = RAW_AAAA_RESPONSE
            .windows(2)
            .position(|w| w == [0xc0, 0x18])
            .unwrap();
        for length in 64u8..192 {
            let mut raw = RAW_AAAA_RESPONSE.to_vec();
            raw[pointer_at] = length;
            let error = parse(&raw).unwrap_err();
            assert_eq!(error, DnsParseError::InvalidLabelLength(length));
            assert_eq!(error.to_string(), format!("Invalid label length {length}"));
        }
    }

    #[test]
    fn test_pointer_loop_detected() {
        // Question name at offset 12 points at itself.
        let mut raw = Vec::new();
        raw.extend_from_slice(&[0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(&[0xc0, 0x0c]);
        raw.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        assert_eq!(parse(&raw).unwrap_err(), DnsParseError::PointerRecursion);
    }

    #[test]
    fn test_pointer_chain_within_limit() {
        // www.example.com spelled with one pointer hop per parse.
        let mut raw = Vec::new();
        raw.extend_from_slice(&[0x00, 0x02, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let tail = raw.len() as u8;
        raw.extend_from_slice(b"\x07example\x03com\x00");
        let head = raw.len() as u8;
        raw.extend_from_slice(b"\x03www");
        raw.extend_from_slice(&[0xc0, tail]);
        raw.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        raw.extend_from_slice(&[0xc0, head]);
        raw.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);

        let message = parse(&raw).unwrap();
        assert_eq!(message.questions[0].name, QName::from_dotted("www.example.com"));
        assert_eq!(message.questions[1].name, QName::from_dotted("www.example.com"));
    }

    #[test]
    fn test_truncated_message() {
        assert_eq!(parse(b"\xad\xaa\x81").unwrap_err(), DnsParseError::Unpack(2));
        // Header promises a question that is not there.
        let raw = [0x00u8, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(parse(&raw).unwrap_err(), DnsParseError::Unpack(_)));
        // Label runs past the end of the buffer.
        let mut raw = raw.to_vec();
        raw.extend_from_slice(b"\x07exam");
        assert!(matches!(parse(&raw).unwrap_err(), DnsParseError::Unpack(_)));
    }

    #[test]
    fn test_encode_qname() {
        let mut buf = Vec::new();
        encode_qname(&QName::from_dotted("www.example.com"), &mut buf);
        assert_eq!(buf, b"\x03www\x07example\x03com\x00");

        buf.clear();
        encode_qname(&QName::root(), &mut buf);
        assert_eq!(buf, b"\x00");
    }
}
