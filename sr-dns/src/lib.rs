//! DNS wire format (RFC 1035): message types, parser with name-compression
//! support, uncompressed serializer, and the hostname allowlist matcher.

pub mod allowlist;
pub mod message;
pub mod name;
pub mod packet;

pub use allowlist::HostnameSet;
pub use message::{Header, Message, Question, RData, RecordType, ResourceRecord};
pub use name::QName;
pub use packet::DnsParseError;
