//! Core wire-format types for DNS messages.
//!
//! See RFC 1035 section 4 and RFC 6891 (EDNS(0)) / RFC 7873 (DNS
//! Cookies) for the on-the-wire shapes these mirror.

use std::fmt;

/// Maximum number of octets in an encoded domain name, including
/// length octets and the terminating root label.
pub const DOMAIN_NAME_MAX_LEN: usize = 255;

/// Maximum number of octets in a single label.
pub const LABEL_MAX_LEN: usize = 63;

/// Maximum number of compression-pointer jumps permitted while
/// decoding a single domain name.
pub const MAX_POINTER_JUMPS: usize = 50;

pub const OPT_OPTION_COOKIE: u16 = 10;

/// A parsed DNS message: header, questions, and the three RR
/// sections, plus an optional EDNS(0) pseudo-RR pulled out of the
/// additional section.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    pub opt: Option<OptRecord>,
}

impl Message {
    /// Build the skeleton of a response to this message: same id and
    /// questions, `qr` set, everything else defaulted to the
    /// "no answer yet" state. Callers fill in `rcode` and the answer
    /// sections.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: false,
                z: 0,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            opt: None,
        }
    }
}

/// The 12-byte fixed DNS header, minus the four wire-only count
/// fields (those are derived from the section lengths at
/// serialisation time, as in the teacher's `WireHeader` split).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: u8,
    pub rcode: Rcode,
}

/// The header plus the four wire-only count fields. Used only during
/// (de)serialisation: keeping the counts out of `Header` means
/// there's no way to construct a `Header`/`Vec<Question>` pair whose
/// counts disagree.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Unknown(u8),
}

impl Rcode {
    pub fn code(self) -> u8 {
        u8::from(self)
    }
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Unknown(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Unknown(other) => other,
        }
    }
}

/// A domain name in its decompressed, length-prefixed-label wire
/// form. As in the teacher's `DomainName`, labels are kept as raw
/// (lowercased) octets: this application never needs to interpret
/// them as text beyond dotted-string conversion.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct DomainName {
    pub octets: Vec<u8>,
    pub labels: Vec<Vec<u8>>,
}

impl DomainName {
    pub fn root() -> Self {
        DomainName {
            octets: vec![0],
            labels: vec![Vec::new()],
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1
    }

    /// Parse a dotted string such as `"www.example.com"` or
    /// `"www.example.com."`. A trailing dot is optional and stripped.
    /// Labels are lowercased. Returns `None` if any label exceeds 63
    /// bytes, contains a non-ASCII byte, or the encoded name would
    /// exceed 255 bytes.
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Some(Self::root());
        }

        let mut labels = Vec::new();
        let mut octets = Vec::with_capacity(trimmed.len() + 2);
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > LABEL_MAX_LEN || !label.is_ascii() {
                return None;
            }
            let lowered = label.as_bytes().to_ascii_lowercase();
            octets.push(lowered.len() as u8);
            octets.extend_from_slice(&lowered);
            labels.push(lowered);
        }
        octets.push(0);
        labels.push(Vec::new());

        if octets.len() > DOMAIN_NAME_MAX_LEN {
            return None;
        }

        Some(DomainName { octets, labels })
    }

    /// Inverse of `from_dotted_string`, without a trailing dot (except
    /// for the root domain, which renders as `"."`).
    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }
        let mut out = String::with_capacity(self.octets.len());
        for (i, label) in self.labels.iter().enumerate() {
            if label.is_empty() {
                break;
            }
            if i > 0 {
                out.push('.');
            }
            out.push_str(&String::from_utf8_lossy(label));
        }
        out
    }

    /// Suffixes from most to least specific, e.g. `a.b.c` yields
    /// `[a.b.c, b.c, c]`. The root domain yields `[]`.
    pub fn suffixes(&self) -> Vec<DomainName> {
        let mut out = Vec::new();
        for start in 0..self.labels.len().saturating_sub(1) {
            let labels = self.labels[start..].to_vec();
            let mut octets = Vec::new();
            for label in &labels {
                octets.push(label.len() as u8);
                octets.extend_from_slice(label);
            }
            octets.push(0);
            out.push(DomainName { octets, labels });
        }
        out
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

/// Query types are a superset of record types: `ANY` (255) matches
/// any record type.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum QueryType {
    Record(RecordType),
    Any,
}

impl QueryType {
    pub fn matches(self, rtype: RecordType) -> bool {
        match self {
            QueryType::Any => true,
            QueryType::Record(rt) => rt == rtype,
        }
    }
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        if value == 255 {
            QueryType::Any
        } else {
            QueryType::Record(RecordType::from(value))
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Any => 255,
            QueryType::Record(rt) => rt.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum QueryClass {
    Class(RecordClass),
    Any,
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        if value == 255 {
            QueryClass::Any
        } else {
            QueryClass::Class(RecordClass::from(value))
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Any => 255,
            QueryClass::Class(c) => c.into(),
        }
    }
}

/// The record types this server is authoritative for. Anything else
/// round-trips as `Unknown` rather than failing to parse: an unknown
/// RR elsewhere in a message shouldn't prevent decoding the rest of
/// it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Unknown(tag) => write!(f, "TYPE{tag}"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClass {
    In,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::In,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::In => 1,
            RecordClass::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rtype_with_data: RecordTypeWithData,
    pub rclass: RecordClass,
    pub ttl: u32,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.rtype_with_data.rtype()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecordTypeWithData {
    A { address: [u8; 4] },
    AAAA { address: [u8; 16] },
    NS { nsdname: DomainName },
    CNAME { cname: DomainName },
    PTR { ptrdname: DomainName },
    MX { preference: u16, exchange: DomainName },
    TXT { chunks: Vec<Vec<u8>> },
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Unknown { tag: u16, octets: Vec<u8> },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::AAAA { .. } => RecordType::AAAA,
            RecordTypeWithData::NS { .. } => RecordType::NS,
            RecordTypeWithData::CNAME { .. } => RecordType::CNAME,
            RecordTypeWithData::PTR { .. } => RecordType::PTR,
            RecordTypeWithData::MX { .. } => RecordType::MX,
            RecordTypeWithData::TXT { .. } => RecordType::TXT,
            RecordTypeWithData::SOA { .. } => RecordType::SOA,
            RecordTypeWithData::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }
}

/// The EDNS(0) OPT pseudo-RR (RFC 6891), including any DNS Cookie
/// option (RFC 7873). Kept separate from `ResourceRecord` because its
/// `class`/`ttl` fields don't mean what they mean on a normal RR.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OptRecord {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub dnssec_ok: bool,
    pub z: u16,
    pub cookie: Option<Cookie>,
    /// Any other option TLVs, preserved verbatim so pass-through is
    /// lossless.
    pub other_options: Vec<(u16, Vec<u8>)>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cookie {
    pub client: [u8; 8],
    pub server: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_opcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Opcode::from(i)), i);
        }
    }

    #[test]
    fn u8_rcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn dotted_string_round_trip_lowercases() {
        let name = DomainName::from_dotted_string("WWW.Example.COM.").unwrap();
        assert_eq!(name.to_dotted_string(), "www.example.com");
    }

    #[test]
    fn root_is_its_own_dotted_string() {
        assert!(DomainName::root().is_root());
        assert_eq!(DomainName::from_dotted_string(".").unwrap(), DomainName::root());
        assert_eq!(DomainName::root().to_dotted_string(), ".");
    }

    #[test]
    fn rejects_labels_over_63_bytes() {
        let long_label = "a".repeat(64);
        assert!(DomainName::from_dotted_string(&long_label).is_none());
    }

    #[test]
    fn suffixes_are_most_specific_first() {
        let name = DomainName::from_dotted_string("a.b.hello.test").unwrap();
        let suffixes: Vec<String> = name.suffixes().iter().map(DomainName::to_dotted_string).collect();
        assert_eq!(
            suffixes,
            vec!["a.b.hello.test", "b.hello.test", "hello.test", "test"]
        );
    }

    #[test]
    fn root_has_no_suffixes() {
        assert!(DomainName::root().suffixes().is_empty());
    }
}
