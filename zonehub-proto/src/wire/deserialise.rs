//! Deserialisation of DNS messages from the network. See the `types`
//! module for details of the format.

use std::collections::HashSet;

use crate::wire::buffer::ConsumableBuffer;
use crate::wire::error::Error;
use crate::wire::types::*;

const HEADER_MASK_QR: u8 = 0b1000_0000;
const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
const HEADER_OFFSET_OPCODE: u8 = 3;
const HEADER_MASK_AA: u8 = 0b0000_0100;
const HEADER_MASK_TC: u8 = 0b0000_0010;
const HEADER_MASK_RD: u8 = 0b0000_0001;
const HEADER_MASK_RA: u8 = 0b1000_0000;
const HEADER_MASK_Z: u8 = 0b0111_0000;
const HEADER_OFFSET_Z: u8 = 4;
const HEADER_MASK_RCODE: u8 = 0b0000_1111;

impl Message {
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(octets)
    }

    pub fn deserialise(octets: &[u8]) -> Result<Self, Error> {
        let mut buffer = ConsumableBuffer::new(octets);
        let wire_header = WireHeader::deserialise(&mut buffer)?;

        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(octets, &mut buffer)?);
        }

        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(octets, &mut buffer)?);
        }

        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(octets, &mut buffer)?);
        }

        let mut additional = Vec::with_capacity(wire_header.arcount.into());
        let mut opt = None;
        for _ in 0..wire_header.arcount {
            // Peek the type tag on a scratch cursor so a non-OPT
            // record can still be decoded with its proper rdata
            // shape (and any compression pointers resolved against
            // the real message), rather than forcing every
            // additional-section record through the opaque OPT path.
            let mut peek = buffer;
            let _name = DomainName::deserialise(octets, &mut peek)?;
            let rtype = peek.next_u16().ok_or(Error::ResourceRecordTruncated)?;

            if rtype == 41 {
                let raw = RawRr::deserialise(octets, &mut buffer)?;
                if opt.is_some() {
                    return Err(Error::OptDuplicate);
                }
                opt = Some(OptRecord::from_raw(&raw)?);
            } else {
                additional.push(ResourceRecord::deserialise(octets, &mut buffer)?);
            }
        }

        if buffer.remaining() != 0 {
            return Err(Error::TrailingBytes);
        }

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
            opt,
        })
    }
}

impl WireHeader {
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::MessageTooShort)?;
        let flags1 = buffer.next_u8().ok_or(Error::MessageTooShort)?;
        let flags2 = buffer.next_u8().ok_or(Error::MessageTooShort)?;
        let qdcount = buffer.next_u16().ok_or(Error::MessageTooShort)?;
        let ancount = buffer.next_u16().ok_or(Error::MessageTooShort)?;
        let nscount = buffer.next_u16().ok_or(Error::MessageTooShort)?;
        let arcount = buffer.next_u16().ok_or(Error::MessageTooShort)?;

        let opcode_bits = (flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE;
        if opcode_bits > 2 {
            return Err(Error::HeaderOpcodeInvalid(opcode_bits));
        }

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from(opcode_bits),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                z: (flags2 & HEADER_MASK_Z) >> HEADER_OFFSET_Z,
                rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    pub fn deserialise(message: &[u8], buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(message, buffer)?;
        let qtype = QueryType::from(buffer.next_u16().ok_or(Error::QuestionTruncated)?);
        let qclass = QueryClass::from(buffer.next_u16().ok_or(Error::QuestionTruncated)?);
        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

/// The fields of an OPT pseudo-RR before its rdata is parsed into
/// option TLVs. The type tag itself is not stored here: callers only
/// reach `RawRr::deserialise` once a peek has confirmed `TYPE == 41`.
struct RawRr {
    name: DomainName,
    rclass: u16,
    ttl: u32,
    rdata: Vec<u8>,
}

impl RawRr {
    fn deserialise(message: &[u8], buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(message, buffer)?;
        let _rtype = buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?;
        let rclass = buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?;
        let rdata = buffer
            .take(rdlength as usize)
            .ok_or(Error::ResourceRecordTruncated)?
            .to_vec();
        Ok(Self {
            name,
            rclass,
            ttl,
            rdata,
        })
    }
}

impl ResourceRecord {
    pub fn deserialise(message: &[u8], buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(message, buffer)?;
        let rtype = RecordType::from(buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?);
        let rclass = RecordClass::from(buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?);
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTruncated)? as usize;
        let rdata_start = buffer.position;

        let rtype_with_data = match rtype {
            RecordType::A => {
                let bytes = buffer.take(4).ok_or(Error::ResourceRecordTruncated)?;
                RecordTypeWithData::A {
                    address: bytes.try_into().unwrap(),
                }
            }
            RecordType::AAAA => {
                let bytes = buffer.take(16).ok_or(Error::ResourceRecordTruncated)?;
                RecordTypeWithData::AAAA {
                    address: bytes.try_into().unwrap(),
                }
            }
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: DomainName::deserialise(message, buffer)?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: DomainName::deserialise(message, buffer)?,
            },
            RecordType::PTR => RecordTypeWithData::PTR {
                ptrdname: DomainName::deserialise(message, buffer)?,
            },
            RecordType::MX => {
                let preference = buffer.next_u16().ok_or(Error::ResourceRecordTruncated)?;
                let exchange = DomainName::deserialise(message, buffer)?;
                RecordTypeWithData::MX {
                    preference,
                    exchange,
                }
            }
            RecordType::TXT => {
                let raw = buffer.take(rdlength).ok_or(Error::ResourceRecordTruncated)?;
                let mut chunks = Vec::new();
                let mut i = 0;
                while i < raw.len() {
                    let len = raw[i] as usize;
                    if i + 1 + len > raw.len() {
                        return Err(Error::ResourceRecordTruncated);
                    }
                    chunks.push(raw[i + 1..i + 1 + len].to_vec());
                    i += 1 + len;
                }
                RecordTypeWithData::TXT { chunks }
            }
            RecordType::SOA => {
                let mname = DomainName::deserialise(message, buffer)?;
                let rname = DomainName::deserialise(message, buffer)?;
                let serial = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
                let refresh = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
                let retry = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
                let expire = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
                let minimum = buffer.next_u32().ok_or(Error::ResourceRecordTruncated)?;
                RecordTypeWithData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                }
            }
            RecordType::Unknown(tag) => {
                let octets = buffer.take(rdlength).ok_or(Error::ResourceRecordTruncated)?;
                RecordTypeWithData::Unknown {
                    tag,
                    octets: octets.to_vec(),
                }
            }
        };

        // name-bearing rdata must fully consume RDLENGTH, or the
        // record is rejected (a name that decompresses via a pointer
        // can legitimately end anywhere in the message, but the
        // cursor in *this* record's rdata must land exactly on the
        // declared boundary).
        if buffer.position - rdata_start != rdlength {
            return Err(Error::ResourceRecordLengthMismatch);
        }

        Ok(Self {
            name,
            rtype_with_data,
            rclass,
            ttl,
        })
    }
}

impl OptRecord {
    fn from_raw(raw: &RawRr) -> Result<Self, Error> {
        if !raw.name.is_root() {
            return Err(Error::OptTruncated);
        }
        let extended_rcode = (raw.ttl >> 24) as u8;
        let version = (raw.ttl >> 16) as u8;
        let dnssec_ok = raw.ttl & 0x0000_8000 != 0;
        let z = (raw.ttl & 0x0000_7fff) as u16;

        let mut cookie = None;
        let mut other_options = Vec::new();
        let mut pos = 0;
        while pos < raw.rdata.len() {
            if pos + 4 > raw.rdata.len() {
                return Err(Error::OptTruncated);
            }
            let code = u16::from_be_bytes([raw.rdata[pos], raw.rdata[pos + 1]]);
            let len = u16::from_be_bytes([raw.rdata[pos + 2], raw.rdata[pos + 3]]) as usize;
            pos += 4;
            if pos + len > raw.rdata.len() {
                return Err(Error::OptTruncated);
            }
            let data = &raw.rdata[pos..pos + len];
            pos += len;

            if code == OPT_OPTION_COOKIE {
                if len < 8 || (len > 8 && !(16..=40).contains(&len)) {
                    return Err(Error::OptCookieInvalidLength(len));
                }
                let client: [u8; 8] = data[0..8].try_into().unwrap();
                let server = if len > 8 { Some(data[8..].to_vec()) } else { None };
                cookie = Some(Cookie { client, server });
            } else {
                other_options.push((code, data.to_vec()));
            }
        }

        Ok(Self {
            udp_payload_size: raw.rclass,
            extended_rcode,
            version,
            dnssec_ok,
            z,
            cookie,
            other_options,
        })
    }
}

impl DomainName {
    /// Decode a domain name starting at the buffer's current
    /// position, following compression pointers as needed. On
    /// return, the buffer's position is the first byte after the
    /// name *as seen from the outer call site* - i.e. right after the
    /// pointer if this name started with (or contained) one, not
    /// wherever the last jump landed.
    pub fn deserialise(message: &[u8], buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let (name, next_offset) = decode_name_at(message, buffer.position)?;
        buffer.position = next_offset;
        Ok(name)
    }
}

fn decode_name_at(message: &[u8], start: usize) -> Result<(DomainName, usize), Error> {
    let mut pos = start;
    let mut labels: Vec<Vec<u8>> = Vec::new();
    let mut octets: Vec<u8> = Vec::new();
    let mut jumps = 0usize;
    let mut visited: HashSet<usize> = HashSet::new();
    let mut next_offset: Option<usize> = None;

    loop {
        let len_byte = *message.get(pos).ok_or(Error::DomainTruncated)?;

        if len_byte & 0b1100_0000 == 0b1100_0000 {
            let lo = *message.get(pos + 1).ok_or(Error::DomainTruncated)?;
            let ptr = (u16::from_be_bytes([len_byte & 0b0011_1111, lo])) as usize;
            if next_offset.is_none() {
                next_offset = Some(pos + 2);
            }
            if ptr >= message.len() {
                return Err(Error::DomainPointerOutOfRange);
            }
            if !visited.insert(ptr) {
                return Err(Error::DomainPointerLoop);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(Error::DomainTooManyJumps);
            }
            pos = ptr;
            continue;
        }

        if len_byte & 0b1100_0000 != 0b0000_0000 {
            return Err(Error::DomainLabelInvalid);
        }

        let len = len_byte as usize;
        pos += 1;
        if len == 0 {
            octets.push(0);
            labels.push(Vec::new());
            if next_offset.is_none() {
                next_offset = Some(pos);
            }
            break;
        }

        if pos + len > message.len() {
            return Err(Error::DomainTruncated);
        }
        let mut label: Vec<u8> = message[pos..pos + len].to_vec();
        for b in label.iter_mut() {
            *b = b.to_ascii_lowercase();
        }
        octets.push(len as u8);
        octets.extend_from_slice(&label);
        labels.push(label);
        pos += len;

        if octets.len() > DOMAIN_NAME_MAX_LEN {
            return Err(Error::DomainTooLong);
        }
    }

    if octets.len() > DOMAIN_NAME_MAX_LEN {
        return Err(Error::DomainTooLong);
    }

    Ok((
        DomainName { octets, labels },
        next_offset.expect("root label always sets next_offset"),
    ))
}
