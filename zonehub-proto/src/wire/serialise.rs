//! Serialisation of DNS messages to the wire format. Compression
//! pointers are never emitted on encode (only accepted on decode),
//! per the wire codec's design: the server only ever serialises
//! answers it just built, so there's nothing to gain from
//! compression and a lot of complexity to lose by requiring it.

use crate::wire::buffer::WritableBuffer;
use crate::wire::error::SerialiseError as Error;
use crate::wire::types::*;

fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    u16::try_from(counter).map_err(|_| Error::CounterTooLarge { counter, bits: 16 })
}

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

const OPT_MASK_DO: u16 = 0b1000_0000_0000_0000;

impl Message {
    pub fn to_octets(&self) -> Result<Vec<u8>, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets)
    }

    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount_rrs = usize_to_u16(self.additional.len())?;
        let arcount = arcount_rrs + u16::from(self.opt.is_some());

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(buffer)?;
        }
        if let Some(opt) = &self.opt {
            opt.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_z = HEADER_MASK_Z & (self.z << HEADER_OFFSET_Z);
        let field_rcode = HEADER_MASK_RCODE & self.rcode.code();

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_z | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer);
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
    }
}

impl DomainName {
    /// The `octets` field is already the uncompressed wire encoding,
    /// built once at construction time (see `from_dotted_string` and
    /// the decoder), so this is just a copy.
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        buffer.write_octets(&self.octets);
    }
}

impl ResourceRecord {
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer);
        buffer.write_u16(self.rtype().into());
        buffer.write_u16(self.rclass.into());
        buffer.write_u32(self.ttl);

        let rdlength_index = buffer.index();
        buffer.write_u16(0);
        let rdata_start = buffer.index();

        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(address),
            RecordTypeWithData::AAAA { address } => buffer.write_octets(address),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer),
            RecordTypeWithData::PTR { ptrdname } => ptrdname.serialise(buffer),
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer);
            }
            RecordTypeWithData::TXT { chunks } => {
                for chunk in chunks {
                    let len = u8::try_from(chunk.len())
                        .map_err(|_| Error::TxtChunkTooLong { len: chunk.len() })?;
                    buffer.write_u8(len);
                    buffer.write_octets(chunk);
                }
            }
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer);
                rname.serialise(buffer);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordTypeWithData::Unknown { octets, .. } => buffer.write_octets(octets),
        }

        let rdlength = usize_to_u16(buffer.index() - rdata_start)?;
        buffer.patch_u16(rdlength_index, rdlength);

        Ok(())
    }
}

impl OptRecord {
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        DomainName::root().serialise(buffer);
        buffer.write_u16(41); // OPT
        buffer.write_u16(self.udp_payload_size);

        let z_flags = self.z & 0b0111_1111_1111_1111;
        let do_flag = if self.dnssec_ok { OPT_MASK_DO } else { 0 };
        let ttl = (u32::from(self.extended_rcode) << 24)
            | (u32::from(self.version) << 16)
            | u32::from(do_flag | z_flags);
        buffer.write_u32(ttl);

        let rdlength_index = buffer.index();
        buffer.write_u16(0);
        let rdata_start = buffer.index();

        if let Some(cookie) = &self.cookie {
            let len = 8 + cookie.server.as_ref().map_or(0, Vec::len);
            buffer.write_u16(OPT_OPTION_COOKIE);
            buffer.write_u16(usize_to_u16(len)?);
            buffer.write_octets(&cookie.client);
            if let Some(server) = &cookie.server {
                buffer.write_octets(server);
            }
        }
        for (code, data) in &self.other_options {
            buffer.write_u16(*code);
            buffer.write_u16(usize_to_u16(data.len())?);
            buffer.write_octets(data);
        }

        let rdlength = usize_to_u16(buffer.index() - rdata_start)?;
        buffer.patch_u16(rdlength_index, rdlength);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdlength_patched_after_rdata() {
        let rr = ResourceRecord {
            name: DomainName::from_dotted_string("www.example.com").unwrap(),
            rtype_with_data: RecordTypeWithData::MX {
                preference: 32,
                exchange: DomainName::from_dotted_string("mx.example.com").unwrap(),
            },
            rclass: RecordClass::In,
            ttl: 300,
        };
        let mut buf = WritableBuffer::default();
        rr.serialise(&mut buf).unwrap();

        // name (13) + type (2) + class (2) + ttl (4) + rdlength (2)
        let rdlength_offset = 13 + 2 + 2 + 4;
        let rdlength =
            u16::from_be_bytes([buf.octets[rdlength_offset], buf.octets[rdlength_offset + 1]]);
        assert_eq!(rdlength as usize, buf.octets.len() - rdlength_offset - 2);
    }

    #[test]
    fn txt_chunk_too_long_is_rejected() {
        let rr = ResourceRecord {
            name: DomainName::root(),
            rtype_with_data: RecordTypeWithData::TXT {
                chunks: vec![vec![0u8; 256]],
            },
            rclass: RecordClass::In,
            ttl: 60,
        };
        let mut buf = WritableBuffer::default();
        assert_eq!(
            rr.serialise(&mut buf),
            Err(Error::TxtChunkTooLong { len: 256 })
        );
    }

    #[test]
    fn opt_with_cookie_round_trips_to_fixed_layout() {
        let opt = OptRecord {
            udp_payload_size: 4096,
            extended_rcode: 0,
            version: 0,
            dnssec_ok: false,
            z: 0,
            cookie: Some(Cookie {
                client: [0x1a, 0x60, 0x9b, 0x45, 0x3c, 0xe6, 0x9b, 0x6b],
                server: None,
            }),
            other_options: Vec::new(),
        };
        let mut buf = WritableBuffer::default();
        opt.serialise(&mut buf).unwrap();

        // root name (1) + type (2) + class (2) + ttl (4) + rdlength (2) + code/len (4) + cookie (8)
        assert_eq!(buf.octets.len(), 1 + 2 + 2 + 4 + 2 + 4 + 8);
        assert_eq!(&buf.octets[0..1], &[0]);
        assert_eq!(&buf.octets[1..3], &41u16.to_be_bytes());
        assert_eq!(&buf.octets[3..5], &4096u16.to_be_bytes());
    }
}
