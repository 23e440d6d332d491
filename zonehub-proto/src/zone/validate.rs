//! Schema validation for zone documents, run both on write (via zone
//! storage) and at startup (via the zone directory scan).

use serde_json::Value;

use crate::wire::{RecordClass, RecordType};
use crate::zone::error::ZoneError;
use crate::zone::types::{MxEntry, RawRecord, RecordData, SoaData, ValidatedRecord, Zone};

pub fn validate_zone(zone: &Zone) -> Result<Vec<ValidatedRecord>, ZoneError> {
    if let Some(version) = zone.version {
        if version < 1 {
            return Err(ZoneError::VersionInvalid);
        }
    }

    zone.records
        .iter()
        .enumerate()
        .map(|(index, record)| validate_record(index, record))
        .collect()
}

fn validate_record(index: usize, record: &RawRecord) -> Result<ValidatedRecord, ZoneError> {
    let name = match &record.name {
        None => None,
        Some(s) if !s.is_empty() => Some(s.clone()),
        Some(_) => return Err(ZoneError::RecordNameInvalid { index }),
    };

    let rtype = parse_record_type(&record.rtype)
        .ok_or_else(|| ZoneError::RecordTypeUnsupported {
            index,
            rtype: record.rtype.to_string(),
        })?;

    let rclass = match &record.class {
        None => RecordClass::In,
        Some(v) => parse_record_class(v).ok_or(ZoneError::RecordClassInvalid { index })?,
    };

    let ttl = match &record.ttl {
        None => None,
        Some(v) => Some(
            v.as_u64()
                .filter(|t| *t <= u64::from(u32::MAX))
                .map(|t| t as u32)
                .ok_or(ZoneError::RecordTtlInvalid { index })?,
        ),
    };

    let data = validate_data(index, rtype, &record.data)?;

    Ok(ValidatedRecord {
        name,
        rtype,
        rclass,
        ttl,
        data,
    })
}

fn parse_record_type(value: &Value) -> Option<RecordType> {
    match value {
        Value::String(s) => match s.to_ascii_uppercase().as_str() {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::AAAA),
            "NS" => Some(RecordType::NS),
            "CNAME" => Some(RecordType::CNAME),
            "SOA" => Some(RecordType::SOA),
            "PTR" => Some(RecordType::PTR),
            "MX" => Some(RecordType::MX),
            "TXT" => Some(RecordType::TXT),
            _ => None,
        },
        Value::Number(n) => {
            let code = n.as_u64().filter(|c| *c <= u64::from(u16::MAX))? as u16;
            match RecordType::from(code) {
                RecordType::Unknown(_) => None,
                known => Some(known),
            }
        }
        _ => None,
    }
}

fn parse_record_class(value: &Value) -> Option<RecordClass> {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("in") => Some(RecordClass::In),
        Value::Number(n) => {
            let code = n.as_u64().filter(|c| *c <= u64::from(u16::MAX))? as u16;
            Some(RecordClass::from(code))
        }
        _ => None,
    }
}

fn validate_data(index: usize, rtype: RecordType, data: &Value) -> Result<RecordData, ZoneError> {
    let invalid = |reason: &str| ZoneError::RecordDataInvalid {
        index,
        reason: reason.to_string(),
    };

    match rtype {
        RecordType::A
        | RecordType::AAAA
        | RecordType::NS
        | RecordType::CNAME
        | RecordType::PTR
        | RecordType::TXT => {
            let strings = as_string_or_list(data).ok_or_else(|| {
                invalid("expected a non-empty string or list of non-empty strings")
            })?;
            Ok(RecordData::Strings(strings))
        }
        RecordType::MX => {
            let entries = match data {
                Value::Object(_) => vec![parse_mx_entry(data).ok_or_else(|| {
                    invalid("expected an object with 'preference' and 'exchange'")
                })?],
                Value::Array(items) if !items.is_empty() => items
                    .iter()
                    .map(|item| {
                        parse_mx_entry(item).ok_or_else(|| {
                            invalid("expected an object with 'preference' and 'exchange'")
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(invalid("expected an MX object or non-empty list of them")),
            };
            Ok(RecordData::Mx(entries))
        }
        RecordType::SOA => {
            let soa = parse_soa(data).ok_or_else(|| {
                invalid("expected an object with mname, rname, serial, refresh, retry, expire, minimum")
            })?;
            Ok(RecordData::Soa(soa))
        }
        RecordType::Unknown(_) => unreachable!("parse_record_type rejects unknown types"),
    }
}

fn as_string_or_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
        Value::Array(items) if !items.is_empty() => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) if !s.is_empty() => out.push(s.clone()),
                    _ => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn parse_mx_entry(value: &Value) -> Option<MxEntry> {
    let obj = value.as_object()?;
    let preference = obj.get("preference")?.as_u64().filter(|p| *p <= u64::from(u16::MAX))? as u16;
    let exchange = obj.get("exchange")?.as_str().filter(|s| !s.is_empty())?.to_string();
    Some(MxEntry {
        preference,
        exchange,
    })
}

fn parse_soa(value: &Value) -> Option<SoaData> {
    let obj = value.as_object()?;
    let as_string = |key: &str| obj.get(key)?.as_str().map(str::to_string);
    let as_u32 = |key: &str| obj.get(key)?.as_u64().filter(|v| *v <= u64::from(u32::MAX)).map(|v| v as u32);
    Some(SoaData {
        mname: as_string("mname")?,
        rname: as_string("rname")?,
        serial: as_u32("serial")?,
        refresh: as_u32("refresh")?,
        retry: as_u32("retry")?,
        expire: as_u32("expire")?,
        minimum: as_u32("minimum")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zone(records: Vec<RawRecord>) -> Zone {
        Zone {
            name: "hello.test".to_string(),
            version: Some(1),
            records,
        }
    }

    fn record(rtype: Value, data: Value) -> RawRecord {
        RawRecord {
            name: None,
            rtype,
            class: None,
            ttl: Some(json!(300)),
            data,
        }
    }

    #[test]
    fn accepts_a_record_with_scalar_string_data() {
        let z = zone(vec![record(json!("A"), json!("1.2.3.4"))]);
        let validated = validate_zone(&z).unwrap();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].rtype, RecordType::A);
        assert_eq!(
            validated[0].data,
            RecordData::Strings(vec!["1.2.3.4".to_string()])
        );
    }

    #[test]
    fn accepts_a_record_with_list_valued_data() {
        let z = zone(vec![record(json!("A"), json!(["1.2.3.4", "5.6.7.8"]))]);
        let validated = validate_zone(&z).unwrap();
        assert_eq!(
            validated[0].data,
            RecordData::Strings(vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()])
        );
    }

    #[test]
    fn rejects_unsupported_type_code() {
        let z = zone(vec![record(json!(999), json!("x"))]);
        assert_eq!(
            validate_zone(&z),
            Err(ZoneError::RecordTypeUnsupported {
                index: 0,
                rtype: "999".to_string(),
            })
        );
    }

    #[test]
    fn rejects_empty_string_data() {
        let z = zone(vec![record(json!("A"), json!(""))]);
        assert!(matches!(
            validate_zone(&z),
            Err(ZoneError::RecordDataInvalid { index: 0, .. })
        ));
    }

    #[test]
    fn accepts_single_mx_object_and_normalises_to_a_list() {
        let z = zone(vec![record(
            json!("MX"),
            json!({"preference": 10, "exchange": "mail.hello.test"}),
        )]);
        let validated = validate_zone(&z).unwrap();
        assert_eq!(
            validated[0].data,
            RecordData::Mx(vec![MxEntry {
                preference: 10,
                exchange: "mail.hello.test".to_string(),
            }])
        );
    }

    #[test]
    fn parses_soa_record() {
        let z = zone(vec![record(
            json!("SOA"),
            json!({
                "mname": "ns1.example.com",
                "rname": "hostmaster.example.com",
                "serial": 20260109,
                "refresh": 7200,
                "retry": 3600,
                "expire": 1209600,
                "minimum": 3600
            }),
        )]);
        let validated = validate_zone(&z).unwrap();
        assert_eq!(
            validated[0].data,
            RecordData::Soa(SoaData {
                mname: "ns1.example.com".to_string(),
                rname: "hostmaster.example.com".to_string(),
                serial: 20260109,
                refresh: 7200,
                retry: 3600,
                expire: 1209600,
                minimum: 3600,
            })
        );
    }

    #[test]
    fn rejects_zero_version() {
        let mut z = zone(vec![record(json!("A"), json!("1.2.3.4"))]);
        z.version = Some(0);
        assert_eq!(validate_zone(&z), Err(ZoneError::VersionInvalid));
    }

    #[test]
    fn rejects_empty_record_name() {
        let mut r = record(json!("A"), json!("1.2.3.4"));
        r.name = Some(String::new());
        let z = zone(vec![r]);
        assert_eq!(
            validate_zone(&z),
            Err(ZoneError::RecordNameInvalid { index: 0 })
        );
    }
}
