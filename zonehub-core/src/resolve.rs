//! Authoritative resolution: suffix walk against the zone cache,
//! record-name/qtype matching, and rdata encoding into a response
//! message.

use std::net::{Ipv4Addr, Ipv6Addr};

use zonehub_proto::wire::{
    DomainName, Message, QueryType, Rcode, RecordType, RecordTypeWithData, ResourceRecord,
};
use zonehub_proto::zone::{validate_zone, RecordData, ValidatedRecord, Zone};

use crate::cache::CacheHandle;

const DEFAULT_TTL: u32 = 60;

pub async fn resolve(cache: &CacheHandle, request: &Message) -> Message {
    let mut response = request.make_response();
    response.header.is_authoritative = true;

    let mut any_owning_zone = false;

    for question in &request.questions {
        if let Some((zone, records)) = owning_zone(cache, &question.name).await {
            any_owning_zone = true;
            let qname = question.name.to_dotted_string();
            for record in &records {
                if expand_record_name(&record.name, &zone.name) != qname {
                    continue;
                }
                if !question.qtype.matches(record.rtype) {
                    continue;
                }
                response
                    .answers
                    .extend(encode_record(&question.name, record));
            }
        }
    }

    response.header.rcode = if any_owning_zone {
        Rcode::NoError
    } else {
        Rcode::NameError
    };
    response.opt = request.opt.clone();

    response
}

/// Walk `qname`'s suffixes from most to least specific; the first one
/// with a fetchable, valid zone owns the name.
async fn owning_zone(cache: &CacheHandle, qname: &DomainName) -> Option<(Zone, Vec<ValidatedRecord>)> {
    for suffix in qname.suffixes() {
        let suffix_name = suffix.to_dotted_string();
        if let Ok(zone) = cache.fetch(&suffix_name).await {
            if let Ok(records) = validate_zone(&zone) {
                return Some((zone, records));
            }
        }
    }
    None
}

/// `None`/`""`/`"@"` mean the zone apex; an unqualified label is
/// prefixed with the zone name; anything else (containing a dot) is
/// taken as-is.
fn expand_record_name(record_name: &Option<String>, zone_name: &str) -> String {
    match record_name {
        None => zone_name.to_string(),
        Some(s) if s.is_empty() || s == "@" => zone_name.to_string(),
        Some(s) if s.contains('.') => s.to_ascii_lowercase(),
        Some(s) => format!("{}.{zone_name}", s.to_ascii_lowercase()),
    }
}

/// Encode one `ValidatedRecord` into zero or more `ResourceRecord`s:
/// list-valued data produces one RR per entry, and an entry that
/// can't be parsed into its type's rdata shape contributes none.
fn encode_record(qname: &DomainName, record: &ValidatedRecord) -> Vec<ResourceRecord> {
    let ttl = record.ttl.unwrap_or(DEFAULT_TTL);
    let rclass = record.rclass;
    let name = qname.clone();

    let rtype_with_data: Vec<RecordTypeWithData> = match &record.data {
        RecordData::Strings(values) => values
            .iter()
            .filter_map(|value| encode_string(record.rtype, value))
            .collect(),
        RecordData::Mx(entries) => entries
            .iter()
            .filter_map(|entry| {
                DomainName::from_dotted_string(&entry.exchange).map(|exchange| {
                    RecordTypeWithData::MX {
                        preference: entry.preference,
                        exchange,
                    }
                })
            })
            .collect(),
        RecordData::Soa(soa) => {
            match (
                DomainName::from_dotted_string(&soa.mname),
                DomainName::from_dotted_string(&soa.rname),
            ) {
                (Some(mname), Some(rname)) => vec![RecordTypeWithData::SOA {
                    mname,
                    rname,
                    serial: soa.serial,
                    refresh: soa.refresh,
                    retry: soa.retry,
                    expire: soa.expire,
                    minimum: soa.minimum,
                }],
                _ => Vec::new(),
            }
        }
    };

    rtype_with_data
        .into_iter()
        .map(|rtype_with_data| ResourceRecord {
            name: name.clone(),
            rtype_with_data,
            rclass,
            ttl,
        })
        .collect()
}

fn encode_string(rtype: RecordType, value: &str) -> Option<RecordTypeWithData> {
    match rtype {
        RecordType::A => {
            let addr: Ipv4Addr = value.parse().ok()?;
            Some(RecordTypeWithData::A {
                address: addr.octets(),
            })
        }
        RecordType::AAAA => {
            let addr: Ipv6Addr = value.parse().ok()?;
            Some(RecordTypeWithData::AAAA {
                address: addr.octets(),
            })
        }
        RecordType::NS => DomainName::from_dotted_string(value)
            .map(|nsdname| RecordTypeWithData::NS { nsdname }),
        RecordType::CNAME => {
            DomainName::from_dotted_string(value).map(|cname| RecordTypeWithData::CNAME { cname })
        }
        RecordType::PTR => DomainName::from_dotted_string(value)
            .map(|ptrdname| RecordTypeWithData::PTR { ptrdname }),
        RecordType::TXT => Some(RecordTypeWithData::TXT {
            chunks: value.as_bytes().chunks(255).map(<[u8]>::to_vec).collect(),
        }),
        RecordType::SOA | RecordType::MX | RecordType::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Replicator;
    use crate::config::{Config, Peer};
    use crate::storage::Storage;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use zonehub_proto::wire::{Opcode, QueryClass, Question};
    use zonehub_proto::zone::RawRecord;

    fn test_cache(dir: &tempfile::TempDir) -> CacheHandle {
        let config = Arc::new(Config {
            zones_folder: PathBuf::from(dir.path()),
            dns_port: 53,
            http_port: 8080,
            metrics_port: 9420,
            api_token: "secret".to_string(),
            replication_quorum_ratio: 1.0,
            replication_timeout_ms: 50,
            node_id: "node-a".to_string(),
            peers: Vec::<Peer>::new(),
        });
        CacheHandle::spawn(Storage::new(dir.path().to_path_buf()), Replicator::new(config))
    }

    fn query_for(name: &str, qtype: zonehub_proto::wire::RecordType) -> Message {
        Message {
            header: zonehub_proto::wire::Header {
                id: 0x1234,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                z: 0,
                rcode: zonehub_proto::wire::Rcode::NoError,
            },
            questions: vec![Question {
                name: DomainName::from_dotted_string(name).unwrap(),
                qtype: QueryType::Record(qtype),
                qclass: QueryClass::Class(zonehub_proto::wire::RecordClass::In),
            }],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            opt: None,
        }
    }

    #[tokio::test]
    async fn resolves_apex_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        cache
            .create(
                "hello.test",
                Zone {
                    name: "hello.test".to_string(),
                    version: Some(1),
                    records: vec![RawRecord {
                        name: None,
                        rtype: json!("A"),
                        class: None,
                        ttl: Some(json!(300)),
                        data: json!("1.2.3.4"),
                    }],
                },
            )
            .await
            .unwrap();

        let response = resolve(&cache, &query_for("hello.test", RecordType::A)).await;
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.answers.len(), 1);
        let rr = &response.answers[0];
        assert_eq!(rr.name.to_dotted_string(), "hello.test");
        assert_eq!(rr.ttl, 300);
        assert_eq!(
            rr.rtype_with_data,
            RecordTypeWithData::A {
                address: [1, 2, 3, 4]
            }
        );
    }

    #[tokio::test]
    async fn nxdomain_when_no_zone_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        let response = resolve(&cache, &query_for("example.org", RecordType::A)).await;
        assert_eq!(response.header.rcode, Rcode::NameError);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn noerror_with_empty_answers_for_unmatched_type() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        cache
            .create(
                "hello.test",
                Zone {
                    name: "hello.test".to_string(),
                    version: Some(1),
                    records: vec![RawRecord {
                        name: None,
                        rtype: json!("A"),
                        class: None,
                        ttl: Some(json!(300)),
                        data: json!("1.2.3.4"),
                    }],
                },
            )
            .await
            .unwrap();

        let response = resolve(&cache, &query_for("hello.test", RecordType::AAAA)).await;
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn unqualified_label_resolves_against_parent_zone() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        cache
            .create(
                "hello.test",
                Zone {
                    name: "hello.test".to_string(),
                    version: Some(1),
                    records: vec![RawRecord {
                        name: Some("www".to_string()),
                        rtype: json!("A"),
                        class: None,
                        ttl: Some(json!(60)),
                        data: json!("9.9.9.9"),
                    }],
                },
            )
            .await
            .unwrap();

        let response = resolve(&cache, &query_for("www.hello.test", RecordType::A)).await;
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn query_for_unrelated_subdomain_misses_deeper_zone_match() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        cache
            .create(
                "hello.test",
                Zone {
                    name: "hello.test".to_string(),
                    version: Some(1),
                    records: vec![RawRecord {
                        name: Some("www".to_string()),
                        rtype: json!("A"),
                        class: None,
                        ttl: Some(json!(60)),
                        data: json!("9.9.9.9"),
                    }],
                },
            )
            .await
            .unwrap();

        let response = resolve(&cache, &query_for("a.b.hello.test", RecordType::A)).await;
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert!(response.answers.is_empty());
    }
}
