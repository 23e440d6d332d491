//! The on-disk/on-wire JSON zone document. These types mirror exactly
//! what a client sends and what storage persists; shape validation and
//! the string/list normalisation of `data` happen in `validate`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub records: Vec<RawRecord>,
}

/// A single record as it appears in the JSON document, before type
/// normalisation. `rtype`/`class`/`ttl` are kept as raw `Value`s
/// because the schema accepts either a string or a number for some of
/// them; `validate::validate_zone` is what turns this into a
/// `ValidatedRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub rtype: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Value>,
    pub data: Value,
}

/// A record after shape validation: `rtype`/`rclass` resolved to the
/// wire enums, and `data` normalised so list-vs-scalar is already
/// decided. One `ValidatedRecord` may still expand to several RRs at
/// resolution time (one per `RecordData` entry).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub name: Option<String>,
    pub rtype: crate::wire::RecordType,
    pub rclass: crate::wire::RecordClass,
    pub ttl: Option<u32>,
    pub data: RecordData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// A, AAAA, NS, CNAME, PTR, TXT: one wire RR per string.
    Strings(Vec<String>),
    Mx(Vec<MxEntry>),
    Soa(SoaData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MxEntry {
    pub preference: u16,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoaData {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}
