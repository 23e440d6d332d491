//! Shared wire-format and zone-document types for the DNS server: the
//! DNS message codec and the JSON zone schema, with no I/O or
//! concurrency of their own.

pub mod wire;
pub mod zone;
