//! The JSON zone document schema and its validation.

pub mod error;
pub mod types;
pub mod validate;

pub use error::ZoneError;
pub use types::{MxEntry, RawRecord, RecordData, SoaData, ValidatedRecord, Zone};
pub use validate::validate_zone;
