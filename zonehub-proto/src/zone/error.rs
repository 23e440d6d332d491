use std::fmt;

/// Why a zone document failed schema validation. Carries the record
/// index (when the problem is with a specific record) so operators
/// and the startup validator can point at the offending entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ZoneError {
    VersionInvalid,
    RecordTypeUnsupported { index: usize, rtype: String },
    RecordClassInvalid { index: usize },
    RecordTtlInvalid { index: usize },
    RecordNameInvalid { index: usize },
    RecordDataInvalid { index: usize, reason: String },
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::VersionInvalid => write!(f, "version must be an integer >= 1"),
            ZoneError::RecordTypeUnsupported { index, rtype } => {
                write!(f, "record {index}: unsupported type '{rtype}'")
            }
            ZoneError::RecordClassInvalid { index } => {
                write!(f, "record {index}: class must be \"IN\" or an integer")
            }
            ZoneError::RecordTtlInvalid { index } => {
                write!(f, "record {index}: ttl must be a non-negative integer")
            }
            ZoneError::RecordNameInvalid { index } => {
                write!(f, "record {index}: name must be a non-empty string")
            }
            ZoneError::RecordDataInvalid { index, reason } => {
                write!(f, "record {index}: invalid data ({reason})")
            }
        }
    }
}

impl std::error::Error for ZoneError {}
