use std::fmt;

/// Why a message could not be decoded. Every variant is fatal for the
/// message it occurred in: per the resolver's error-handling policy,
/// a decode failure produces no reply at all, so (unlike some
/// wire-format decoders) there's no need to carry the message `id`
/// along with the error for building an error response.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    MessageTooShort,
    HeaderOpcodeInvalid(u8),
    QuestionTruncated,
    ResourceRecordTruncated,
    ResourceRecordLengthMismatch,
    DomainTruncated,
    DomainLabelInvalid,
    DomainPointerOutOfRange,
    DomainPointerLoop,
    DomainTooManyJumps,
    DomainTooLong,
    OptDuplicate,
    OptTruncated,
    OptCookieInvalidLength(usize),
    TrailingBytes,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MessageTooShort => write!(f, "message too short for a header"),
            Error::HeaderOpcodeInvalid(op) => write!(f, "invalid opcode '{op}'"),
            Error::QuestionTruncated => write!(f, "question section truncated"),
            Error::ResourceRecordTruncated => write!(f, "resource record truncated"),
            Error::ResourceRecordLengthMismatch => {
                write!(f, "rdata did not consume exactly rdlength bytes")
            }
            Error::DomainTruncated => write!(f, "domain name truncated"),
            Error::DomainLabelInvalid => write!(f, "invalid label length byte"),
            Error::DomainPointerOutOfRange => write!(f, "compression pointer out of range"),
            Error::DomainPointerLoop => write!(f, "compression pointer loop"),
            Error::DomainTooManyJumps => write!(f, "too many compression pointer jumps"),
            Error::DomainTooLong => write!(f, "domain name too long"),
            Error::OptDuplicate => write!(f, "more than one OPT record in a message"),
            Error::OptTruncated => write!(f, "OPT record rdata truncated"),
            Error::OptCookieInvalidLength(len) => write!(f, "invalid DNS Cookie length {len}"),
            Error::TrailingBytes => write!(f, "trailing bytes after message"),
        }
    }
}

impl std::error::Error for Error {}

/// Why a (well-formed, in-memory) message or record could not be
/// serialised onto the wire.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SerialiseError {
    CounterTooLarge { counter: usize, bits: u32 },
    TxtChunkTooLong { len: usize },
}

impl fmt::Display for SerialiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialiseError::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' does not fit in {bits} bits")
            }
            SerialiseError::TxtChunkTooLong { len } => {
                write!(f, "TXT chunk of {len} bytes exceeds 255 byte limit")
            }
        }
    }
}

impl std::error::Error for SerialiseError {}
