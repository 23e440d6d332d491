//! The DNS wire protocol: message types plus (de)serialisation to and
//! from the on-the-wire octet form.

pub mod buffer;
pub mod deserialise;
pub mod error;
pub mod serialise;
pub mod types;

pub use error::{Error, SerialiseError};
pub use types::*;
