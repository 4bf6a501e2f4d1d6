//! X.509 certificate decoding
//!
//! Turns raw file contents (a PEM concatenation or a single DER blob) into
//! [`CertificateRecord`]s carrying expiry metadata. No signature or chain
//! validation is performed.

pub mod parser;
pub mod record;

pub use parser::{CertParser, DEFAULT_MAX_FILE_SIZE};
pub use record::CertificateRecord;
