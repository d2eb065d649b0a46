//! `pst2mbox` converts archived mail messages into a single mbox file.
//!
//! Messages are read from a source archive (a JSON Lines dump of the
//! archive's message records), salvaged field by field, rebuilt as RFC 5322
//! messages and appended to an mbox under an exclusive file lock. A message
//! that cannot be converted is counted and skipped; the run continues.

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod rfc2047;
pub mod source;
