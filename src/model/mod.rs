//! Core data model types: addresses, timestamps, attachments, output records and statistics.

pub mod address;
pub mod attachment;
pub mod mail;
pub mod record;
pub mod stats;
