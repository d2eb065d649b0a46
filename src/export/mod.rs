//! Output side: MIME serialization and the mbox archive writer.

pub mod mbox;
pub mod mime;
