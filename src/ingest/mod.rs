//! Upstream data ingestion.
//!
//! - `radar`: radar frame listing, download, and PNG decoding.

pub mod radar;
