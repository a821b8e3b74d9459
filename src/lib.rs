//! Radar rain-alert service.
//!
//! Samples a public weather-radar feed at one pinned location, classifies
//! rain intensity from image colour, and notifies the owner only when the
//! severity tier rises. One invocation is one run; scheduling is external.

pub mod alert;
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod db;
pub mod geo;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod verify;
