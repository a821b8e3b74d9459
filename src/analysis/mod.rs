//! Radar image analysis for the rain-alert service.
//!
//! Turns decoded frames into one stable severity for the pinned point.
//! Geometric mapping lives in `crate::geo`; alert decisions live in
//! `crate::alert`.
//!
//! Submodules:
//! - `classify`: legend matching over a pixel neighbourhood.
//! - `aggregate`: maximum over the most recent frames.

pub mod aggregate;
pub mod classify;
