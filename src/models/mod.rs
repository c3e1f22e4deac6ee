//! Core data models for the catalog and progress tracker.
//!
//! These are fixed, typed records: listing descriptors, catalog entries,
//! progress records and the connection profile. They serialize naturally as
//! JSON via `serde` for the HTTP surface.

pub mod catalog;
pub mod object;
pub mod profile;
pub mod progress;
