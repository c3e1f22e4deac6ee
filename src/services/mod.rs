//! Core components: the object-store seam, listing, catalog building,
//! progress storage, snapshot sync and the session that drives them.

pub mod catalog_service;
pub mod listing_service;
pub mod memory_store;
pub mod object_store;
pub mod progress_service;
pub mod s3_store;
pub mod session_service;
pub mod snapshot_codec;
pub mod sync_service;
