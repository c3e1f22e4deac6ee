//! StreamHub: browse video buckets on S3-compatible storage as a
//! series / season / episode catalog and keep watch progress in sync
//! through a Parquet snapshot stored next to the media.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
