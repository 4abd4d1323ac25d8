//! Core types, normalization, and shared utilities for postbench.
//!
//! This crate provides:
//! - The three target entities (actor, location, post) built from one record
//! - Record normalization with null canonicalization
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod metrics;
pub mod normalize;
pub mod record;

pub use error::{Error, Result};
pub use normalize::{
    NULL_SENTINEL, canonical_integer, canonical_text, coordinates, extract_location, is_absent,
    normalize_line, normalize_record, serialize_contributors,
};
pub use record::{Actor, Location, NormalizedRecord, POINT_KIND, Post, location_id};
