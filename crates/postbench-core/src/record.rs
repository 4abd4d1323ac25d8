//! Target entities produced from one raw post record.
//!
//! The three entities form a star around [`Post`]: every post references
//! exactly one [`Actor`] and at most one [`Location`]. Attributes typed as
//! `Option` hold the canonical absent value as `None`.

use serde::Serialize;

/// Location kind stored for every coordinate pair.
pub const POINT_KIND: &str = "Point";

/// Originator of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub description: Option<String>,
    pub connection_count: Option<i64>,
}

/// A geographic point shared by every post at the same coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub location_id: String,
    pub kind: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    /// Build a location whose identity is derived from its coordinates.
    pub fn from_coordinates(longitude: f64, latitude: f64) -> Self {
        // Adding 0.0 folds -0.0 into 0.0 so both spell the same id.
        let longitude = longitude + 0.0;
        let latitude = latitude + 0.0;
        Self {
            location_id: location_id(longitude, latitude),
            kind: POINT_KIND.to_string(),
            longitude,
            latitude,
        }
    }
}

/// Composite location key: `"{longitude}_{latitude}"`.
///
/// Coordinates use the shortest `f64` display, so whole numbers carry no
/// fractional digits: `(10.0, 20.0)` gives `"10_20"`, not `"10.0_20.0"`.
/// Stores loaded by tools that print `10.0` will not share keys with this one.
pub fn location_id(longitude: f64, latitude: f64) -> String {
    format!("{}_{}", longitude + 0.0, latitude + 0.0)
}

/// The primary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    /// Original timestamp text, format preserved.
    pub created_at: Option<String>,
    pub id: String,
    pub text: Option<String>,
    pub source_label: Option<String>,
    pub reply_to_actor_id: Option<String>,
    pub reply_to_handle: Option<String>,
    pub reply_to_post_id: Option<String>,
    pub repost_count: Option<i64>,
    /// JSON text of the source `contributors` field.
    pub contributors: String,
    pub actor_id: String,
    pub location_id: Option<String>,
}

/// All entities derived from one well-formed record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    /// Sequence position of the record within its source.
    pub position: usize,
    pub actor: Actor,
    pub location: Option<Location>,
    pub post: Post,
}
