//! Record normalization.
//!
//! Turns one decoded post record into the [`Actor`], optional [`Location`]
//! and [`Post`] entities, applying null canonicalization on the way.
//!
//! # Source fields
//!
//! ```text
//! Actor    ← user.{id_str, name, screen_name, description, friends_count}
//! Location ← geo.coordinates = [longitude, latitude]
//! Post     ← created_at, id_str, text, source, in_reply_to_user_id_str,
//!            in_reply_to_screen_name, in_reply_to_status_id_str,
//!            retweet_count, contributors, user.id_str
//! ```
//!
//! # Absent values
//!
//! A field that is missing, JSON `null`, the empty string, or the `"NULL"`
//! sentinel normalizes to `None`. Key fields (post id, actor id) may not be
//! absent: such a record is malformed.

use crate::record::{Actor, Location, NormalizedRecord, Post};
use crate::{Error, Result};
use serde_json::Value;

/// Literal the source format uses for a missing value.
pub const NULL_SENTINEL: &str = "NULL";

/// Column bounds shared with the relational schema.
pub const DISPLAY_NAME_MAX_CHARS: usize = 100;
pub const HANDLE_MAX_CHARS: usize = 70;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;
pub const CREATED_AT_MAX_CHARS: usize = 70;
pub const TEXT_MAX_CHARS: usize = 300;
pub const SOURCE_LABEL_MAX_CHARS: usize = 500;
pub const REFERENCE_MAX_CHARS: usize = 70;

/// Decode one source line and normalize it.
pub fn normalize_line(line: &str, position: usize) -> Result<NormalizedRecord> {
    let value: Value = serde_json::from_str(line)?;
    normalize_record(&value, position)
}

/// Normalize an already decoded record.
pub fn normalize_record(record: &Value, position: usize) -> Result<NormalizedRecord> {
    if !record.is_object() {
        return Err(Error::NotAnObject { position });
    }

    let post_id = canonical_text(record.get("id_str")).ok_or(Error::MissingKey {
        position,
        field: "id_str",
    })?;

    let user = record
        .get("user")
        .filter(|u| u.is_object())
        .ok_or(Error::MissingKey {
            position,
            field: "user",
        })?;
    let actor_id = canonical_text(user.get("id_str")).ok_or(Error::MissingKey {
        position,
        field: "user.id_str",
    })?;

    let actor = Actor {
        id: actor_id.clone(),
        display_name: bounded_text(user.get("name"), DISPLAY_NAME_MAX_CHARS),
        handle: bounded_text(user.get("screen_name"), HANDLE_MAX_CHARS),
        description: bounded_text(user.get("description"), DESCRIPTION_MAX_CHARS),
        connection_count: canonical_integer(user.get("friends_count")),
    };

    let location = extract_location(record);

    let post = Post {
        created_at: bounded_text(record.get("created_at"), CREATED_AT_MAX_CHARS),
        id: post_id,
        text: bounded_text(record.get("text"), TEXT_MAX_CHARS),
        source_label: bounded_text(record.get("source"), SOURCE_LABEL_MAX_CHARS),
        reply_to_actor_id: bounded_text(record.get("in_reply_to_user_id_str"), REFERENCE_MAX_CHARS),
        reply_to_handle: bounded_text(record.get("in_reply_to_screen_name"), REFERENCE_MAX_CHARS),
        reply_to_post_id: bounded_text(
            record.get("in_reply_to_status_id_str"),
            REFERENCE_MAX_CHARS,
        ),
        repost_count: canonical_integer(record.get("retweet_count")),
        contributors: serialize_contributors(record.get("contributors")),
        actor_id,
        location_id: location.as_ref().map(|l| l.location_id.clone()),
    };

    Ok(NormalizedRecord {
        position,
        actor,
        location,
        post,
    })
}

/// Whether a raw value is one of the spellings of "absent".
pub fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty() || s == NULL_SENTINEL,
        Some(_) => false,
    }
}

/// Null-checker for text attributes.
///
/// Strings pass through verbatim; other non-absent values keep their JSON
/// text.
pub fn canonical_text(value: Option<&Value>) -> Option<String> {
    if is_absent(value) {
        return None;
    }
    match value? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Null-checker for integer attributes.
///
/// Accepts JSON integers and decimal integer strings. Anything else has no
/// integer reading and is stored as absent.
pub fn canonical_integer(value: Option<&Value>) -> Option<i64> {
    if is_absent(value) {
        return None;
    }
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bounded_text(value: Option<&Value>, max_chars: usize) -> Option<String> {
    canonical_text(value).map(|s| truncate_chars(s, max_chars))
}

fn truncate_chars(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}

/// Extract the `[longitude, latitude]` pair from a record's `geo` object.
///
/// Returns `None` unless `geo.coordinates` is an array of exactly two JSON
/// numbers.
pub fn coordinates(record: &Value) -> Option<(f64, f64)> {
    let pair = record.get("geo")?.get("coordinates")?.as_array()?;
    match pair.as_slice() {
        [longitude, latitude] => Some((longitude.as_f64()?, latitude.as_f64()?)),
        _ => None,
    }
}

/// Build the [`Location`] entity for a record, if it carries valid coordinates.
pub fn extract_location(record: &Value) -> Option<Location> {
    coordinates(record).map(|(longitude, latitude)| Location::from_coordinates(longitude, latitude))
}

/// Canonical JSON text of the contributors field; a missing field is `"null"`.
pub fn serialize_contributors(value: Option<&Value>) -> String {
    value.unwrap_or(&Value::Null).to_string()
}
