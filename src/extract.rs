//! Field extraction and result normalization.
//!
//! The source payloads are duck-typed JSON with different nesting per access
//! path. Extraction is an explicit mapping table: logical field name to an
//! ordered list of dotted lookup paths, evaluated against the parsed tree.
//! Missing optional fields become `Null`; only the identity fields (id,
//! creation timestamp) are mandatory.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{InstagramError, Result};
use crate::types::Record;

/// One logical field and the source paths that may carry it, in priority
/// order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldSpec {
    pub name: &'static str,
    pub paths: &'static [&'static str],
}

/// Mapping for items from the authenticated REST envelope.
pub(crate) const API_MEDIA_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "caption", paths: &["caption.text"] },
    FieldSpec { name: "likes", paths: &["likes.count"] },
    FieldSpec { name: "comments", paths: &["comments.count"] },
    FieldSpec { name: "code", paths: &["code"] },
    FieldSpec { name: "link", paths: &["link"] },
    FieldSpec {
        name: "media_url",
        paths: &["videos.standard_resolution.url", "images.standard_resolution.url"],
    },
    FieldSpec { name: "thumbnail_url", paths: &["images.thumbnail.url"] },
    FieldSpec { name: "media_type", paths: &["type"] },
    FieldSpec { name: "user_id", paths: &["user.id"] },
    FieldSpec { name: "username", paths: &["user.username"] },
    FieldSpec { name: "full_name", paths: &["user.full_name"] },
    FieldSpec { name: "tags", paths: &["tags"] },
    FieldSpec { name: "filter", paths: &["filter"] },
];

/// Mapping for items from the scraped JSON endpoints.
pub(crate) const WEB_MEDIA_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "caption", paths: &["caption.text", "caption"] },
    FieldSpec { name: "likes", paths: &["likes.count", "edge_liked_by.count"] },
    FieldSpec {
        name: "comments",
        paths: &["comments.count", "edge_media_to_comment.count"],
    },
    FieldSpec { name: "code", paths: &["code", "shortcode"] },
    FieldSpec { name: "media_url", paths: &["display_src", "display_url"] },
    FieldSpec { name: "thumbnail_url", paths: &["thumbnail_src"] },
    FieldSpec { name: "is_video", paths: &["is_video"] },
    FieldSpec { name: "user_id", paths: &["owner.id", "user.id"] },
    FieldSpec { name: "username", paths: &["owner.username", "user.username"] },
    FieldSpec { name: "full_name", paths: &["user.full_name"] },
    FieldSpec { name: "dimensions", paths: &["dimensions"] },
];

/// Paths that may carry the creation timestamp, across both shapes.
const TIMESTAMP_PATHS: &[&str] = &["created_time", "date", "taken_at_timestamp", "created_at"];

/// Walk a dotted path into a JSON tree. `None` on any missing intermediate
/// node; never coerces types.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = value;
    for key in path.split('.') {
        node = node.as_object()?.get(key)?;
    }
    Some(node)
}

/// First non-null hit across an ordered list of paths.
fn first_of<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .find_map(|path| lookup(value, path))
        .filter(|v| !v.is_null())
}

/// Creation time of a raw item as epoch seconds.
///
/// The REST envelope carries `created_time` as a decimal string; the
/// scraped shapes carry integer `date` / `taken_at_timestamp`.
pub(crate) fn item_timestamp(item: &Value) -> Option<i64> {
    let raw = first_of(item, TIMESTAMP_PATHS)?;
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Flatten a raw item into a [`Record`] using a mapping table.
///
/// # Errors
///
/// `Protocol` when the item lacks an id or a creation timestamp.
pub(crate) fn normalize(raw: &Value, table: &[FieldSpec]) -> Result<Record> {
    let id = first_of(raw, &["id"])
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| InstagramError::Protocol(format!("item without id: {raw}")))?;

    let epoch = item_timestamp(raw)
        .ok_or_else(|| InstagramError::Protocol(format!("item {id} without creation time")))?;
    let created_at: DateTime<Utc> = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| InstagramError::Protocol(format!("item {id} timestamp out of range")))?;

    let mut fields = Map::new();
    for spec in table {
        let value = first_of(raw, spec.paths).cloned().unwrap_or(Value::Null);
        fields.insert(spec.name.to_string(), value);
    }

    Ok(Record {
        id,
        created_at,
        fields,
    })
}
