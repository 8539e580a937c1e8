//! Query and result types shared by both access paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque pointer to the next page of results.
///
/// The two source formats encode pagination differently: the REST API hands
/// back a complete URL, the scraped endpoints hand back a token that is
/// substituted into a templated query string. The pagination loop is agnostic
/// to which one it is carrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Complete URL for the next page (`pagination.next_url`)
    Url(String),

    /// Opaque token appended as `max_id` (last item id or `end_cursor`)
    Token(String),
}

/// One fetched page, already classified and shape-extracted.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    /// Raw items in server order
    pub items: Vec<Value>,

    /// Cursor for the next page, when one could be computed
    pub cursor: Option<Cursor>,

    /// Whether the server indicated more data exists
    pub more: bool,
}

impl Page {
    /// More data was indicated but no cursor could be derived from a
    /// non-empty page. Handled by a short randomized retry of the same
    /// page, not as an error.
    pub(crate) fn is_cursor_anomaly(&self) -> bool {
        self.more && self.cursor.is_none() && !self.items.is_empty()
    }
}

/// Immutable parameters of one logical fetch.
///
/// Dates are fixed-format `YYYYMMDDHHMMSS` strings and are validated before
/// any request goes out.
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    /// Maximum number of records to return
    pub count: Option<usize>,

    /// Lower timestamp bound. Items are assumed delivered newest-first, so
    /// the first item older than this terminates pagination early.
    pub since: Option<String>,

    /// Upper timestamp bound; newer items are skipped without terminating
    pub until: Option<String>,

    /// Scraping hashtag path: read the non-paginated top-posts block only
    pub top_posts: bool,

    /// Code-lookup path: follow and merge every comment page
    pub all_comments: bool,
}

impl FetchQuery {
    /// Empty query: unbounded, no date filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the result to at most `count` records.
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Keep only items created at or after this `YYYYMMDDHHMMSS` timestamp.
    #[must_use]
    pub fn since(mut self, stamp: impl Into<String>) -> Self {
        self.since = Some(stamp.into());
        self
    }

    /// Keep only items created at or before this `YYYYMMDDHHMMSS` timestamp.
    #[must_use]
    pub fn until(mut self, stamp: impl Into<String>) -> Self {
        self.until = Some(stamp.into());
        self
    }

    /// Restrict a scraped hashtag query to the top-posts block.
    #[must_use]
    pub const fn top_posts(mut self, top: bool) -> Self {
        self.top_posts = top;
        self
    }

    /// Fetch every comment page on a code lookup.
    #[must_use]
    pub const fn all_comments(mut self, all: bool) -> Self {
        self.all_comments = all;
        self
    }
}

/// Normalized item record.
///
/// `id` and `created_at` are mandatory in every source shape; everything
/// else lives in `fields` under logical names, `Null` when the source did
/// not carry the field.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// Item id
    pub id: String,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Flattened logical fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Look up a logical field. `None` when absent or null.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Look up a logical field as a string.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

/// Tag-search result: a hashtag and how many media items carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    /// Tag name, without the leading `#`
    pub name: String,

    /// Number of media items tagged with it
    pub media_count: u64,
}
