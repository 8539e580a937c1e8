//! Response interpretation.
//!
//! The two source formats disagree on status-code conventions and pagination
//! encoding. This module is the single seam that absorbs that heterogeneity:
//! everything downstream sees only the five-way [`Classification`] and the
//! already-extracted [`Page`], never raw HTTP.

use serde_json::Value;

use crate::error::{InstagramError, Result};
use crate::extract::lookup;
use crate::types::{Cursor, Page};

/// Five-way classification of a raw HTTP response.
#[derive(Debug)]
pub(crate) enum Classification {
    /// 200 with a parseable body
    Success(Value),

    /// Remote asked us to back off; absorbed by the cooldown loop
    RateLimited,

    /// Remote rejected the request, with its error message
    BadRequest(String),

    /// Resource absent (HTML document where JSON was expected)
    NotFound,

    /// Body failed to parse as structured data, carries the raw text
    Malformed(String),
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with("<!DOCTYPE html>") || head.starts_with("<html")
}

/// Classify a response from the authenticated REST API.
///
/// 429 is the documented rate-limit signal; 400 carries a message under
/// `meta.error_message`.
pub(crate) fn classify_api(status: u16, body: &str) -> Classification {
    match status {
        429 => Classification::RateLimited,
        400 => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| lookup(&v, "meta.error_message").cloned())
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| body.to_string());
            Classification::BadRequest(message)
        }
        200 => match serde_json::from_str::<Value>(body) {
            Ok(value) => Classification::Success(value),
            Err(_) if looks_like_html(body) => Classification::NotFound,
            Err(_) => Classification::Malformed(body.to_string()),
        },
        _ if looks_like_html(body) => Classification::NotFound,
        _ => Classification::Malformed(format!("unexpected status {status}: {body}")),
    }
}

/// Classify a response from the scraping endpoints.
///
/// The scraped site signals soft blocks with non-200 statuses and HTML
/// bodies rather than 429, so those are treated as rate limiting. An HTML
/// document on a 200 means the resource does not exist.
pub(crate) fn classify_web(status: u16, body: &str) -> Classification {
    if status == 200 {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Classification::Success(value),
            Err(_) if looks_like_html(body) => Classification::NotFound,
            Err(_) => Classification::Malformed(body.to_string()),
        }
    } else {
        Classification::RateLimited
    }
}

/// Extract a page from the REST envelope `{ data, pagination: { next_url } }`.
pub(crate) fn api_page(value: &Value) -> Result<Page> {
    let items = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| InstagramError::Protocol(format!("envelope without data field: {value}")))?
        .clone();

    let cursor = lookup(value, "pagination.next_url")
        .and_then(Value::as_str)
        .map(|url| Cursor::Url(url.to_string()));

    Ok(Page {
        more: cursor.is_some(),
        items,
        cursor,
    })
}

/// Extract a page from the scraped user feed
/// `{ status, items, more_available }`.
pub(crate) fn feed_page(value: &Value) -> Result<Page> {
    if value.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(InstagramError::Protocol(format!("feed status not ok: {value}")));
    }

    let items = value
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| InstagramError::Protocol(format!("feed without items field: {value}")))?
        .clone();

    let more = value
        .get("more_available")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // Next page keys off the last item's id; its absence while more data is
    // available is the cursor anomaly the driver retries.
    let cursor = items
        .last()
        .and_then(|item| item.get("id"))
        .and_then(Value::as_str)
        .map(|id| Cursor::Token(id.to_string()));

    Ok(Page { items, cursor, more })
}

/// Extract a page from the scraped hashtag document
/// `{ tag: { top_posts: { nodes }, media: { nodes, page_info } } }`.
///
/// The top-posts block is not paginated; selecting it yields a single
/// terminal page.
pub(crate) fn tag_page(value: &Value, top_posts: bool) -> Result<Page> {
    if top_posts {
        let items = lookup(value, "tag.top_posts.nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                InstagramError::Protocol(format!("tag document without top_posts nodes: {value}"))
            })?
            .clone();
        return Ok(Page {
            items,
            cursor: None,
            more: false,
        });
    }

    let items = lookup(value, "tag.media.nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            InstagramError::Protocol(format!("tag document without media nodes: {value}"))
        })?
        .clone();

    let more = lookup(value, "tag.media.page_info.has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let cursor = lookup(value, "tag.media.page_info.end_cursor")
        .and_then(Value::as_str)
        .map(|token| Cursor::Token(token.to_string()));

    Ok(Page { items, cursor, more })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_200_with_data_is_success() {
        let body = r#"{"data": [{"id": "1"}], "pagination": {}}"#;
        assert!(matches!(classify_api(200, body), Classification::Success(_)));
    }

    #[test]
    fn api_429_is_rate_limited() {
        assert!(matches!(classify_api(429, ""), Classification::RateLimited));
    }

    #[test]
    fn api_400_extracts_error_message() {
        let body = r#"{"meta": {"error_message": "invalid token"}}"#;
        match classify_api(400, body) {
            Classification::BadRequest(msg) => assert_eq!(msg, "invalid token"),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn api_html_body_is_not_found() {
        let body = "<!DOCTYPE html>\n<html><body>nope</body></html>";
        assert!(matches!(classify_api(200, body), Classification::NotFound));
        assert!(matches!(classify_api(404, body), Classification::NotFound));
    }

    #[test]
    fn api_garbage_is_malformed() {
        assert!(matches!(
            classify_api(200, "not json at all"),
            Classification::Malformed(_)
        ));
    }

    #[test]
    fn web_non_200_is_soft_block() {
        assert!(matches!(classify_web(403, "<html>blocked</html>"), Classification::RateLimited));
        assert!(matches!(classify_web(500, ""), Classification::RateLimited));
    }

    #[test]
    fn web_200_html_is_not_found() {
        assert!(matches!(
            classify_web(200, "<!DOCTYPE html><html></html>"),
            Classification::NotFound
        ));
    }

    #[test]
    fn api_page_reads_next_url() {
        let value = json!({
            "data": [{"id": "1"}, {"id": "2"}],
            "pagination": {"next_url": "https://api/next"}
        });
        let page = api_page(&value).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.cursor, Some(Cursor::Url("https://api/next".into())));
        assert!(page.more);
    }

    #[test]
    fn api_page_without_pagination_is_terminal() {
        let value = json!({"data": []});
        let page = api_page(&value).unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursor.is_none());
        assert!(!page.more);
    }

    #[test]
    fn api_page_without_data_is_protocol_error() {
        let value = json!({"pagination": {}});
        assert!(matches!(api_page(&value), Err(InstagramError::Protocol(_))));
    }

    #[test]
    fn feed_page_cursor_is_last_item_id() {
        let value = json!({
            "status": "ok",
            "items": [{"id": "a"}, {"id": "b"}],
            "more_available": true
        });
        let page = feed_page(&value).unwrap();
        assert_eq!(page.cursor, Some(Cursor::Token("b".into())));
        assert!(page.more);
    }

    #[test]
    fn feed_page_missing_last_id_is_anomaly() {
        let value = json!({
            "status": "ok",
            "items": [{"id": "a"}, {"no_id": true}],
            "more_available": true
        });
        let page = feed_page(&value).unwrap();
        assert!(page.is_cursor_anomaly());
    }

    #[test]
    fn feed_page_bad_status_is_protocol_error() {
        let value = json!({"status": "fail", "items": []});
        assert!(matches!(feed_page(&value), Err(InstagramError::Protocol(_))));
    }

    #[test]
    fn tag_page_paginates_media_nodes() {
        let value = json!({
            "tag": {
                "top_posts": {"nodes": [{"id": "t"}]},
                "media": {
                    "nodes": [{"id": "m1"}, {"id": "m2"}],
                    "page_info": {"has_next_page": true, "end_cursor": "XYZ"}
                }
            }
        });
        let page = tag_page(&value, false).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.cursor, Some(Cursor::Token("XYZ".into())));
        assert!(page.more);

        let top = tag_page(&value, true).unwrap();
        assert_eq!(top.items.len(), 1);
        assert!(!top.more);
        assert!(top.cursor.is_none());
    }
}
