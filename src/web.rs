//! Unauthenticated page-scraping client.
//!
//! Reads the public JSON endpoints the site exposes without a token. The
//! site does not use 429 here: blocks show up as non-200 statuses or HTML
//! bodies, and both are absorbed by the same cooldown policy as the REST
//! path.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{Pacing, WebConfig};
use crate::error::{InstagramError, Result};
use crate::extract::{lookup, normalize, WEB_MEDIA_FIELDS};
use crate::paginate::{drive, DriveOptions};
use crate::response::{classify_web, feed_page, tag_page, Classification};
use crate::types::{Cursor, FetchQuery, Page, Record};

const COMMENT_EDGE_POINTER: &str = "/graphql/shortcode_media/edge_media_to_comment";

/// Client for the scraping endpoint family. Needs no credential.
#[derive(Debug)]
pub struct WebClient {
    http: Client,
    base_url: String,
    pacing: Pacing,
}

impl WebClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// `Http` when the underlying client cannot be built.
    pub fn new(config: &WebConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("instagram-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pacing: config.pacing.clone(),
        })
    }

    /// Media posted by a user, scraped from `/{user}/media/`, newest first.
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`](crate::InstagramError).
    #[instrument(skip(self, query))]
    pub async fn get_by_user(&self, user: &str, query: &FetchQuery) -> Result<Vec<Record>> {
        let encoded = utf8_percent_encode(user, NON_ALPHANUMERIC).to_string();
        let first_url = format!("{}/{encoded}/media/", self.base_url);
        let options = DriveOptions::from_query(query, &self.pacing)?;

        let items = drive(&options, |cursor| self.feed_fetch(&first_url, cursor)).await?;

        items
            .iter()
            .map(|item| normalize(item, WEB_MEDIA_FIELDS))
            .collect()
    }

    /// Media for one or more hashtags from `/explore/tags/{tag}/?__a=1`.
    /// With [`FetchQuery::top_posts`] only the non-paginated top-posts
    /// block is read.
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`](crate::InstagramError).
    #[instrument(skip(self, query))]
    pub async fn get_by_hashtag(&self, tags: &[&str], query: &FetchQuery) -> Result<Vec<Record>> {
        let options = DriveOptions::from_query(query, &self.pacing)?;
        let mut all_media = Vec::new();

        for tag in tags {
            let encoded = utf8_percent_encode(tag, NON_ALPHANUMERIC).to_string();
            let first_url = format!("{}/explore/tags/{encoded}/?__a=1", self.base_url);
            let items = drive(&options, |cursor| {
                self.tag_fetch(&first_url, query.top_posts, cursor)
            })
            .await?;

            for item in &items {
                all_media.push(normalize(item, WEB_MEDIA_FIELDS)?);
            }
        }

        if let Some(limit) = query.count {
            all_media.truncate(limit);
        }
        Ok(all_media)
    }

    /// Full post documents for one or more shortcodes, passed through raw.
    /// With [`FetchQuery::all_comments`] every comment page is fetched and
    /// merged into the parent document before it is returned.
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`](crate::InstagramError).
    #[instrument(skip(self, query))]
    pub async fn get_by_media_codes(
        &self,
        codes: &[&str],
        query: &FetchQuery,
    ) -> Result<Vec<Value>> {
        let mut documents = Vec::with_capacity(codes.len());

        for code in codes {
            let encoded = utf8_percent_encode(code, NON_ALPHANUMERIC).to_string();
            let url = format!("{}/p/{encoded}/?__a=1", self.base_url);
            let mut document = self.execute(&url).await?;

            if document.pointer("/graphql/shortcode_media").is_none() {
                return Err(InstagramError::Protocol(format!(
                    "post document for {code} without shortcode_media"
                )));
            }

            if query.all_comments {
                self.merge_comment_pages(&url, &mut document).await?;
            }
            documents.push(document);
        }

        Ok(documents)
    }

    async fn feed_fetch(&self, first_url: &str, cursor: Option<Cursor>) -> Result<Page> {
        let value = self.execute(&paged_url(first_url, cursor)).await?;
        feed_page(&value)
    }

    async fn tag_fetch(
        &self,
        first_url: &str,
        top_posts: bool,
        cursor: Option<Cursor>,
    ) -> Result<Page> {
        let value = self.execute(&paged_url(first_url, cursor)).await?;
        tag_page(&value, top_posts)
    }

    /// Follow the nested comment-edge pagination and fold every page into
    /// the parent document. This runs independently of any outer item
    /// pagination: only the comment block's own `page_info` ends it.
    async fn merge_comment_pages(&self, url: &str, document: &mut Value) -> Result<()> {
        // Servers may leave a stale end_cursor next to has_next_page: false;
        // only page-info saying there is more data starts the walk.
        let mut token = document.pointer(COMMENT_EDGE_POINTER).and_then(|block| {
            if has_next_comment_page(block) {
                next_comment_cursor(block)
            } else {
                None
            }
        });

        while let Some(current) = token.clone() {
            let next = self.execute(&format!("{url}&max_id={current}")).await?;
            let Some(block) = next.pointer(COMMENT_EDGE_POINTER) else {
                return Err(InstagramError::Protocol(format!(
                    "comment page without edge block: {next}"
                )));
            };

            let has_next = has_next_comment_page(block);
            let end_cursor = next_comment_cursor(block);
            let edges = block
                .get("edges")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            // Same tolerance as the outer driver: more comments advertised
            // but no cursor to reach them, so refetch this page shortly.
            if has_next && end_cursor.is_none() && !edges.is_empty() {
                let delay = self.anomaly_delay();
                warn!(delay_ms = delay.as_millis(), "comment cursor missing, refetching page");
                tokio::time::sleep(delay).await;
                continue;
            }

            let Some(parent) = document.pointer_mut(COMMENT_EDGE_POINTER) else {
                return Err(InstagramError::Protocol(
                    "parent document lost its comment block".into(),
                ));
            };
            if let Some(parent_edges) = parent.get_mut("edges").and_then(Value::as_array_mut) {
                parent_edges.extend(edges);
            }
            if let (Some(parent_obj), Some(page_info)) = (parent.as_object_mut(), block.get("page_info")) {
                parent_obj.insert("page_info".into(), page_info.clone());
            }

            token = if has_next { end_cursor } else { None };
        }

        Ok(())
    }

    fn anomaly_delay(&self) -> Duration {
        let min = self.pacing.anomaly_min_secs;
        let max = self.pacing.anomaly_max_secs;
        if max <= min {
            return Duration::from_secs(min);
        }
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }

    /// Issue one logical request, absorbing soft blocks.
    ///
    /// Identical cooldown policy to the REST path; only the classification
    /// differs.
    async fn execute(&self, url: &str) -> Result<Value> {
        let mut cycles: u32 = 0;

        loop {
            debug!(url, "requesting");
            let response = self.http.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;

            match classify_web(status, &body) {
                Classification::Success(value) => return Ok(value),
                Classification::RateLimited => {
                    cycles += 1;
                    if let Some(ceiling) = self.pacing.max_cooldown_cycles {
                        if cycles > ceiling {
                            return Err(InstagramError::RateLimited { cycles: ceiling });
                        }
                    }
                    info!(
                        cycle = cycles,
                        cooldown_secs = self.pacing.cooldown_secs,
                        "soft block, cooling down"
                    );
                    tokio::time::sleep(self.pacing.cooldown()).await;
                }
                Classification::BadRequest(message) => {
                    return Err(InstagramError::Request(message));
                }
                Classification::NotFound => return Err(InstagramError::NotFound),
                Classification::Malformed(raw) => return Err(InstagramError::Protocol(raw)),
            }
        }
    }
}

/// Substitute a token cursor into the templated query string.
fn paged_url(first_url: &str, cursor: Option<Cursor>) -> String {
    match cursor {
        None => first_url.to_string(),
        Some(Cursor::Url(next)) => next,
        Some(Cursor::Token(token)) => {
            let separator = if first_url.contains('?') { '&' } else { '?' };
            format!("{first_url}{separator}max_id={token}")
        }
    }
}

fn has_next_comment_page(block: &Value) -> bool {
    lookup(block, "page_info.has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn next_comment_cursor(block: &Value) -> Option<String> {
    lookup(block, "page_info.end_cursor")
        .and_then(Value::as_str)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> WebConfig {
        WebConfig {
            base_url: server.uri(),
            pacing: Pacing {
                cooldown_secs: 0,
                max_cooldown_cycles: None,
                anomaly_min_secs: 0,
                anomaly_max_secs: 0,
            },
            ..Default::default()
        }
    }

    fn feed_item(id: &str, stamp: i64) -> Value {
        json!({
            "id": id,
            "created_time": stamp.to_string(),
            "caption": {"text": format!("feed {id}")},
            "likes": {"count": 7},
            "images": {"standard_resolution": {"url": format!("https://cdn/{id}.jpg")}}
        })
    }

    fn tag_node(id: &str, stamp: i64) -> Value {
        json!({
            "id": id,
            "date": stamp,
            "caption": format!("node {id}"),
            "display_src": format!("https://cdn/{id}.jpg"),
            "is_video": false,
            "owner": {"id": "55"}
        })
    }

    #[test]
    fn paged_url_picks_the_right_separator() {
        assert_eq!(
            paged_url("https://host/u/media/", Some(Cursor::Token("9".into()))),
            "https://host/u/media/?max_id=9"
        );
        assert_eq!(
            paged_url("https://host/explore/tags/x/?__a=1", Some(Cursor::Token("9".into()))),
            "https://host/explore/tags/x/?__a=1&max_id=9"
        );
        assert_eq!(paged_url("https://host/u/media/", None), "https://host/u/media/");
    }

    #[tokio::test]
    async fn feed_follows_max_id_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .and(query_param("max_id", "b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [feed_item("c", 580)],
                "more_available": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [feed_item("a", 600), feed_item("b", 590)],
                "more_available": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let media = client.get_by_user("nasa", &FetchQuery::new()).await.unwrap();

        assert_eq!(media.len(), 3);
        let ids: Vec<&str> = media.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(media[0].text("caption"), Some("feed a"));
    }

    #[tokio::test]
    async fn feed_anomaly_is_retried_not_failed() {
        let server = MockServer::start().await;

        // More data advertised but the last item has no id to page from.
        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [{"created_time": "600"}],
                "more_available": true
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [feed_item("a", 600)],
                "more_available": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let media = client.get_by_user("nasa", &FetchQuery::new()).await.unwrap();

        assert_eq!(media.len(), 1);
        assert_eq!(media[0].id, "a");
    }

    #[tokio::test]
    async fn soft_block_cools_down_and_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("<html>temporarily blocked</html>"),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/nasa/media/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "items": [feed_item("a", 600)],
                "more_available": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let media = client.get_by_user("nasa", &FetchQuery::new()).await.unwrap();
        assert_eq!(media.len(), 1);
    }

    #[tokio::test]
    async fn html_on_200_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/noone/media/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<!DOCTYPE html>\n<html>Sorry, this page isn't available.</html>"),
            )
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let err = client
            .get_by_user("noone", &FetchQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstagramError::NotFound));
    }

    #[tokio::test]
    async fn tag_feed_follows_end_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/explore/tags/mfw/"))
            .and(query_param("max_id", "CUR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag": {
                    "media": {
                        "nodes": [tag_node("3", 580)],
                        "page_info": {"has_next_page": false, "end_cursor": null}
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/explore/tags/mfw/"))
            .and(query_param("__a", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag": {
                    "media": {
                        "nodes": [tag_node("1", 600), tag_node("2", 590)],
                        "page_info": {"has_next_page": true, "end_cursor": "CUR"}
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let media = client
            .get_by_hashtag(&["mfw"], &FetchQuery::new())
            .await
            .unwrap();

        assert_eq!(media.len(), 3);
        assert_eq!(media[2].text("caption"), Some("node 3"));
        assert_eq!(media[2].get("user_id"), Some(&json!("55")));
    }

    #[tokio::test]
    async fn top_posts_block_is_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/explore/tags/mfw/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag": {
                    "top_posts": {"nodes": [tag_node("t1", 600), tag_node("t2", 590)]},
                    "media": {
                        "nodes": [tag_node("m1", 580)],
                        "page_info": {"has_next_page": true, "end_cursor": "CUR"}
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let query = FetchQuery::new().top_posts(true);
        let media = client.get_by_hashtag(&["mfw"], &query).await.unwrap();

        let ids: Vec<&str> = media.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2"]);
    }

    #[tokio::test]
    async fn code_lookup_is_structurally_idempotent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/p/BQ1234/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {
                    "shortcode_media": {
                        "id": "777",
                        "shortcode": "BQ1234",
                        "taken_at_timestamp": 1_500_000_000,
                        "edge_media_to_comment": {
                            "edges": [{"node": {"id": "c1", "text": "first"}}],
                            "page_info": {"has_next_page": false, "end_cursor": null}
                        }
                    }
                }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let first = client
            .get_by_media_codes(&["BQ1234"], &FetchQuery::new())
            .await
            .unwrap();
        let second = client
            .get_by_media_codes(&["BQ1234"], &FetchQuery::new())
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn all_comments_merges_nested_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/p/BQ1234/"))
            .and(query_param("max_id", "CUR1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {
                    "shortcode_media": {
                        "id": "777",
                        "edge_media_to_comment": {
                            "edges": [{"node": {"id": "c2"}}, {"node": {"id": "c3"}}],
                            "page_info": {"has_next_page": false, "end_cursor": null}
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/p/BQ1234/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {
                    "shortcode_media": {
                        "id": "777",
                        "taken_at_timestamp": 1_500_000_000,
                        "edge_media_to_comment": {
                            "edges": [{"node": {"id": "c1"}}],
                            "page_info": {"has_next_page": true, "end_cursor": "CUR1"}
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let query = FetchQuery::new().all_comments(true);
        let documents = client.get_by_media_codes(&["BQ1234"], &query).await.unwrap();

        let block = documents[0]
            .pointer("/graphql/shortcode_media/edge_media_to_comment")
            .unwrap();
        let ids: Vec<&str> = block["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["node"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(block["page_info"]["has_next_page"], json!(false));
    }

    #[tokio::test]
    async fn stale_end_cursor_without_next_page_is_ignored() {
        let server = MockServer::start().await;

        // A refetch with the stale cursor would duplicate c1.
        Mock::given(method("GET"))
            .and(path("/p/BQ1234/"))
            .and(query_param("max_id", "STALE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {
                    "shortcode_media": {
                        "id": "777",
                        "edge_media_to_comment": {
                            "edges": [{"node": {"id": "c1"}}],
                            "page_info": {"has_next_page": false, "end_cursor": "STALE"}
                        }
                    }
                }
            })))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/p/BQ1234/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {
                    "shortcode_media": {
                        "id": "777",
                        "taken_at_timestamp": 1_500_000_000,
                        "edge_media_to_comment": {
                            "edges": [{"node": {"id": "c1"}}],
                            "page_info": {"has_next_page": false, "end_cursor": "STALE"}
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let query = FetchQuery::new().all_comments(true);
        let documents = client.get_by_media_codes(&["BQ1234"], &query).await.unwrap();

        let edges = documents[0]
            .pointer("/graphql/shortcode_media/edge_media_to_comment/edges")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["node"]["id"], json!("c1"));
    }

    #[tokio::test]
    async fn missing_shortcode_media_is_protocol_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/p/BROKEN/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"graphql": {}})))
            .mount(&server)
            .await;

        let client = WebClient::new(&test_config(&server)).unwrap();
        let err = client
            .get_by_media_codes(&["BROKEN"], &FetchQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstagramError::Protocol(_)));
    }
}
