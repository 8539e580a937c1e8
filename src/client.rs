//! Token-authenticated REST client.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::{ApiConfig, Pacing};
use crate::error::{InstagramError, Result};
use crate::extract::{normalize, API_MEDIA_FIELDS};
use crate::oauth::OAuthFlow;
use crate::paginate::{drive, DriveOptions};
use crate::response::{api_page, classify_api, Classification};
use crate::types::{Cursor, FetchQuery, Page, Record, TagCount};

/// Count applied to a hashtag query that sets none, matching the remote
/// default for that path.
const DEFAULT_HASHTAG_COUNT: usize = 20;

/// Client for the token-authenticated endpoint family.
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    api_url: String,
    access_token: String,
    pacing: Pacing,
}

impl ApiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// `Authentication` when the configured token is empty. No network
    /// access happens here.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.access_token.is_empty() {
            return Err(InstagramError::Authentication(
                "an access token is required before any request".into(),
            ));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("instagram-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            pacing: config.pacing.clone(),
        })
    }

    /// Create a client from a completed authorization flow, resolving the
    /// provider's token at construction.
    ///
    /// # Errors
    ///
    /// `Authentication` when the flow has not produced a token yet.
    pub fn from_oauth(flow: &OAuthFlow, config: &ApiConfig) -> Result<Self> {
        let token = flow.access_token().ok_or_else(|| {
            InstagramError::Authentication("authorization flow holds no access token".into())
        })?;
        let config = ApiConfig {
            access_token: token.to_string(),
            ..config.clone()
        };
        Self::new(&config)
    }

    /// Recent media posted by a user, newest first. `None` means the user
    /// who authorized the app (`self`).
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`].
    #[instrument(skip(self, query))]
    pub async fn get_by_user(&self, user: Option<&str>, query: &FetchQuery) -> Result<Vec<Record>> {
        let user = user.unwrap_or("self");
        let first_url = self.recent_media_url(&format!("users/{user}"), query.count);
        let options = DriveOptions::from_query(query, &self.pacing)?;

        let items = drive(&options, |cursor| self.api_fetch(&first_url, cursor)).await?;
        items
            .iter()
            .map(|item| normalize(item, API_MEDIA_FIELDS))
            .collect()
    }

    /// Recent media for one or more hashtags, concatenated in tag order.
    /// The count limit applies per tag and to the final list; a query
    /// without one is capped at 20 per tag, the remote default for this
    /// path.
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`].
    #[instrument(skip(self, query))]
    pub async fn get_by_hashtag(&self, tags: &[&str], query: &FetchQuery) -> Result<Vec<Record>> {
        let per_tag = query.count.unwrap_or(DEFAULT_HASHTAG_COUNT);
        let mut options = DriveOptions::from_query(query, &self.pacing)?;
        options.limit = Some(per_tag);
        let mut all_media = Vec::new();

        for tag in tags {
            let encoded = utf8_percent_encode(tag, NON_ALPHANUMERIC).to_string();
            let first_url = self.recent_media_url(&format!("tags/{encoded}"), Some(per_tag));
            let items = drive(&options, |cursor| self.api_fetch(&first_url, cursor)).await?;
            for item in &items {
                all_media.push(normalize(item, API_MEDIA_FIELDS)?);
            }
        }

        if let Some(limit) = query.count {
            all_media.truncate(limit);
        }
        Ok(all_media)
    }

    /// Hashtags similar to `tag`, sorted by `media_count` descending, so
    /// the `top` most used come back first regardless of server order.
    ///
    /// # Errors
    ///
    /// Any taxonomy failure; see [`InstagramError`].
    #[instrument(skip(self))]
    pub async fn search_for_tag(&self, tag: &str, top: usize) -> Result<Vec<TagCount>> {
        let encoded = utf8_percent_encode(tag, NON_ALPHANUMERIC).to_string();
        let url = format!(
            "{}/tags/search?q={}&access_token={}",
            self.api_url, encoded, self.access_token
        );

        let value = self.execute(&url).await?;
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| InstagramError::Protocol(format!("tag search without data: {value}")))?;

        let mut tags: Vec<TagCount> = data
            .iter()
            .map(|entry| {
                serde_json::from_value(entry.clone()).map_err(|e| {
                    InstagramError::Protocol(format!("unexpected tag entry {entry}: {e}"))
                })
            })
            .collect::<Result<_>>()?;

        tags.sort_by(|a, b| b.media_count.cmp(&a.media_count));
        tags.truncate(top);
        Ok(tags)
    }

    fn recent_media_url(&self, subject: &str, count: Option<usize>) -> String {
        let mut url = format!(
            "{}/{subject}/media/recent/?access_token={}",
            self.api_url, self.access_token
        );
        if let Some(count) = count {
            url.push_str(&format!("&count={count}"));
        }
        url
    }

    async fn api_fetch(&self, first_url: &str, cursor: Option<Cursor>) -> Result<Page> {
        let url = match cursor {
            None => first_url.to_string(),
            Some(Cursor::Url(next)) => next,
            Some(Cursor::Token(token)) => format!("{first_url}&max_id={token}"),
        };
        let value = self.execute(&url).await?;
        api_page(&value)
    }

    /// Issue one logical request, absorbing rate limits.
    ///
    /// On a 429 the task sleeps for the configured cooldown and re-issues
    /// the identical request, with no mutation between attempts and no
    /// ceiling unless `max_cooldown_cycles` is set.
    async fn execute(&self, url: &str) -> Result<Value> {
        let mut cycles: u32 = 0;

        loop {
            debug!(url, "requesting");
            let response = self.http.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;

            match classify_api(status, &body) {
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
                        "rate limited, cooling down"
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
