//! Instagram fetch pipeline.
//!
//! Retrieves posts, hashtag feeds and comments through two parallel access
//! paths: the token-authenticated REST API ([`ApiClient`]) and the
//! unauthenticated page-scraping interface ([`WebClient`]). Both paths share
//! one engine: cursor-based pagination, a rate-limit cooldown that is never
//! visible to the caller, and normalization of the heterogeneous JSON
//! payloads into a stable [`Record`] shape with client-side date filtering
//! and result-count truncation.
//!
//! ```no_run
//! use instagram_client::{ApiClient, ApiConfig, FetchQuery};
//!
//! # async fn run() -> Result<(), instagram_client::InstagramError> {
//! let config = ApiConfig {
//!     access_token: "token".into(),
//!     ..Default::default()
//! };
//! let client = ApiClient::new(&config)?;
//!
//! let query = FetchQuery::new().count(5).since("20240101000000");
//! let media = client.get_by_user(Some("nasa"), &query).await?;
//! for record in media {
//!     println!("{} {}", record.created_at, record.id);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod extract;
mod oauth;
mod paginate;
mod response;
mod types;
mod web;

pub use client::ApiClient;
pub use config::{ApiConfig, Pacing, WebConfig};
pub use error::{InstagramError, Result};
pub use oauth::{OAuthFlow, SCOPES};
pub use types::{Cursor, FetchQuery, Record, TagCount};
pub use web::WebClient;
