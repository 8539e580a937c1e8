//! Authorization-code flow.
//!
//! External collaborator of the fetch core: builds the URL a user visits to
//! authorize the app, and exchanges the one-time code from the redirect for
//! an access token. The resulting token (or the flow itself, as a token
//! provider) feeds [`ApiClient`](crate::ApiClient) construction.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{InstagramError, Result};

/// Scopes the authorization endpoint accepts.
pub const SCOPES: &[&str] = &[
    "basic",
    "public_content",
    "follower_list",
    "comments",
    "relationships",
    "likes",
];

const DEFAULT_OAUTH_URL: &str = "https://api.instagram.com/oauth";

/// Authorization-code flow state.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    oauth_url: String,
    access_token: Option<String>,
    http: Client,
}

impl OAuthFlow {
    /// Create a flow with the default `basic` scope.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec!["basic".into()],
            oauth_url: DEFAULT_OAUTH_URL.into(),
            access_token: None,
            http: Client::new(),
        }
    }

    /// Replace the requested scopes.
    ///
    /// # Errors
    ///
    /// `Validation` when any scope is not in [`SCOPES`].
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        for scope in &scopes {
            if !SCOPES.contains(&scope.as_str()) {
                return Err(InstagramError::Validation(format!("unknown scope {scope}")));
            }
        }
        self.scopes = scopes;
        Ok(self)
    }

    /// Point the flow at a different OAuth base URL.
    #[must_use]
    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into();
        self
    }

    /// Token obtained by a previous [`exchange_code`](Self::exchange_code),
    /// if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Build the URL a user visits to authorize the app. The redirect back
    /// carries `?code=...`, the argument to [`exchange_code`](Self::exchange_code).
    ///
    /// # Errors
    ///
    /// `Validation` when client id or redirect URI is empty.
    pub fn authorization_url(&self) -> Result<String> {
        if self.client_id.is_empty() || self.redirect_uri.is_empty() {
            return Err(InstagramError::Validation(
                "authorization URL needs a client id and a redirect URI".into(),
            ));
        }
        Ok(format!(
            "{}/authorize/?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.oauth_url,
            self.client_id,
            utf8_percent_encode(&self.redirect_uri, NON_ALPHANUMERIC),
            self.scopes.join("+"),
        ))
    }

    /// Exchange a one-time authorization code for an access token.
    ///
    /// # Errors
    ///
    /// `Authentication` when the response carries no token, with the raw
    /// body for diagnosis; `Http` on transport failure.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&mut self, code: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ];

        let response = self
            .http
            .post(format!("{}/access_token", self.oauth_url))
            .timeout(Duration::from_secs(30))
            .form(&form)
            .send()
            .await?;

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| InstagramError::Authentication(format!("token exchange failed: {body}")))?;

        debug!("access token obtained");
        self.access_token = Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }
}
