//! Google OAuth2 client.
//!
//! Thin wrapper over the three provider endpoints the sign-in flow needs.
//! Requests carry a hard timeout and are never retried; a failed exchange
//! is terminal for its request.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::Google as GoogleConfig;
use crate::error::{Result, ServerError};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPE: &str = "openid email profile";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Profile returned by the userinfo endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct GoogleProfile {
    /// Stable subject identifier.
    pub sub: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Identity provider client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    auth_url: Url,
    config: GoogleConfig,
}

impl GoogleClient {
    /// Create a new [`GoogleClient`].
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let auth_url = Url::parse(AUTH_URL).map_err(|err| {
            ServerError::internal("cannot parse authorization URL", err)
        })?;

        Ok(Self {
            http,
            auth_url,
            config,
        })
    }

    /// Authorization URL the browser is redirected to.
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPE)
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        url
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.access_token)
    }

    /// Fetch the profile behind an access token.
    pub async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<GoogleProfile> {
        let profile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(profile)
    }
}
