//! LinkedIn login strategy
//!
//! Sends the browser to LinkedIn's authorization endpoint, exchanges the returned
//! code for an access token, fetches the member profile and maps it onto a
//! [`ProviderUserProfile`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::{value_as_identifier, AuthError, OAuthStrategy, ProviderUserProfile};
use crate::config::LinkedInConfig;

/// Provider name used in routes and stored on users
pub const PROVIDER: &str = "linkedin";

/// Profile fields requested from the people API
pub const PROFILE_FIELDS: &[&str] = &[
    "id",
    "first-name",
    "last-name",
    "email-address",
    "picture-url",
];

/// Permissions requested at authorization time
pub const SCOPE: &[&str] = &["r_basicprofile", "r_emailaddress"];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Given and family name as reported by LinkedIn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileName {
    pub given_name: String,
    pub family_name: String,
}

/// Normalised LinkedIn member profile
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedInProfile {
    pub id: String,
    pub name: ProfileName,
    pub display_name: String,
    pub emails: Vec<String>,
    /// LinkedIn has no username concept; kept for the common profile shape
    pub username: Option<String>,
    /// Untouched JSON body from the people API
    pub raw: Map<String, Value>,
}

impl LinkedInProfile {
    /// Parse a people API response body
    pub fn from_json(body: Value) -> Result<Self, AuthError> {
        let Value::Object(raw) = body else {
            return Err(AuthError::Profile("expected a JSON object".to_string()));
        };

        let id = raw
            .get("id")
            .and_then(value_as_identifier)
            .ok_or_else(|| AuthError::Profile("missing member id".to_string()))?;

        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let name = ProfileName {
            given_name: text("firstName"),
            family_name: text("lastName"),
        };
        let display_name = format!("{} {}", name.given_name, name.family_name)
            .trim()
            .to_string();
        let emails = raw
            .get("emailAddress")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(|e| vec![e.to_string()])
            .unwrap_or_default();

        Ok(Self {
            id,
            name,
            display_name,
            emails,
            username: None,
            raw,
        })
    }
}

/// Map a LinkedIn profile and its tokens onto the local profile shape
pub fn map_profile(
    profile: LinkedInProfile,
    access_token: &str,
    refresh_token: Option<&str>,
) -> ProviderUserProfile {
    let mut provider_data = profile.raw;
    provider_data.insert(
        "accessToken".to_string(),
        Value::String(access_token.to_string()),
    );
    if let Some(refresh_token) = refresh_token {
        provider_data.insert(
            "refreshToken".to_string(),
            Value::String(refresh_token.to_string()),
        );
    }

    let profile_image_url = provider_data
        .get("pictureUrl")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    ProviderUserProfile {
        first_name: profile.name.given_name,
        last_name: profile.name.family_name,
        display_name: profile.display_name,
        email: profile.emails.into_iter().next(),
        username: profile.username,
        profile_image_url,
        provider: PROVIDER.to_string(),
        provider_identifier_field: "id".to_string(),
        provider_data,
    }
}

/// LinkedIn OAuth 2.0 strategy
#[derive(Debug, Clone)]
pub struct LinkedInStrategy {
    config: LinkedInConfig,
    client: reqwest::Client,
}

impl LinkedInStrategy {
    /// Build the strategy; fails when the client id or secret is missing
    pub fn new(config: &LinkedInConfig) -> Result<Self, AuthError> {
        if !config.is_configured() {
            return Err(AuthError::NotConfigured(PROVIDER));
        }

        Ok(Self {
            config: config.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// People API URL with the field selector applied
    pub fn profile_request_url(&self) -> Result<Url, AuthError> {
        let raw = format!("{}:({})", self.config.profile_url, PROFILE_FIELDS.join(","));
        let mut url = Url::parse(&raw)
            .map_err(|e| AuthError::Profile(format!("bad profile URL {}: {}", raw, e)))?;
        url.query_pairs_mut().append_pair("format", "json");
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "LinkedIn token exchange rejected");
            return Err(AuthError::TokenExchange(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        debug!(expires_in = ?token.expires_in, "Obtained LinkedIn access token");
        Ok(token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<LinkedInProfile, AuthError> {
        let response = self
            .client
            .get(self.profile_request_url()?)
            .bearer_auth(access_token)
            .header("x-li-format", "json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Profile(format!(
                "people API returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        LinkedInProfile::from_json(body)
    }
}

#[async_trait]
impl OAuthStrategy for LinkedInStrategy {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let scope = SCOPE.join(" ");
        let url = Url::parse_with_params(
            &self.config.authorization_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::TokenExchange(format!("bad authorization URL: {}", e)))?;
        Ok(url.into())
    }

    async fn authenticate(&self, code: &str) -> Result<ProviderUserProfile, AuthError> {
        let token = self.exchange_code(code).await?;
        let profile = self.fetch_profile(&token.access_token).await?;
        debug!(member_id = %profile.id, "Fetched LinkedIn profile");
        Ok(map_profile(
            profile,
            &token.access_token,
            token.refresh_token.as_deref(),
        ))
    }
}
