//! Third-party login strategies
//!
//! A strategy knows how to send a user to its provider and how to turn the
//! provider's callback into a [`ProviderUserProfile`]. Persisting that profile is
//! the job of [`crate::users::save_oauth_user_profile`].

pub mod linkedin;

pub use linkedin::{LinkedInProfile, LinkedInStrategy};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors surfaced by login strategies and profile persistence
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} login is not configured")]
    NotConfigured(&'static str),

    #[error("request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to obtain access token: {0}")]
    TokenExchange(String),

    #[error("invalid provider profile: {0}")]
    Profile(String),

    #[error("invalid or expired login state")]
    InvalidState,

    #[error("Account is already connected to another user")]
    AlreadyConnectedToOther,

    #[error("User is already connected using this provider")]
    AlreadyConnected,

    #[error("user storage failed: {0}")]
    Storage(String),
}

/// Local shape of an external provider profile, handed to the user store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUserProfile {
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "profileImageURL")]
    pub profile_image_url: Option<String>,
    pub provider: String,
    /// Key inside `provider_data` that identifies the account at the provider
    pub provider_identifier_field: String,
    /// Raw provider payload plus the OAuth tokens
    pub provider_data: Map<String, Value>,
}

impl ProviderUserProfile {
    /// The provider-side account id, rendered as a string
    pub fn provider_identifier(&self) -> Option<String> {
        self.provider_data
            .get(&self.provider_identifier_field)
            .and_then(value_as_identifier)
    }
}

/// Strings are taken as-is, numbers are stringified, anything else is not an id
pub(crate) fn value_as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A pluggable login provider
#[async_trait]
pub trait OAuthStrategy: Send + Sync {
    /// Route name, e.g. "linkedin"
    fn name(&self) -> &'static str;

    /// URL the browser is redirected to in order to start the login
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange the callback code and build the local profile
    async fn authenticate(&self, code: &str) -> Result<ProviderUserProfile, AuthError>;
}

/// Strategies available to the auth routes, keyed by name
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn OAuthStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any previous one with the same name
    pub fn register(&mut self, strategy: Arc<dyn OAuthStrategy>) {
        tracing::debug!(strategy = strategy.name(), "Registered login strategy");
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeStrategy;

    #[async_trait]
    impl OAuthStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
            Ok(format!("https://fake.example/auth?state={}", state))
        }

        async fn authenticate(&self, _code: &str) -> Result<ProviderUserProfile, AuthError> {
            Err(AuthError::TokenExchange("nope".to_string()))
        }
    }

    fn profile_with(data: Value) -> ProviderUserProfile {
        ProviderUserProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            display_name: "Ada Lovelace".to_string(),
            email: None,
            username: None,
            profile_image_url: None,
            provider: "fake".to_string(),
            provider_identifier_field: "id".to_string(),
            provider_data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_provider_identifier_string() {
        let profile = profile_with(json!({"id": "abc"}));
        assert_eq!(profile.provider_identifier(), Some("abc".to_string()));
    }

    #[test]
    fn test_provider_identifier_number() {
        let profile = profile_with(json!({"id": 42}));
        assert_eq!(profile.provider_identifier(), Some("42".to_string()));
    }

    #[test]
    fn test_provider_identifier_missing() {
        assert_eq!(profile_with(json!({})).provider_identifier(), None);
        assert_eq!(profile_with(json!({"id": ""})).provider_identifier(), None);
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let mut profile = profile_with(json!({"id": "abc"}));
        profile.profile_image_url = Some("http://img".to_string());
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["firstName"], "Ada");
        assert_eq!(value["providerIdentifierField"], "id");
        assert_eq!(value["profileImageURL"], "http://img");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(FakeStrategy));

        assert_eq!(registry.names(), vec!["fake"]);
        let strategy = registry.get("fake").unwrap();
        assert_eq!(
            strategy.authorization_url("s1").unwrap(),
            "https://fake.example/auth?state=s1"
        );
        assert!(registry.get("linkedin").is_none());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AuthError::AlreadyConnectedToOther.to_string(),
            "Account is already connected to another user"
        );
        assert_eq!(
            AuthError::NotConfigured("linkedin").to_string(),
            "linkedin login is not configured"
        );
    }
}
