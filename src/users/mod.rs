//! Local user accounts and OAuth profile persistence

pub mod store;

pub use store::JsonUserRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{value_as_identifier, AuthError, ProviderUserProfile};

/// Unique identifier for a user
pub type UserId = Uuid;

/// Paths a successful login must never bounce back to
pub const NO_RETURN_URLS: &[&str] = &["/authentication/signin", "/authentication/signup"];

/// A local user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "profileImageURL")]
    pub profile_image_url: Option<String>,
    /// Provider the account was created with
    pub provider: String,
    #[serde(default)]
    pub provider_data: Map<String, Value>,
    /// Other providers linked later, keyed by provider name
    #[serde(default)]
    pub additional_providers_data: Map<String, Value>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl User {
    /// Build a new account from a provider profile
    pub fn from_provider_profile(profile: &ProviderUserProfile, username: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            display_name: profile.display_name.clone(),
            username,
            email: profile.email.clone(),
            profile_image_url: profile.profile_image_url.clone(),
            provider: profile.provider.clone(),
            provider_data: profile.provider_data.clone(),
            additional_providers_data: Map::new(),
            created: Utc::now(),
            updated: None,
        }
    }

    /// Whether this account is linked to the given provider account, either as the
    /// main provider or as an additional one
    pub fn matches_provider_account(&self, provider: &str, field: &str, value: &str) -> bool {
        let main = self.provider == provider
            && self
                .provider_data
                .get(field)
                .and_then(value_as_identifier)
                .as_deref()
                == Some(value);

        let additional = self
            .additional_providers_data
            .get(provider)
            .and_then(|data| data.get(field))
            .and_then(value_as_identifier)
            .as_deref()
            == Some(value);

        main || additional
    }

    /// Whether the provider is linked, as main or additional provider
    pub fn has_provider(&self, provider: &str) -> bool {
        self.provider == provider || self.additional_providers_data.contains_key(provider)
    }
}

/// Extra outcome of a login, next to the user itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginInfo {
    /// Where the browser should land after the login completes
    pub redirect_to: Option<String>,
}

impl LoginInfo {
    /// Keep a requested redirect if it is a path on this site and not one of the
    /// sign-in pages
    pub fn for_redirect(redirect_to: Option<&str>) -> Self {
        let redirect_to = redirect_to
            .filter(|r| is_local_path(r) && !NO_RETURN_URLS.contains(r))
            .map(str::to_string);
        Self { redirect_to }
    }
}

/// Absolute path without a host; browsers treat `//host` and `/\host` as hosts
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

/// Persistence port for user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<User>>;

    /// Find the user linked to a provider account
    async fn find_by_provider_account(
        &self,
        provider: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<User>>;

    async fn username_taken(&self, username: &str) -> Result<bool>;

    async fn insert(&self, user: User) -> Result<User>;

    async fn update(&self, user: User) -> Result<User>;
}

/// Find a free username derived from `possible`
///
/// Tries `possible` first, then `possible1`, `possible2`, ... An empty base becomes
/// "user".
pub async fn find_unique_username(repo: &dyn UserRepository, possible: &str) -> Result<String> {
    let base: String = possible
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let base = if base.is_empty() {
        "user".to_string()
    } else {
        base
    };

    if !repo.username_taken(&base).await? {
        return Ok(base);
    }

    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}{}", base, suffix);
        if !repo.username_taken(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn storage(e: anyhow::Error) -> AuthError {
    AuthError::Storage(format!("{:#}", e))
}

/// Create, find or link the local user for a provider profile
///
/// Without a signed-in user the provider account either resolves to its existing
/// user or a new user is created. With a signed-in user the provider is linked to
/// that user, unless the provider account already belongs to someone or the user
/// already has an account of that provider.
pub async fn save_oauth_user_profile(
    repo: &dyn UserRepository,
    current_user: Option<&User>,
    profile: ProviderUserProfile,
    redirect_to: Option<&str>,
) -> Result<(User, LoginInfo), AuthError> {
    let info = LoginInfo::for_redirect(redirect_to);

    let identifier = profile.provider_identifier().ok_or_else(|| {
        AuthError::Profile(format!(
            "missing {} in {} provider data",
            profile.provider_identifier_field, profile.provider
        ))
    })?;

    let existing = repo
        .find_by_provider_account(
            &profile.provider,
            &profile.provider_identifier_field,
            &identifier,
        )
        .await
        .map_err(storage)?;

    match current_user {
        None => {
            if let Some(user) = existing {
                debug!(user_id = %user.id, provider = %profile.provider, "Existing user signed in");
                return Ok((user, info));
            }

            let possible = profile
                .username
                .clone()
                .or_else(|| {
                    profile
                        .email
                        .as_deref()
                        .and_then(|e| e.split('@').next())
                        .map(str::to_string)
                })
                .unwrap_or_default();
            let username = find_unique_username(repo, &possible)
                .await
                .map_err(storage)?;

            let user = User::from_provider_profile(&profile, username);
            let user = repo.insert(user).await.map_err(storage)?;
            info!(
                user_id = %user.id,
                username = %user.username,
                provider = %user.provider,
                "Created user from provider profile"
            );
            Ok((user, info))
        }
        Some(current) => {
            if let Some(existing) = existing {
                if existing.id != current.id {
                    return Err(AuthError::AlreadyConnectedToOther);
                }
                return Err(AuthError::AlreadyConnected);
            }
            if current.has_provider(&profile.provider) {
                return Err(AuthError::AlreadyConnected);
            }

            let mut user = current.clone();
            user.additional_providers_data.insert(
                profile.provider.clone(),
                Value::Object(profile.provider_data),
            );
            user.updated = Some(Utc::now());
            let user = repo.update(user).await.map_err(storage)?;
            info!(user_id = %user.id, provider = %profile.provider, "Linked provider to user");
            Ok((user, info))
        }
    }
}
