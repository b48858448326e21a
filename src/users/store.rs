//! User persistence
//!
//! Keeps users in memory and, when backed by a file, writes the full set to a
//! JSON file after every change. A change only becomes visible once it is on disk.

use super::{User, UserId, UserRepository};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Serializable format for the user store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    users: Vec<User>,
}

/// User repository backed by a JSON file
#[derive(Debug)]
pub struct JsonUserRepository {
    /// All users indexed by ID
    users: RwLock<HashMap<UserId, User>>,
    /// Path to the users.json file; `None` keeps everything in memory
    store_path: Option<PathBuf>,
}

impl JsonUserRepository {
    /// Create an empty repository that never touches disk
    pub fn in_memory() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            store_path: None,
        }
    }

    /// Load the repository from a specific path, empty if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let users = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read users file")?;
            let data: StoreData =
                serde_json::from_str(&content).context("Failed to parse users file")?;
            data.users.into_iter().map(|u| (u.id, u)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            users: RwLock::new(users),
            store_path: Some(path.to_path_buf()),
        })
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, users: &HashMap<UserId, User>) -> Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create directory for users file")?;
        }

        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by_key(|u| u.created);
        let content = serde_json::to_string_pretty(&StoreData { users: list })
            .context("Failed to serialize users")?;

        tokio::fs::write(path, content)
            .await
            .context("Failed to write users file")?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for JsonUserRepository {
    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_provider_account(
        &self,
        provider: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.matches_provider_account(provider, field, value))
            .cloned())
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|u| u.username == username))
    }

    async fn insert(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            bail!("Username '{}' is already taken", user.username);
        }
        let mut next = users.clone();
        next.insert(user.id, user.clone());
        self.persist(&next).await?;
        *users = next;
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            bail!("User {} does not exist", user.id);
        }
        let mut next = users.clone();
        next.insert(user.id, user.clone());
        self.persist(&next).await?;
        *users = next;
        Ok(user)
    }
}
