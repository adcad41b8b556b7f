use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use murmur_types::api::{DirectoryGroup, DirectoryUser, UsersResponse};

pub const ORGANIZATION_GROUP: &str = "organization";

/// A user as the identity provider describes them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// Source of the mention-suggestion contact list.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Up to 100 users, most recently created first.
    async fn list_users(&self) -> Result<Vec<DirectoryEntry>>;
}

/// Queries the identity provider's backend API.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryEntry>> {
        let url = format!("{}/v1/users", self.base_url);
        let users: Vec<DirectoryEntry> = self
            .client
            .get(&url)
            .query(&[("limit", "100"), ("order_by", "-created_at")])
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .with_context(|| format!("Directory request to {} failed", url))?
            .error_for_status()?
            .json()
            .await
            .context("Directory returned an unexpected body")?;

        debug!(count = users.len(), "Fetched directory users");
        Ok(users)
    }
}

/// Fixed user list, for deployments without a directory and for tests.
#[derive(Default)]
pub struct StaticDirectory {
    users: Vec<DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new(users: Vec<DirectoryEntry>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.users.iter().take(100).cloned().collect())
    }
}

impl From<DirectoryEntry> for DirectoryUser {
    fn from(entry: DirectoryEntry) -> Self {
        let name = format!(
            "{} {}",
            entry.first_name.as_deref().unwrap_or(""),
            entry.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();

        DirectoryUser {
            user_id: entry.id,
            name: if name.is_empty() { "Anonymous".to_string() } else { name },
            email: entry
                .email_addresses
                .into_iter()
                .next()
                .map(|e| e.email_address)
                .unwrap_or_default(),
            photo_url: entry.image_url.unwrap_or_default(),
            groups: vec![ORGANIZATION_GROUP.to_string()],
        }
    }
}

/// Wrap directory entries in the contact-list shape, with every user in the
/// single organization group.
pub fn users_response(entries: Vec<DirectoryEntry>) -> UsersResponse {
    UsersResponse {
        users: entries.into_iter().map(DirectoryUser::from).collect(),
        groups: vec![DirectoryGroup {
            id: ORGANIZATION_GROUP.to_string(),
            name: "Organization".to_string(),
            description: "All users in the organization".to_string(),
        }],
    }
}
