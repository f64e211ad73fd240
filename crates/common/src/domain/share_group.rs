use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external user granted visibility through a share group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGroupUser {
    pub user_id: String,
    pub comment: Option<String>,
}

impl ShareGroupUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            comment: None,
        }
    }

    pub fn with_comment(user_id: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            comment: Some(comment.into()),
        }
    }
}

/// A company's set of external users and devices shared with them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareGroup {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub users: Vec<ShareGroupUser>,
    pub devices: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ShareGroup {
    pub fn has_device(&self, serial: &str) -> bool {
        self.devices.iter().any(|d| d == serial)
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }

    /// Remove the listed devices, returns how many were present
    pub fn remove_devices(&mut self, serials: &[String]) -> usize {
        let before = self.devices.len();
        self.devices.retain(|d| !serials.contains(d));
        before - self.devices.len()
    }

    /// Remove the listed users, returns how many were present
    pub fn remove_users(&mut self, user_ids: &[String]) -> usize {
        let before = self.users.len();
        self.users.retain(|u| !user_ids.contains(&u.user_id));
        before - self.users.len()
    }
}

/// Repository input for creating a share group with its generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShareGroupRepoInput {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub users: Vec<ShareGroupUser>,
    pub devices: Vec<String>,
}

/// Repository trait for share group storage operations
///
/// Member lists are persisted as ordered child rows and always written as a
/// whole together with the parent row.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ShareGroupRepository: Send + Sync {
    /// Create a new share group
    async fn create_group(&self, input: CreateShareGroupRepoInput) -> DomainResult<ShareGroup>;

    /// Get a share group with its members
    async fn get_group(&self, group_id: &str) -> DomainResult<Option<ShareGroup>>;

    /// Replace the stored group document with the given one
    async fn save_group(&self, group: ShareGroup) -> DomainResult<ShareGroup>;

    /// List share groups belonging to any of the companies
    async fn list_groups_by_companies(&self, company_ids: Vec<String>) -> DomainResult<Vec<ShareGroup>>;

    /// List every share group
    async fn list_all_groups(&self) -> DomainResult<Vec<ShareGroup>>;
}
