use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GithubHandle;

/// One remote repository. `owner_id`/`owner_login` are a back-reference to
/// the profile the repository was discovered through, not an ownership
/// relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner_id: u64,
    pub owner_login: GithubHandle,
    pub description: Option<String>,
    pub fork: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    #[serde(default)]
    pub open_issues_count: u32,
    pub language: Option<String>,
    /// Language name to byte count, from the batched detail query.
    #[serde(default)]
    pub languages_breakdown: BTreeMap<String, u64>,
    /// Commit count on the default branch. Absent when the detail query
    /// failed for this repository's batch.
    #[serde(default)]
    pub commit_count: Option<u64>,
    pub visibility: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl Repository {
    /// Field-level merge keyed by `id`; incoming overwrites existing.
    pub fn merge_from(&mut self, incoming: Repository) {
        let id = self.id;
        *self = incoming;
        self.id = id;
    }

    /// Whether the repository's last push falls at or after `cutoff`.
    /// Repositories without a push timestamp never qualify.
    pub fn pushed_on_or_after(&self, cutoff: DateTime<Utc>) -> bool {
        self.pushed_at.map(|pushed| pushed >= cutoff).unwrap_or(false)
    }
}
