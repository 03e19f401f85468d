use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::GithubHandle;

/// Which entity collections an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SyncTarget {
    Users,
    Repos,
    Contributions,
    All,
}

impl SyncTarget {
    pub fn includes(self, other: SyncTarget) -> bool {
        self == SyncTarget::All || self == other
    }
}

/// Resume cursor for the profile search loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSyncState {
    pub last_sync: Option<DateTime<Utc>>,
    /// Index into the fixed location-query list.
    pub current_query: usize,
    pub current_page: u32,
    pub total_fetched: u64,
    pub complete: bool,
}

impl Default for ProfileSyncState {
    fn default() -> Self {
        Self {
            last_sync: None,
            current_query: 0,
            current_page: 1,
            total_fetched: 0,
            complete: false,
        }
    }
}

/// Resume cursor for the per-profile repository loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoSyncState {
    pub last_sync: Option<DateTime<Utc>>,
    pub users_processed: BTreeSet<GithubHandle>,
    /// Next unprocessed position in the ordered profile list.
    pub current_user_index: usize,
    pub total_fetched: u64,
    pub complete: bool,
}

/// Resume cursor for the per-profile contribution loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionSyncState {
    pub last_sync: Option<DateTime<Utc>>,
    pub users_processed: BTreeSet<GithubHandle>,
    pub current_user_index: usize,
    pub complete: bool,
}

/// One progress record per entity type. Persisted as a single file so a
/// checkpoint flushes all cursors together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub users: ProfileSyncState,
    #[serde(default)]
    pub repos: RepoSyncState,
    #[serde(default)]
    pub contributions: ContributionSyncState,
}
