use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::GithubHandle;

/// One developer identity as stored locally. The numeric `id` is the merge
/// key; every other field is overwritten on re-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub login: GithubHandle,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub company: Option<String>,
    pub blog: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub public_repos: u32,
    #[serde(default)]
    pub public_gists: u32,
    #[serde(default)]
    pub followers: u32,
    #[serde(default)]
    pub following: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// When this local copy was last refreshed from the API.
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl Profile {
    /// Field-level merge: every incoming field overwrites the stored one.
    /// The identity key is kept from the existing record.
    pub fn merge_from(&mut self, incoming: Profile) {
        let id = self.id;
        *self = incoming;
        self.id = id;
    }

    /// A profile is stale once its local copy is older than `max_age`.
    /// Profiles that were never refreshed are always stale.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_refreshed {
            Some(refreshed) => now - refreshed > max_age,
            None => true,
        }
    }
}
