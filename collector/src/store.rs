use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use shared::{
    ContributionSummary, GithubHandle, Profile, Repository, SyncState, SyncTarget,
};

const STATE_FILE: &str = "sync_state.json";
const USERS_FILE: &str = "users.json";
const REPOS_FILE: &str = "repos.json";
const CONTRIBUTIONS_FILE: &str = "contributions.json";

/// Counts merged with the current progress records, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub users_count: usize,
    pub repos_count: usize,
    pub original_repos_count: usize,
    pub forked_repos_count: usize,
    pub contributions_count: usize,
    pub state: SyncState,
}

/// Single source of truth for the three entity collections and their
/// progress records, backed by independently loadable JSON files. The
/// store is the only writer for the lifetime of the process.
pub struct SyncStore {
    data_dir: PathBuf,
    state: SyncState,
    profiles: BTreeMap<u64, Profile>,
    repos: BTreeMap<u64, Repository>,
    contributions: BTreeMap<GithubHandle, ContributionSummary>,
}

/// A missing or corrupt backing file yields an empty default so one bad
/// collection never blocks the others; the synchronizers re-fetch
/// idempotently.
fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return T::default(),
    };
    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), "corrupt data file, starting empty: {err}");
            T::default()
        }
    }
}

impl SyncStore {
    pub fn load(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        Ok(Self {
            state: load_or_default(&data_dir.join(STATE_FILE)),
            profiles: load_or_default(&data_dir.join(USERS_FILE)),
            repos: load_or_default(&data_dir.join(REPOS_FILE)),
            contributions: load_or_default(&data_dir.join(CONTRIBUTIONS_FILE)),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create data dir {}", self.data_dir.display()))?;
        let path = self.data_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn save_state(&self) -> anyhow::Result<()> {
        self.write_file(STATE_FILE, &self.state)
    }

    pub fn save_profiles(&self) -> anyhow::Result<()> {
        self.write_file(USERS_FILE, &self.profiles)
    }

    pub fn save_repos(&self) -> anyhow::Result<()> {
        self.write_file(REPOS_FILE, &self.repos)
    }

    pub fn save_contributions(&self) -> anyhow::Result<()> {
        self.write_file(CONTRIBUTIONS_FILE, &self.contributions)
    }

    pub fn save_all(&self) -> anyhow::Result<()> {
        self.save_state()?;
        self.save_profiles()?;
        self.save_repos()?;
        self.save_contributions()
    }

    /// Merge by identity key, stamping the local refresh marker.
    pub fn upsert_profile(&mut self, mut incoming: Profile) {
        incoming.last_refreshed = Some(Utc::now());
        match self.profiles.get_mut(&incoming.id) {
            Some(existing) => existing.merge_from(incoming),
            None => {
                self.profiles.insert(incoming.id, incoming);
            }
        }
    }

    pub fn upsert_repository(&mut self, mut incoming: Repository) {
        incoming.last_refreshed = Some(Utc::now());
        match self.repos.get_mut(&incoming.id) {
            Some(existing) => existing.merge_from(incoming),
            None => {
                self.repos.insert(incoming.id, incoming);
            }
        }
    }

    /// Contribution summaries are replaced wholesale, never merged.
    pub fn upsert_contribution(&mut self, mut incoming: ContributionSummary) {
        incoming.last_refreshed = Some(Utc::now());
        self.contributions.insert(incoming.login.clone(), incoming);
    }

    pub fn profile(&self, id: u64) -> Option<&Profile> {
        self.profiles.get(&id)
    }

    pub fn profile_by_login(&self, login: &str) -> Option<&Profile> {
        self.profiles.values().find(|p| p.login == login)
    }

    /// All profiles in stable ascending-id order. This order defines the
    /// repository and contribution work lists, so resume cursors stay
    /// valid across runs.
    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repos.values()
    }

    pub fn original_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repos.values().filter(|r| !r.fork)
    }

    pub fn forked_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repos.values().filter(|r| r.fork)
    }

    pub fn repositories_for<'a>(
        &'a self,
        login: &'a str,
    ) -> impl Iterator<Item = &'a Repository> {
        self.repos.values().filter(move |r| r.owner_login == login)
    }

    pub fn repo_count(&self) -> usize {
        self.repos.len()
    }

    pub fn contribution(&self, login: &str) -> Option<&ContributionSummary> {
        self.contributions.get(login)
    }

    pub fn contributions(&self) -> impl Iterator<Item = &ContributionSummary> {
        self.contributions.values()
    }

    pub fn contribution_count(&self) -> usize {
        self.contributions.len()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SyncState {
        &mut self.state
    }

    /// Clear the targeted collections and their progress records back to
    /// defaults and persist immediately. Idempotent.
    pub fn reset(&mut self, target: SyncTarget) -> anyhow::Result<()> {
        if target.includes(SyncTarget::Users) {
            self.state.users = Default::default();
            self.profiles.clear();
        }
        if target.includes(SyncTarget::Repos) {
            self.state.repos = Default::default();
            self.repos.clear();
        }
        if target.includes(SyncTarget::Contributions) {
            self.state.contributions = Default::default();
            self.contributions.clear();
        }
        self.save_all()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            users_count: self.profiles.len(),
            repos_count: self.repos.len(),
            original_repos_count: self.original_repositories().count(),
            forked_repos_count: self.forked_repositories().count(),
            contributions_count: self.contributions.len(),
            state: self.state.clone(),
        }
    }
}
