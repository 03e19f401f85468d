use std::fmt;

use tracing::info;

use shared::SyncTarget;

use crate::api::{GatewayError, GithubApi};
use crate::store::{StoreStats, SyncStore};

pub mod contributions;
pub mod profiles;
pub mod repos;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub force: bool,
    /// Cap on new items processed in this invocation. Unbounded when unset.
    pub limit: Option<u64>,
}

impl SyncOptions {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(u64::MAX)
    }
}

/// Where a synchronizer run ended up. `Paused` and `LimitReached` leave a
/// checkpoint an identical follow-up invocation resumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    AlreadyComplete,
    Completed { fetched: u64 },
    LimitReached { fetched: u64 },
    Paused(PauseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    QuotaExhausted,
    Throttled,
}

impl PauseReason {
    /// Only called for errors where `pauses_sync()` holds.
    pub(crate) fn of(err: &GatewayError) -> Self {
        match err {
            GatewayError::Throttled => PauseReason::Throttled,
            _ => PauseReason::QuotaExhausted,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::AlreadyComplete => write!(f, "already complete"),
            SyncOutcome::Completed { fetched } => write!(f, "complete ({fetched} items)"),
            SyncOutcome::LimitReached { fetched } => {
                write!(f, "item limit reached ({fetched} items), resumable")
            }
            SyncOutcome::Paused(PauseReason::QuotaExhausted) => {
                write!(f, "paused on exhausted quota, resumable")
            }
            SyncOutcome::Paused(PauseReason::Throttled) => {
                write!(f, "paused on throttling, resumable")
            }
        }
    }
}

#[derive(Debug)]
pub struct SyncReport {
    pub outcomes: Vec<(SyncTarget, SyncOutcome)>,
    pub stats: StoreStats,
}

/// Run the requested synchronizers in dependency order: profiles first,
/// since both other work lists are derived from the profile collection.
pub async fn run_sync(
    target: SyncTarget,
    options: SyncOptions,
    api: &impl GithubApi,
    store: &mut SyncStore,
) -> anyhow::Result<SyncReport> {
    let mut outcomes = Vec::new();

    if target.includes(SyncTarget::Users) {
        let outcome = profiles::sync_profiles(api, store, &options).await?;
        info!("profile sync: {outcome}");
        outcomes.push((SyncTarget::Users, outcome));
    }

    if target.includes(SyncTarget::Repos) {
        let outcome = repos::sync_repositories(api, store, &options).await?;
        info!("repository sync: {outcome}");
        outcomes.push((SyncTarget::Repos, outcome));
    }

    if target.includes(SyncTarget::Contributions) {
        let outcome = contributions::sync_contributions(api, store, &options).await?;
        info!("contribution sync: {outcome}");
        outcomes.push((SyncTarget::Contributions, outcome));
    }

    Ok(SyncReport {
        outcomes,
        stats: store.stats(),
    })
}
