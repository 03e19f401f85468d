use std::collections::BTreeSet;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use shared::{GithubHandle, Repository};

use crate::api::{GatewayError, GithubApi, RepoRef};
use crate::consts::{cutoff_date, REPO_CHECKPOINT_EVERY, REPO_PAGE_SIZE};
use crate::store::SyncStore;

use super::{PauseReason, SyncOptions, SyncOutcome};

/// Fetch repositories for every known profile, skipping anything last
/// pushed before the cutoff and batching the expensive language/commit
/// detail lookups for the rest.
pub async fn sync_repositories(
    api: &impl GithubApi,
    store: &mut SyncStore,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    let work_list: Vec<(u64, GithubHandle)> = store
        .profiles()
        .map(|p| (p.id, p.login.clone()))
        .collect();
    if work_list.is_empty() {
        bail!("no profiles in the store, run `sync users` first");
    }

    if store.state().repos.complete {
        if !options.force {
            info!("repositories already synced, use --force to re-sync");
            return Ok(SyncOutcome::AlreadyComplete);
        }
        store.state_mut().repos = Default::default();
    }

    let limit = options.limit();
    let cutoff = cutoff_date();
    let mut processed = store.state().repos.users_processed.clone();
    let start_index = store.state().repos.current_user_index;
    let mut total_fetched = store.state().repos.total_fetched;
    let mut skipped_old: u64 = 0;

    info!(
        profiles = work_list.len(),
        %cutoff,
        "syncing repositories pushed since the cutoff"
    );

    for (i, (owner_id, login)) in work_list.iter().enumerate().skip(start_index) {
        if total_fetched >= limit {
            checkpoint(store, &processed, i, total_fetched)?;
            info!(fetched = total_fetched, "item limit reached for this run");
            return Ok(SyncOutcome::LimitReached {
                fetched: total_fetched,
            });
        }
        if processed.contains(login) {
            debug!(login = %login, "already processed, skipping");
            continue;
        }

        debug!(login = %login, index = i + 1, total = work_list.len(), "fetching repositories");
        match sync_profile_repos(api, store, *owner_id, login, cutoff).await {
            Ok(outcome) => {
                total_fetched += outcome.fetched;
                skipped_old += outcome.skipped;
                processed.insert(login.clone());
                info!(
                    login = %login,
                    fetched = outcome.fetched,
                    skipped_old = outcome.skipped,
                    "repositories stored"
                );
            }
            Err(err) if err.pauses_sync() => {
                checkpoint(store, &processed, i, total_fetched)?;
                info!("progress saved, run again to continue");
                return Ok(SyncOutcome::Paused(PauseReason::of(&err)));
            }
            Err(err) => {
                error!(login = %login, "failed to sync repositories: {err}");
                checkpoint(store, &processed, i, total_fetched)?;
                continue;
            }
        }

        if (i + 1) % REPO_CHECKPOINT_EVERY == 0 || i + 1 == work_list.len() {
            checkpoint(store, &processed, i + 1, total_fetched)?;
            debug!(
                fetched = total_fetched,
                users = processed.len(),
                "progress saved"
            );
        }
    }

    let repos = &mut store.state_mut().repos;
    repos.complete = true;
    repos.users_processed = processed;
    repos.current_user_index = work_list.len();
    repos.total_fetched = total_fetched;
    repos.last_sync = Some(Utc::now());
    store.save_repos()?;
    store.save_state()?;

    info!(
        fetched = total_fetched,
        skipped_old, "repository sync complete"
    );
    Ok(SyncOutcome::Completed {
        fetched: total_fetched,
    })
}

struct ProfileRepoOutcome {
    fetched: u64,
    skipped: u64,
}

/// Page one profile's repositories newest-update-first. Pagination stops
/// early once a page is short, or once an old repository shows up while no
/// qualifying repository has been collected yet for this profile — with
/// newest-first ordering, the rest of the list is old too. A push racing
/// the pagination can break that monotonicity; the approximation is
/// accepted in exchange for the skipped detail calls.
async fn sync_profile_repos(
    api: &impl GithubApi,
    store: &mut SyncStore,
    owner_id: u64,
    login: &str,
    cutoff: DateTime<Utc>,
) -> std::result::Result<ProfileRepoOutcome, GatewayError> {
    let mut page: u32 = 1;
    let mut fetched: u64 = 0;
    let mut skipped: u64 = 0;

    loop {
        let repos = api.list_repositories(login, page, REPO_PAGE_SIZE).await?;
        if repos.is_empty() {
            break;
        }
        let page_len = repos.len();

        let mut found_old = false;
        let mut qualifying: Vec<Repository> = Vec::new();
        for repo in repos {
            if repo.pushed_on_or_after(cutoff) {
                qualifying.push(repo);
            } else {
                found_old = true;
                skipped += 1;
            }
        }

        if !qualifying.is_empty() {
            let refs: Vec<RepoRef> = qualifying
                .iter()
                .map(|r| RepoRef::new(login, r.name.clone()))
                .collect();
            let details = api.repository_details(&refs).await?;

            for (mut repo, detail) in qualifying.into_iter().zip(details) {
                repo.languages_breakdown = detail.languages;
                repo.commit_count = detail.commit_count;
                // Back-reference to the profile this walk discovered it through.
                repo.owner_id = owner_id;
                repo.owner_login = login.to_string();
                store.upsert_repository(repo);
                fetched += 1;
            }
        }

        if page_len < REPO_PAGE_SIZE as usize || (found_old && fetched == 0) {
            break;
        }
        page += 1;
    }

    Ok(ProfileRepoOutcome { fetched, skipped })
}

fn checkpoint(
    store: &mut SyncStore,
    processed: &BTreeSet<GithubHandle>,
    next_index: usize,
    total_fetched: u64,
) -> Result<()> {
    let repos = &mut store.state_mut().repos;
    repos.users_processed = processed.clone();
    repos.current_user_index = next_index;
    repos.total_fetched = total_fetched;
    store.save_repos()?;
    store.save_state()
}
