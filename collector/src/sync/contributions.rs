use std::collections::BTreeSet;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, error, info};

use shared::GithubHandle;

use crate::api::GithubApi;
use crate::consts::{contribution_window, CONTRIBUTION_CHECKPOINT_EVERY, CONTRIBUTION_DELAY};
use crate::store::SyncStore;

use super::{PauseReason, SyncOptions, SyncOutcome};

/// Fetch the aggregate-plus-calendar summary for every known profile over
/// the fixed window. Each summary fully replaces the stored one.
pub async fn sync_contributions(
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

    if store.state().contributions.complete {
        if !options.force {
            info!("contributions already synced, use --force to re-sync");
            return Ok(SyncOutcome::AlreadyComplete);
        }
        store.state_mut().contributions = Default::default();
    }

    let limit = options.limit();
    let (from, to) = contribution_window();
    let mut processed = store.state().contributions.users_processed.clone();
    let start_index = store.state().contributions.current_user_index;
    let mut fetched_this_run: u64 = 0;

    info!(profiles = work_list.len(), "syncing contribution summaries");

    for (i, (user_id, login)) in work_list.iter().enumerate().skip(start_index) {
        if fetched_this_run >= limit {
            checkpoint(store, &processed, i)?;
            info!(fetched = fetched_this_run, "item limit reached for this run");
            return Ok(SyncOutcome::LimitReached {
                fetched: fetched_this_run,
            });
        }
        if processed.contains(login) {
            continue;
        }

        debug!(login = %login, index = i + 1, total = work_list.len(), "fetching contributions");
        match api.fetch_contribution_window(login, from, to).await {
            Ok(Some(user)) => {
                let summary = user.into_summary(*user_id, login.clone());
                info!(
                    login = %login,
                    total = summary.total_contributions,
                    "contribution summary stored"
                );
                store.upsert_contribution(summary);
            }
            Ok(None) => {
                debug!(login = %login, "no contribution data");
            }
            Err(err) if err.pauses_sync() => {
                checkpoint(store, &processed, i)?;
                info!("progress saved, run again to continue");
                return Ok(SyncOutcome::Paused(PauseReason::of(&err)));
            }
            Err(err) => {
                error!(login = %login, "failed to fetch contributions: {err}");
                checkpoint(store, &processed, i)?;
                continue;
            }
        }

        processed.insert(login.clone());
        fetched_this_run += 1;

        if fetched_this_run % CONTRIBUTION_CHECKPOINT_EVERY == 0 {
            checkpoint(store, &processed, i + 1)?;
            debug!(users = processed.len(), "progress saved");
        }

        tokio::time::sleep(CONTRIBUTION_DELAY).await;
    }

    let contributions = &mut store.state_mut().contributions;
    contributions.complete = true;
    contributions.users_processed = processed;
    contributions.current_user_index = work_list.len();
    contributions.last_sync = Some(Utc::now());
    store.save_contributions()?;
    store.save_state()?;

    info!(fetched = fetched_this_run, "contribution sync complete");
    Ok(SyncOutcome::Completed {
        fetched: fetched_this_run,
    })
}

fn checkpoint(
    store: &mut SyncStore,
    processed: &BTreeSet<GithubHandle>,
    next_index: usize,
) -> Result<()> {
    let contributions = &mut store.state_mut().contributions;
    contributions.users_processed = processed.clone();
    contributions.current_user_index = next_index;
    store.save_contributions()?;
    store.save_state()
}
