use std::collections::HashSet;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::api::{GatewayError, GithubApi};
use crate::consts::{
    LOCATION_QUERIES, PROFILE_CHECKPOINT_EVERY, PROFILE_FRESHNESS_HOURS, SEARCH_MAX_RESULTS,
    SEARCH_PAGE_DELAY, SEARCH_PAGE_SIZE,
};
use crate::store::SyncStore;

use super::{PauseReason, SyncOptions, SyncOutcome};

/// Discover profiles through the fixed location-query list and fetch full
/// detail for each new or stale one. Multiple queries surface the same
/// account, so discovery dedupes by id across the whole run.
pub async fn sync_profiles(
    api: &impl GithubApi,
    store: &mut SyncStore,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    if store.state().users.complete {
        if !options.force {
            info!("profiles already synced, use --force to re-sync");
            return Ok(SyncOutcome::AlreadyComplete);
        }
        store.state_mut().users = Default::default();
    }

    let limit = options.limit();
    let freshness = Duration::hours(PROFILE_FRESHNESS_HOURS);
    // Run-local: several location queries surface the same account, and a
    // later query must not re-process what an earlier one already did.
    // Profiles stored by previous runs are handled by the freshness check.
    let mut seen: HashSet<u64> = HashSet::new();

    let start_query = store.state().users.current_query;
    let start_page = store.state().users.current_page;
    let mut total_fetched = store.state().users.total_fetched;

    for (query_idx, location) in LOCATION_QUERIES.iter().enumerate().skip(start_query) {
        let mut page: u32 = if query_idx == start_query { start_page } else { 1 };
        info!(location, "searching profiles by location");

        loop {
            let result = match api.search_profiles(location, page, SEARCH_PAGE_SIZE).await {
                Ok(result) => result,
                Err(err) if err.pauses_sync() => {
                    checkpoint(store, query_idx, page, total_fetched)?;
                    info!("progress saved, run again to continue");
                    return Ok(SyncOutcome::Paused(PauseReason::of(&err)));
                }
                Err(err) => {
                    // Failed page: unexpected, surfaces after the checkpoint.
                    checkpoint(store, query_idx, page, total_fetched)?;
                    error!(location, page, "search page failed: {err}");
                    return Err(err.into());
                }
            };

            if page == 1 {
                info!(location, matches = result.total_count, "search matches");
            }
            if result.items.is_empty() {
                break;
            }
            let page_len = result.items.len();

            for item in &result.items {
                if total_fetched >= limit {
                    checkpoint(store, query_idx, page, total_fetched)?;
                    info!(fetched = total_fetched, "item limit reached for this run");
                    return Ok(SyncOutcome::LimitReached {
                        fetched: total_fetched,
                    });
                }
                if seen.contains(&item.id) {
                    debug!(login = %item.login, "duplicate discovery, skipping");
                    continue;
                }

                let stale = store
                    .profile(item.id)
                    .map(|p| p.is_stale(Utc::now(), freshness))
                    .unwrap_or(true);

                if stale {
                    match api.fetch_profile(&item.login).await {
                        Ok(profile) => store.upsert_profile(profile),
                        Err(GatewayError::NotFound(_)) => {
                            // Vanished between search and fetch; a later run
                            // will retry if it is still discoverable.
                            warn!(login = %item.login, "profile not found, skipping");
                            continue;
                        }
                        Err(err) if err.pauses_sync() => {
                            checkpoint(store, query_idx, page, total_fetched)?;
                            info!("progress saved, run again to continue");
                            return Ok(SyncOutcome::Paused(PauseReason::of(&err)));
                        }
                        Err(err) => {
                            error!(login = %item.login, "failed to fetch profile: {err}");
                            continue;
                        }
                    }
                } else {
                    debug!(login = %item.login, "local copy is fresh, skipping fetch");
                }

                seen.insert(item.id);
                total_fetched += 1;

                if total_fetched % PROFILE_CHECKPOINT_EVERY == 0 {
                    checkpoint(store, query_idx, page, total_fetched)?;
                    debug!(fetched = total_fetched, "progress saved");
                }
            }

            // The search index stops serving past a fixed offset, so a
            // full page at the cap is still the last one.
            let exhausted = page_len < SEARCH_PAGE_SIZE as usize
                || page * SEARCH_PAGE_SIZE as u32 >= SEARCH_MAX_RESULTS;
            if exhausted {
                break;
            }
            page += 1;
            tokio::time::sleep(SEARCH_PAGE_DELAY).await;
        }
    }

    let users = &mut store.state_mut().users;
    users.complete = true;
    users.current_query = 0;
    users.current_page = 1;
    users.total_fetched = total_fetched;
    users.last_sync = Some(Utc::now());
    store.save_profiles()?;
    store.save_state()?;

    info!(fetched = total_fetched, "profile sync complete");
    Ok(SyncOutcome::Completed {
        fetched: total_fetched,
    })
}

fn checkpoint(store: &mut SyncStore, query: usize, page: u32, total_fetched: u64) -> Result<()> {
    let users = &mut store.state_mut().users;
    users.current_query = query;
    users.current_page = page;
    users.total_fetched = total_fetched;
    store.save_profiles()?;
    store.save_state()
}
