use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use recap_collector::api::{
    ContributionCalendar, ContributionsCollection, ContributionsUser, GatewayError, GithubApi,
    RateLimitResources, RateSnapshot, RepoDetail, RepoRef, SearchItem, SearchPage, TotalCount,
};
use recap_collector::store::SyncStore;
use recap_collector::sync::{
    self, contributions, profiles, repos, PauseReason, SyncOptions, SyncOutcome,
};
use shared::{Profile, Repository, SyncTarget};

fn profile(id: u64, login: &str) -> Profile {
    Profile {
        id,
        login: login.to_string(),
        name: Some(format!("{login} dev")),
        avatar_url: None,
        html_url: None,
        company: None,
        blog: None,
        location: Some("Libya".to_string()),
        email: None,
        bio: None,
        twitter_username: None,
        public_repos: 1,
        public_gists: 0,
        followers: 5,
        following: 2,
        created_at: Some("2020-05-01T00:00:00Z".parse().unwrap()),
        updated_at: None,
        last_refreshed: None,
    }
}

fn repository(id: u64, owner: &str, name: &str, pushed_at: &str) -> Repository {
    Repository {
        id,
        name: name.to_string(),
        full_name: format!("{owner}/{name}"),
        owner_id: 0,
        owner_login: owner.to_string(),
        description: None,
        fork: false,
        created_at: None,
        updated_at: None,
        pushed_at: Some(pushed_at.parse().unwrap()),
        stargazers_count: 1,
        forks_count: 0,
        open_issues_count: 0,
        language: Some("Rust".to_string()),
        languages_breakdown: BTreeMap::new(),
        commit_count: None,
        visibility: Some("public".to_string()),
        topics: Vec::new(),
        last_refreshed: None,
    }
}

fn item(id: u64, login: &str) -> SearchItem {
    serde_json::from_value(serde_json::json!({ "id": id, "login": login })).unwrap()
}

fn contributions_user(total: u32) -> ContributionsUser {
    ContributionsUser {
        contributions_collection: ContributionsCollection {
            total_commit_contributions: total,
            total_pull_request_contributions: 0,
            total_issue_contributions: 0,
            total_pull_request_review_contributions: 0,
            contribution_calendar: ContributionCalendar {
                total_contributions: total,
                weeks: Vec::new(),
            },
        },
        repositories_contributed_to: TotalCount { total_count: 1 },
    }
}

/// Scripted in-memory stand-in for the gateway. Records every remote call
/// so tests can assert what a resumed run re-issues.
#[derive(Default)]
struct MockApi {
    search: HashMap<String, Vec<Vec<SearchItem>>>,
    profiles: HashMap<String, Profile>,
    repos: HashMap<String, Vec<Vec<Repository>>>,
    contributions: HashMap<String, u32>,
    /// Logins whose next contribution fetch throttles, consumed on hit.
    throttle_once: Mutex<HashSet<String>>,

    search_calls: Mutex<Vec<(String, u32)>>,
    profile_fetches: Mutex<Vec<String>>,
    repo_page_calls: Mutex<Vec<(String, u32)>>,
    detail_calls: Mutex<Vec<Vec<RepoRef>>>,
    contribution_fetches: Mutex<Vec<String>>,
}

impl MockApi {
    fn with_profiles(profiles: &[Profile]) -> Self {
        let mut api = Self::default();
        for p in profiles {
            api.profiles.insert(p.login.clone(), p.clone());
        }
        api
    }
}

#[async_trait]
impl GithubApi for MockApi {
    async fn quota_status(&self) -> Result<RateLimitResources, GatewayError> {
        let snapshot = RateSnapshot {
            limit: 5_000,
            remaining: 5_000,
            reset: 0,
        };
        Ok(RateLimitResources {
            core: snapshot,
            search: RateSnapshot {
                limit: 30,
                remaining: 30,
                reset: 0,
            },
            graphql: snapshot,
        })
    }

    async fn search_profiles(
        &self,
        location: &str,
        page: u32,
        _per_page: u8,
    ) -> Result<SearchPage, GatewayError> {
        self.search_calls
            .lock()
            .unwrap()
            .push((location.to_string(), page));
        let pages = self.search.get(location).cloned().unwrap_or_default();
        let items = pages.get(page as usize - 1).cloned().unwrap_or_default();
        Ok(SearchPage {
            total_count: pages.iter().map(|p| p.len() as u64).sum(),
            incomplete_results: false,
            items,
        })
    }

    async fn fetch_profile(&self, login: &str) -> Result<Profile, GatewayError> {
        self.profile_fetches.lock().unwrap().push(login.to_string());
        self.profiles
            .get(login)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(login.to_string()))
    }

    async fn list_repositories(
        &self,
        login: &str,
        page: u32,
        _per_page: u8,
    ) -> Result<Vec<Repository>, GatewayError> {
        self.repo_page_calls
            .lock()
            .unwrap()
            .push((login.to_string(), page));
        let pages = self.repos.get(login).cloned().unwrap_or_default();
        Ok(pages.get(page as usize - 1).cloned().unwrap_or_default())
    }

    async fn fetch_contribution_window(
        &self,
        login: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Option<ContributionsUser>, GatewayError> {
        if self.throttle_once.lock().unwrap().remove(login) {
            return Err(GatewayError::Throttled);
        }
        self.contribution_fetches
            .lock()
            .unwrap()
            .push(login.to_string());
        Ok(self.contributions.get(login).copied().map(contributions_user))
    }

    async fn repository_details(
        &self,
        refs: &[RepoRef],
    ) -> Result<Vec<RepoDetail>, GatewayError> {
        self.detail_calls.lock().unwrap().push(refs.to_vec());
        Ok(refs
            .iter()
            .map(|re| RepoDetail {
                owner: re.owner.clone(),
                name: re.name.clone(),
                languages: [("Rust".to_string(), 2_048u64)].into_iter().collect(),
                commit_count: Some(12),
            })
            .collect())
    }
}

fn new_store() -> (tempfile::TempDir, SyncStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SyncStore::load(dir.path()).unwrap();
    (dir, store)
}

#[tokio::test]
async fn duplicate_across_location_queries_is_stored_once() {
    let amal = profile(1, "amal");
    let badr = profile(2, "badr");
    let chafik = profile(3, "chafik");
    let mut api = MockApi::with_profiles(&[amal, badr, chafik]);
    api.search
        .insert("Libya".to_string(), vec![vec![item(1, "amal"), item(2, "badr")]]);
    // "Tripoli" surfaces badr again plus one genuinely new profile.
    api.search.insert(
        "Tripoli".to_string(),
        vec![vec![item(2, "badr"), item(3, "chafik")]],
    );

    let (_dir, mut store) = new_store();
    let outcome = profiles::sync_profiles(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed { fetched: 3 });
    assert_eq!(store.profile_count(), 3);
    // The duplicate discovery never re-fetched detail.
    let fetches = api.profile_fetches.lock().unwrap();
    assert_eq!(
        fetches.iter().filter(|login| *login == "badr").count(),
        1
    );
    assert!(store.state().users.complete);
}

#[tokio::test]
async fn already_complete_sync_is_a_no_op_without_force() {
    let mut api = MockApi::with_profiles(&[profile(1, "amal")]);
    api.search
        .insert("Libya".to_string(), vec![vec![item(1, "amal")]]);

    let (_dir, mut store) = new_store();
    profiles::sync_profiles(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    let searches_after_first = api.search_calls.lock().unwrap().len();

    let outcome = profiles::sync_profiles(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::AlreadyComplete);
    assert_eq!(api.search_calls.lock().unwrap().len(), searches_after_first);
}

#[tokio::test]
async fn forced_rescan_skips_fresh_profiles() {
    let mut api = MockApi::with_profiles(&[profile(1, "amal")]);
    api.search
        .insert("Libya".to_string(), vec![vec![item(1, "amal")]]);

    let (_dir, mut store) = new_store();
    profiles::sync_profiles(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(api.profile_fetches.lock().unwrap().len(), 1);

    let outcome = profiles::sync_profiles(
        &api,
        &mut store,
        &SyncOptions {
            force: true,
            limit: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed { fetched: 1 });
    // Fresh local copy, so the re-scan issued no new detail fetch.
    assert_eq!(api.profile_fetches.lock().unwrap().len(), 1);
    assert_eq!(store.profile_count(), 1);
}

#[tokio::test]
async fn limit_capped_run_does_not_mark_complete() {
    let mut api = MockApi::with_profiles(&[profile(1, "amal"), profile(2, "badr")]);
    api.search.insert(
        "Libya".to_string(),
        vec![vec![item(1, "amal"), item(2, "badr")]],
    );

    let (_dir, mut store) = new_store();
    let outcome = profiles::sync_profiles(
        &api,
        &mut store,
        &SyncOptions {
            force: false,
            limit: Some(1),
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome, SyncOutcome::LimitReached { fetched: 1 });
    assert!(!store.state().users.complete);
    assert_eq!(store.profile_count(), 1);
}

#[tokio::test]
async fn profile_sync_resumes_from_the_persisted_cursor() {
    use recap_collector::consts::LOCATION_QUERIES;

    let last_query = LOCATION_QUERIES.len() - 1;
    let mut api = MockApi::with_profiles(&[profile(9, "dala")]);
    // Only the last query has content; everything else would still be
    // re-searched if the cursor were ignored.
    api.search.insert(
        LOCATION_QUERIES[last_query].to_string(),
        vec![vec![], vec![item(9, "dala")]],
    );

    let (_dir, mut store) = new_store();
    store.state_mut().users.current_query = last_query;
    store.state_mut().users.current_page = 2;

    let outcome = profiles::sync_profiles(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Completed { .. }));
    let calls = api.search_calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[(LOCATION_QUERIES[last_query].to_string(), 2)]
    );
    assert_eq!(store.profile_count(), 1);
}

#[tokio::test]
async fn repo_sync_requires_profiles() {
    let api = MockApi::default();
    let (_dir, mut store) = new_store();
    let err = repos::sync_repositories(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sync users"));
}

#[tokio::test]
async fn pre_cutoff_repos_never_reach_the_detail_batch() {
    let mut api = MockApi::default();
    api.repos.insert(
        "amal".to_string(),
        vec![vec![
            repository(10, "amal", "fresh-tool", "2025-03-10T12:00:00Z"),
            repository(11, "amal", "old-tool", "2023-07-01T12:00:00Z"),
        ]],
    );

    let (_dir, mut store) = new_store();
    store.upsert_profile(profile(1, "amal"));

    let outcome = repos::sync_repositories(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed { fetched: 1 });
    assert_eq!(store.repo_count(), 1);
    let detail_calls = api.detail_calls.lock().unwrap();
    assert_eq!(detail_calls.len(), 1);
    assert_eq!(detail_calls[0], vec![RepoRef::new("amal", "fresh-tool")]);

    let stored = store.repositories().next().unwrap();
    assert_eq!(stored.name, "fresh-tool");
    assert_eq!(stored.commit_count, Some(12));
    assert_eq!(stored.languages_breakdown.get("Rust"), Some(&2_048));
}

#[tokio::test]
async fn old_page_with_no_qualifying_repos_stops_pagination() {
    // A full page of pre-cutoff repositories: with newest-first ordering the
    // rest of the listing is old too, so page 2 must never be requested.
    let old_page: Vec<Repository> = (0..100)
        .map(|i| repository(100 + i, "amal", &format!("dusty-{i}"), "2022-01-01T00:00:00Z"))
        .collect();
    let new_page = vec![repository(500, "amal", "hidden-new", "2025-06-01T00:00:00Z")];

    let mut api = MockApi::default();
    api.repos
        .insert("amal".to_string(), vec![old_page, new_page]);

    let (_dir, mut store) = new_store();
    store.upsert_profile(profile(1, "amal"));

    repos::sync_repositories(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(store.repo_count(), 0);
    let calls = api.repo_page_calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("amal".to_string(), 1)]);
}

#[tokio::test]
async fn resumed_repo_sync_skips_processed_handles() {
    let mut api = MockApi::default();
    api.repos.insert(
        "amal".to_string(),
        vec![vec![repository(10, "amal", "tool", "2025-02-01T00:00:00Z")]],
    );
    api.repos.insert(
        "badr".to_string(),
        vec![vec![repository(20, "badr", "web", "2025-02-01T00:00:00Z")]],
    );

    let (_dir, mut store) = new_store();
    store.upsert_profile(profile(1, "amal"));
    store.upsert_profile(profile(2, "badr"));
    store
        .state_mut()
        .repos
        .users_processed
        .insert("amal".to_string());

    repos::sync_repositories(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();

    let calls = api.repo_page_calls.lock().unwrap();
    assert!(calls.iter().all(|(login, _)| login == "badr"));
    assert!(store.state().repos.complete);
}

#[tokio::test]
async fn throttled_contribution_sync_resumes_where_it_paused() {
    let roster = [profile(1, "amal"), profile(2, "badr"), profile(3, "chafik")];
    let mut api = MockApi::with_profiles(&roster);
    for p in &roster {
        api.contributions.insert(p.login.clone(), 10);
    }
    api.throttle_once
        .lock()
        .unwrap()
        .insert("chafik".to_string());

    let (_dir, mut store) = new_store();
    for p in &roster {
        store.upsert_profile(p.clone());
    }

    let outcome = contributions::sync_contributions(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Paused(PauseReason::Throttled));
    assert_eq!(
        api.contribution_fetches.lock().unwrap().as_slice(),
        &["amal".to_string(), "badr".to_string()]
    );
    assert_eq!(store.contribution_count(), 2);
    assert!(!store.state().contributions.complete);

    // An identical follow-up invocation touches only the remaining profile.
    api.contribution_fetches.lock().unwrap().clear();
    let outcome = contributions::sync_contributions(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { fetched: 1 });
    assert_eq!(
        api.contribution_fetches.lock().unwrap().as_slice(),
        &["chafik".to_string()]
    );
    assert_eq!(store.contribution_count(), 3);
    assert!(store.state().contributions.complete);
}

#[tokio::test]
async fn contribution_sync_replaces_summaries_wholesale() {
    let roster = [profile(1, "amal")];
    let mut api = MockApi::with_profiles(&roster);
    api.contributions.insert("amal".to_string(), 30);

    let (_dir, mut store) = new_store();
    store.upsert_profile(profile(1, "amal"));

    contributions::sync_contributions(&api, &mut store, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(store.contribution("amal").unwrap().total_contributions, 30);

    api.contributions.insert("amal".to_string(), 4);
    let outcome = contributions::sync_contributions(
        &api,
        &mut store,
        &SyncOptions {
            force: true,
            limit: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { fetched: 1 });
    assert_eq!(store.contribution("amal").unwrap().total_contributions, 4);
}

#[tokio::test]
async fn run_sync_drives_all_targets_in_dependency_order() {
    let mut api = MockApi::with_profiles(&[profile(1, "amal")]);
    api.search
        .insert("Libya".to_string(), vec![vec![item(1, "amal")]]);
    api.repos.insert(
        "amal".to_string(),
        vec![vec![repository(10, "amal", "tool", "2025-02-01T00:00:00Z")]],
    );
    api.contributions.insert("amal".to_string(), 21);

    let (_dir, mut store) = new_store();
    let report = sync::run_sync(
        SyncTarget::All,
        SyncOptions::default(),
        &api,
        &mut store,
    )
    .await
    .unwrap();

    let targets: Vec<SyncTarget> = report.outcomes.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        targets,
        vec![SyncTarget::Users, SyncTarget::Repos, SyncTarget::Contributions]
    );
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, SyncOutcome::Completed { .. })));
    assert_eq!(report.stats.users_count, 1);
    assert_eq!(report.stats.repos_count, 1);
    assert_eq!(report.stats.contributions_count, 1);
    assert!(report.stats.state.users.complete);
    assert!(report.stats.state.repos.complete);
    assert!(report.stats.state.contributions.complete);
}
