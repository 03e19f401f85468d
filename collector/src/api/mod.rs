use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use shared::{Profile, Repository};

mod quota;
mod types;

pub use quota::{PoolState, QuotaLedger, QuotaPool, MAX_RESET_CYCLES, QUOTA_FLOOR};
pub use types::*;

/// GraphQL documents hit query-complexity limits past this many repositories.
pub const DETAIL_BATCH_SIZE: usize = 10;

/// Fixed cooldown after an in-band GraphQL throttling signal.
const THROTTLE_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limit exhausted, resets at {reset_at:?}")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("graphql api throttled")]
    Throttled,

    #[error("github api error {status}: {message}")]
    Api { status: u16, message: String },
}

impl GatewayError {
    /// Conditions that pause a synchronizer run instead of being skipped
    /// per item.
    pub fn pauses_sync(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Throttled
        )
    }
}

/// 403/429 rejections are treated as quota exhaustion and retried after the
/// pool resets; anything else surfaces to the caller.
fn is_quota_rejection(err: &octocrab::Error) -> bool {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            status == 403 || status == 429
        }
        _ => false,
    }
}

fn classify(err: octocrab::Error) -> GatewayError {
    match err {
        octocrab::Error::GitHub { source, .. } => GatewayError::Api {
            status: source.status_code.as_u16(),
            message: source.message,
        },
        other => GatewayError::Api {
            status: 0,
            message: other.to_string(),
        },
    }
}

/// The remote operations the synchronizers consume. The concrete gateway
/// handles quota pacing and retries behind this seam so tests can inject a
/// scripted implementation.
#[async_trait]
pub trait GithubApi {
    /// Live limits for all three pools. Display only, never control flow.
    async fn quota_status(&self) -> Result<RateLimitResources, GatewayError>;

    async fn search_profiles(
        &self,
        location: &str,
        page: u32,
        per_page: u8,
    ) -> Result<SearchPage, GatewayError>;

    async fn fetch_profile(&self, login: &str) -> Result<Profile, GatewayError>;

    /// Repositories for one owner, most-recently-updated first.
    async fn list_repositories(
        &self,
        login: &str,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<Repository>, GatewayError>;

    /// Aggregate counts plus daily calendar for the window, or None when
    /// the profile has no contribution data.
    async fn fetch_contribution_window(
        &self,
        login: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ContributionsUser>, GatewayError>;

    /// Language bytes and default-branch commit counts, batched. A failing
    /// batch degrades to empty details for its members only.
    async fn repository_details(
        &self,
        refs: &[RepoRef],
    ) -> Result<Vec<RepoDetail>, GatewayError>;
}

pub struct GithubGateway {
    octocrab: Octocrab,
    quota: Mutex<QuotaLedger>,
}

#[derive(Serialize)]
struct SearchParams {
    q: String,
    per_page: u8,
    page: u32,
}

#[derive(Serialize)]
struct ReposParams {
    per_page: u8,
    page: u32,
    sort: &'static str,
}

impl GithubGateway {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        if token.trim().is_empty() {
            anyhow::bail!("GITHUB_TOKEN is required. Set it in the environment or .env file");
        }
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;

        Ok(Self {
            octocrab,
            quota: Mutex::new(QuotaLedger::default()),
        })
    }

    fn ledger(&self) -> MutexGuard<'_, QuotaLedger> {
        self.quota.lock().expect("quota ledger poisoned")
    }

    /// Gate one call against a pool: when the local ledger is below the
    /// safety floor, correct it from the status endpoint (which is free),
    /// then sleep out the window if it is genuinely exhausted.
    async fn admit(&self, pool: QuotaPool) {
        let below_floor = self.ledger().pool(pool).remaining < QUOTA_FLOOR;
        if !below_floor {
            return;
        }

        if let Err(err) = self.refresh_quota().await {
            warn!("failed to refresh quota state: {err}");
        }

        let wait = self.ledger().pool(pool).wait_before_call(Utc::now());
        if let Some(wait) = wait {
            info!(?pool, secs = wait.as_secs(), "quota low, sleeping until reset");
            tokio::time::sleep(wait).await;
            self.ledger().pool_mut(pool).assume_reset();
        }
    }

    async fn refresh_quota(&self) -> Result<(), GatewayError> {
        let status: RateLimitStatus = self
            .octocrab
            .get("/rate_limit", None::<&()>)
            .await
            .map_err(classify)?;
        self.apply_status(&status);
        Ok(())
    }

    fn apply_status(&self, status: &RateLimitStatus) {
        let mut ledger = self.ledger();
        let res = &status.resources;
        ledger.core.observe(res.core.limit, res.core.remaining, res.core.reset);
        ledger
            .search
            .observe(res.search.limit, res.search.remaining, res.search.reset);
        ledger
            .graphql
            .observe(res.graphql.limit, res.graphql.remaining, res.graphql.reset);
    }

    /// One REST call with quota gating and a bounded retry loop on
    /// quota-exhausted rejections.
    async fn rest_get<T, P>(
        &self,
        pool: QuotaPool,
        route: &str,
        params: Option<&P>,
    ) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let mut cycles = 0;
        loop {
            self.admit(pool).await;

            match self.octocrab.get(route, params).await {
                Ok(value) => {
                    self.ledger().pool_mut(pool).debit();
                    return Ok(value);
                }
                Err(err) if is_quota_rejection(&err) => {
                    cycles += 1;
                    if let Err(refresh_err) = self.refresh_quota().await {
                        warn!("failed to refresh quota state: {refresh_err}");
                    }
                    if cycles > MAX_RESET_CYCLES {
                        let reset_at = self.ledger().pool(pool).reset;
                        return Err(GatewayError::RateLimited { reset_at });
                    }
                    let wait = self
                        .ledger()
                        .pool(pool)
                        .wait_before_call(Utc::now())
                        .unwrap_or(THROTTLE_COOLDOWN);
                    warn!(
                        route,
                        cycles,
                        secs = wait.as_secs(),
                        "quota-exhausted rejection, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                    self.ledger().pool_mut(pool).assume_reset();
                }
                Err(err) => return Err(classify(err)),
            }
        }
    }

    /// One GraphQL call. Quota rejections behave as in `rest_get`; the
    /// in-band throttling signal gets a single fixed-cooldown retry.
    async fn graphql_call(
        &self,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut throttle_retried = false;
        let mut cycles = 0;
        loop {
            self.admit(QuotaPool::Graphql).await;

            let envelope: GraphQlEnvelope = match self.octocrab.graphql(payload).await {
                Ok(envelope) => envelope,
                Err(err) if is_quota_rejection(&err) => {
                    cycles += 1;
                    if cycles > MAX_RESET_CYCLES {
                        let reset_at = self.ledger().pool(QuotaPool::Graphql).reset;
                        return Err(GatewayError::RateLimited { reset_at });
                    }
                    if let Err(refresh_err) = self.refresh_quota().await {
                        warn!("failed to refresh quota state: {refresh_err}");
                    }
                    let wait = self
                        .ledger()
                        .pool(QuotaPool::Graphql)
                        .wait_before_call(Utc::now())
                        .unwrap_or(THROTTLE_COOLDOWN);
                    tokio::time::sleep(wait).await;
                    self.ledger().pool_mut(QuotaPool::Graphql).assume_reset();
                    continue;
                }
                Err(err) => return Err(classify(err)),
            };

            self.ledger().pool_mut(QuotaPool::Graphql).debit();

            if envelope.is_throttled() {
                if throttle_retried {
                    return Err(GatewayError::Throttled);
                }
                throttle_retried = true;
                warn!("graphql throttled, cooling down for 60s");
                tokio::time::sleep(THROTTLE_COOLDOWN).await;
                continue;
            }

            if !envelope.errors.is_empty() {
                let message = envelope
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(GatewayError::Api {
                    status: 200,
                    message,
                });
            }

            return Ok(envelope.data.unwrap_or(serde_json::Value::Null));
        }
    }

    async fn fetch_detail_batch(
        &self,
        batch: Vec<RepoRef>,
    ) -> Result<Vec<RepoDetail>, GatewayError> {
        let query = build_details_query(&batch);
        let payload = serde_json::json!({ "query": query });
        let data = self.graphql_call(&payload).await?;
        Ok(parse_details_response(&data, &batch))
    }
}

const CONTRIBUTIONS_QUERY: &str = r#"
query($username: String!, $from: DateTime, $to: DateTime) {
  user(login: $username) {
    contributionsCollection(from: $from, to: $to) {
      totalCommitContributions
      totalPullRequestContributions
      totalIssueContributions
      totalPullRequestReviewContributions
      contributionCalendar {
        totalContributions
        weeks {
          contributionDays {
            contributionCount
            date
            weekday
          }
        }
      }
    }
    repositoriesContributedTo(first: 1, contributionTypes: [COMMIT, PULL_REQUEST, ISSUE]) {
      totalCount
    }
  }
}
"#;

fn build_details_query(batch: &[RepoRef]) -> String {
    let repo_queries = batch
        .iter()
        .enumerate()
        .map(|(idx, re)| {
            format!(
                r#"repo{idx}: repository(owner: "{owner}", name: "{name}") {{
  owner {{ login }}
  name
  languages(first: 10, orderBy: {{field: SIZE, direction: DESC}}) {{
    edges {{ size node {{ name }} }}
  }}
  defaultBranchRef {{
    target {{ ... on Commit {{ history {{ totalCount }} }} }}
  }}
}}"#,
                owner = re.owner,
                name = re.name,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("query {{\n{repo_queries}\n}}")
}

/// Map the aliased response back onto the batch. Repositories the server
/// could not resolve come back null and degrade to empty details.
fn parse_details_response(data: &serde_json::Value, batch: &[RepoRef]) -> Vec<RepoDetail> {
    batch
        .iter()
        .enumerate()
        .map(|(idx, re)| {
            let node = &data[format!("repo{idx}")];
            if node.is_null() {
                return RepoDetail::empty(re);
            }

            let mut languages = std::collections::BTreeMap::new();
            if let Some(edges) = node["languages"]["edges"].as_array() {
                for edge in edges {
                    if let (Some(name), Some(size)) =
                        (edge["node"]["name"].as_str(), edge["size"].as_u64())
                    {
                        languages.insert(name.to_string(), size);
                    }
                }
            }

            let commit_count = node["defaultBranchRef"]["target"]["history"]["totalCount"].as_u64();

            RepoDetail {
                owner: re.owner.clone(),
                name: re.name.clone(),
                languages,
                commit_count,
            }
        })
        .collect()
}

/// Run the detail batches sequentially; one failing batch must not abort
/// the rest.
async fn collect_detail_batches<F, Fut>(refs: &[RepoRef], mut fetch: F) -> Vec<RepoDetail>
where
    F: FnMut(Vec<RepoRef>) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<RepoDetail>, GatewayError>>,
{
    let mut results = Vec::with_capacity(refs.len());
    for batch in refs.chunks(DETAIL_BATCH_SIZE) {
        match fetch(batch.to_vec()).await {
            Ok(mut details) => results.append(&mut details),
            Err(err) => {
                warn!(size = batch.len(), "repository detail batch failed: {err}");
                results.extend(batch.iter().map(RepoDetail::empty));
            }
        }
    }
    results
}

#[async_trait]
impl GithubApi for GithubGateway {
    async fn quota_status(&self) -> Result<RateLimitResources, GatewayError> {
        let status: RateLimitStatus = self
            .octocrab
            .get("/rate_limit", None::<&()>)
            .await
            .map_err(classify)?;
        self.apply_status(&status);
        Ok(status.resources)
    }

    async fn search_profiles(
        &self,
        location: &str,
        page: u32,
        per_page: u8,
    ) -> Result<SearchPage, GatewayError> {
        let params = SearchParams {
            q: format!("location:{location}"),
            per_page,
            page,
        };
        self.rest_get(QuotaPool::Search, "/search/users", Some(&params))
            .await
    }

    async fn fetch_profile(&self, login: &str) -> Result<Profile, GatewayError> {
        let route = format!("/users/{login}");
        let raw: RawProfile = self
            .rest_get(QuotaPool::Core, &route, None::<&()>)
            .await
            .map_err(|err| match err {
                GatewayError::Api { status: 404, .. } => GatewayError::NotFound(login.to_string()),
                other => other,
            })?;
        Ok(raw.into())
    }

    async fn list_repositories(
        &self,
        login: &str,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<Repository>, GatewayError> {
        let params = ReposParams {
            per_page,
            page,
            sort: "updated",
        };
        let route = format!("/users/{login}/repos");
        let raw: Vec<RawRepo> = self.rest_get(QuotaPool::Core, &route, Some(&params)).await?;
        Ok(raw.into_iter().map(Repository::from).collect())
    }

    async fn fetch_contribution_window(
        &self,
        login: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ContributionsUser>, GatewayError> {
        let payload = serde_json::json!({
            "query": CONTRIBUTIONS_QUERY,
            "variables": {
                "username": login,
                "from": from.to_rfc3339(),
                "to": to.to_rfc3339(),
            },
        });
        let data = self.graphql_call(&payload).await?;
        let parsed: ContributionsData =
            serde_json::from_value(data).map_err(|err| GatewayError::Api {
                status: 200,
                message: format!("malformed contribution response: {err}"),
            })?;
        Ok(parsed.user)
    }

    async fn repository_details(
        &self,
        refs: &[RepoRef],
    ) -> Result<Vec<RepoDetail>, GatewayError> {
        Ok(collect_detail_batches(refs, |batch| self.fetch_detail_batch(batch)).await)
    }
}
