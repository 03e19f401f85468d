use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{ContributionDay, ContributionSummary, ContributionWeek, Profile, Repository};

/// `/search/users` response. Search items carry only a shallow profile;
/// full detail comes from a follow-up fetch per login.
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub id: u64,
    pub login: String,
}

/// `/users/{login}` response.
#[derive(Debug, Deserialize)]
pub struct RawProfile {
    pub id: u64,
    pub login: String,
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
}

impl From<RawProfile> for Profile {
    fn from(raw: RawProfile) -> Self {
        Profile {
            id: raw.id,
            login: raw.login,
            name: raw.name,
            avatar_url: raw.avatar_url,
            html_url: raw.html_url,
            company: raw.company,
            blog: raw.blog,
            location: raw.location,
            email: raw.email,
            bio: raw.bio,
            twitter_username: raw.twitter_username,
            public_repos: raw.public_repos,
            public_gists: raw.public_gists,
            followers: raw.followers,
            following: raw.following,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            last_refreshed: None,
        }
    }
}

/// `/users/{login}/repos` item.
#[derive(Debug, Deserialize)]
pub struct RawRepo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: RawRepoOwner,
    pub description: Option<String>,
    #[serde(default)]
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
    pub visibility: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawRepoOwner {
    pub id: u64,
    pub login: String,
}

impl From<RawRepo> for Repository {
    fn from(raw: RawRepo) -> Self {
        Repository {
            id: raw.id,
            name: raw.name,
            full_name: raw.full_name,
            owner_id: raw.owner.id,
            owner_login: raw.owner.login,
            description: raw.description,
            fork: raw.fork,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            pushed_at: raw.pushed_at,
            stargazers_count: raw.stargazers_count,
            forks_count: raw.forks_count,
            open_issues_count: raw.open_issues_count,
            language: raw.language,
            languages_breakdown: BTreeMap::new(),
            commit_count: None,
            visibility: raw.visibility,
            topics: raw.topics,
            last_refreshed: None,
        }
    }
}

/// `/rate_limit` response. Fetched raw because octocrab's model does not
/// expose the graphql pool.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitStatus {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResources {
    pub core: RateSnapshot,
    pub search: RateSnapshot,
    pub graphql: RateSnapshot,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateSnapshot {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds of the next window reset.
    pub reset: i64,
}

/// Whole-body GraphQL response; errors arrive in-band with HTTP 200.
#[derive(Debug, Deserialize)]
pub struct GraphQlEnvelope {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub message: String,
}

impl GraphQlEnvelope {
    pub fn is_throttled(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
    }
}

/// (owner, name) pair for the batched detail query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Per-repository result of the batched detail query. Failed batches
/// degrade to an empty language map and no commit count.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoDetail {
    pub owner: String,
    pub name: String,
    pub languages: BTreeMap<String, u64>,
    pub commit_count: Option<u64>,
}

impl RepoDetail {
    pub fn empty(re: &RepoRef) -> Self {
        Self {
            owner: re.owner.clone(),
            name: re.name.clone(),
            languages: BTreeMap::new(),
            commit_count: None,
        }
    }
}

/// Typed shape of the contribution window query result.
#[derive(Debug, Deserialize)]
pub struct ContributionsData {
    pub user: Option<ContributionsUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionsUser {
    pub contributions_collection: ContributionsCollection,
    pub repositories_contributed_to: TotalCount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionsCollection {
    pub total_commit_contributions: u32,
    pub total_pull_request_contributions: u32,
    pub total_issue_contributions: u32,
    pub total_pull_request_review_contributions: u32,
    pub contribution_calendar: ContributionCalendar,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionCalendar {
    pub total_contributions: u32,
    pub weeks: Vec<CalendarWeek>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarWeek {
    pub contribution_days: Vec<CalendarDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub contribution_count: u32,
    pub date: NaiveDate,
    pub weekday: u8,
}

impl ContributionsUser {
    pub fn into_summary(self, user_id: u64, login: String) -> ContributionSummary {
        let collection = self.contributions_collection;
        ContributionSummary {
            user_id,
            login,
            total_commits: collection.total_commit_contributions,
            total_prs: collection.total_pull_request_contributions,
            total_issues: collection.total_issue_contributions,
            total_reviews: collection.total_pull_request_review_contributions,
            total_contributions: collection.contribution_calendar.total_contributions,
            repos_contributed_to: self.repositories_contributed_to.total_count,
            calendar: collection
                .contribution_calendar
                .weeks
                .into_iter()
                .map(|week| ContributionWeek {
                    days: week
                        .contribution_days
                        .into_iter()
                        .map(|day| ContributionDay {
                            date: day.date,
                            weekday: day.weekday,
                            count: day.contribution_count,
                        })
                        .collect(),
                })
                .collect(),
            last_refreshed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: u32,
}
