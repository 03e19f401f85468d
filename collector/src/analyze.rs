use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use shared::Repository;

use crate::consts::cutoff_date;
use crate::store::SyncStore;

const REPORT_FILE: &str = "recap.json";
const TOP_N: usize = 10;

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// The fixed-shape report consumed by the presentation front-end.
/// Aggregate metrics only ever count original (non-fork) repositories
/// pushed inside the window.
#[derive(Debug, Serialize)]
pub struct RecapReport {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub top_developers: TopDevelopers,
    pub top_repos: TopRepos,
    pub languages: Languages,
    pub activity: Activity,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_users: usize,
    pub active_users: usize,
    pub total_repos: usize,
    pub repos_in_window: usize,
    pub original_repos_in_window: usize,
    pub total_contributions: u64,
    pub total_stars: u64,
    pub total_forks: u64,
    pub new_devs_in_window: usize,
}

#[derive(Debug, Serialize)]
pub struct DeveloperRank {
    pub login: String,
    pub name: Option<String>,
    pub value: u64,
}

#[derive(Debug, Serialize)]
pub struct TopDevelopers {
    pub by_followers: Vec<DeveloperRank>,
    pub by_contributions: Vec<DeveloperRank>,
    pub by_commits: Vec<DeveloperRank>,
}

#[derive(Debug, Serialize)]
pub struct RepoRank {
    pub name: String,
    pub full_name: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub stars: u32,
    pub forks: u32,
    pub commits: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TopRepos {
    pub by_stars: Vec<RepoRank>,
    pub by_forks: Vec<RepoRank>,
    pub by_commits: Vec<RepoRank>,
}

#[derive(Debug, Serialize)]
pub struct LanguageShare {
    pub language: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct Languages {
    /// Primary language to number of repositories.
    pub distribution: BTreeMap<String, u64>,
    /// Language to total bytes, from the per-repository breakdowns.
    pub bytes: BTreeMap<String, u64>,
    pub top_languages: Vec<LanguageShare>,
    pub language_of_the_year: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Activity {
    pub weekday_distribution: BTreeMap<String, u64>,
    pub peak_day: Option<String>,
    pub peak_day_count: u64,
    /// Keyed by `YYYY-MM`.
    pub monthly_distribution: BTreeMap<String, u64>,
    pub peak_month: Option<String>,
    pub total_contribution_days: u64,
}

fn rank_repo(repo: &Repository) -> RepoRank {
    RepoRank {
        name: repo.name.clone(),
        full_name: repo.full_name.clone(),
        language: repo.language.clone(),
        description: repo.description.clone(),
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        commits: repo.commit_count,
    }
}

pub fn build_report(store: &SyncStore) -> RecapReport {
    let cutoff = cutoff_date();

    let repos_in_window: Vec<&Repository> = store
        .repositories()
        .filter(|r| r.pushed_on_or_after(cutoff))
        .collect();
    let originals: Vec<&Repository> = repos_in_window
        .iter()
        .copied()
        .filter(|r| !r.fork)
        .collect();

    let summary = Summary {
        total_users: store.profile_count(),
        active_users: store
            .contributions()
            .filter(|c| c.total_contributions > 0)
            .count(),
        total_repos: store.repo_count(),
        repos_in_window: repos_in_window.len(),
        original_repos_in_window: originals.len(),
        total_contributions: store
            .contributions()
            .map(|c| u64::from(c.total_contributions))
            .sum(),
        total_stars: originals
            .iter()
            .map(|r| u64::from(r.stargazers_count))
            .sum(),
        total_forks: originals.iter().map(|r| u64::from(r.forks_count)).sum(),
        new_devs_in_window: store
            .profiles()
            .filter(|p| p.created_at.map(|c| c >= cutoff).unwrap_or(false))
            .count(),
    };

    let by_followers = store
        .profiles()
        .sorted_by_key(|p| Reverse(p.followers))
        .take(TOP_N)
        .map(|p| DeveloperRank {
            login: p.login.clone(),
            name: p.name.clone(),
            value: u64::from(p.followers),
        })
        .collect();
    let by_contributions = store
        .contributions()
        .sorted_by_key(|c| Reverse(c.total_contributions))
        .take(TOP_N)
        .map(|c| DeveloperRank {
            login: c.login.clone(),
            name: store.profile(c.user_id).and_then(|p| p.name.clone()),
            value: u64::from(c.total_contributions),
        })
        .collect();
    let by_commits = store
        .contributions()
        .sorted_by_key(|c| Reverse(c.total_commits))
        .take(TOP_N)
        .map(|c| DeveloperRank {
            login: c.login.clone(),
            name: store.profile(c.user_id).and_then(|p| p.name.clone()),
            value: u64::from(c.total_commits),
        })
        .collect();

    let top_repos = TopRepos {
        by_stars: originals
            .iter()
            .sorted_by_key(|r| Reverse(r.stargazers_count))
            .take(TOP_N)
            .map(|r| rank_repo(r))
            .collect(),
        by_forks: originals
            .iter()
            .sorted_by_key(|r| Reverse(r.forks_count))
            .take(TOP_N)
            .map(|r| rank_repo(r))
            .collect(),
        by_commits: originals
            .iter()
            .filter(|r| r.commit_count.is_some())
            .sorted_by_key(|r| Reverse(r.commit_count))
            .take(TOP_N)
            .map(|r| rank_repo(r))
            .collect(),
    };

    let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut bytes: BTreeMap<String, u64> = BTreeMap::new();
    for repo in &originals {
        if let Some(language) = &repo.language {
            *distribution.entry(language.clone()).or_default() += 1;
        }
        for (language, size) in &repo.languages_breakdown {
            *bytes.entry(language.clone()).or_default() += size;
        }
    }
    let total_with_language: u64 = distribution.values().sum();
    let top_languages: Vec<LanguageShare> = distribution
        .iter()
        .sorted_by_key(|(_, count)| Reverse(**count))
        .take(TOP_N)
        .map(|(language, count)| LanguageShare {
            language: language.clone(),
            count: *count,
            percentage: if total_with_language == 0 {
                0.0
            } else {
                (*count as f64 * 1000.0 / total_with_language as f64).round() / 10.0
            },
        })
        .collect();
    let language_of_the_year = top_languages.first().map(|share| share.language.clone());

    let mut weekday_counts = [0u64; 7];
    let mut monthly_distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_contribution_days = 0u64;
    for summary in store.contributions() {
        for day in summary.days() {
            if day.count == 0 {
                continue;
            }
            total_contribution_days += 1;
            if let Some(slot) = weekday_counts.get_mut(day.weekday as usize) {
                *slot += u64::from(day.count);
            }
            *monthly_distribution
                .entry(day.date.format("%Y-%m").to_string())
                .or_default() += u64::from(day.count);
        }
    }
    let weekday_distribution: BTreeMap<String, u64> = WEEKDAYS
        .iter()
        .zip(weekday_counts.iter())
        .map(|(name, count)| (name.to_string(), *count))
        .collect();
    let (peak_day, peak_day_count) = weekday_counts
        .iter()
        .enumerate()
        .max_by_key(|(_, count)| **count)
        .map(|(idx, count)| (Some(WEEKDAYS[idx].to_string()), *count))
        .unwrap_or((None, 0));
    let peak_month = monthly_distribution
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(month, _)| month.clone());

    RecapReport {
        generated_at: Utc::now(),
        summary,
        top_developers: TopDevelopers {
            by_followers,
            by_contributions,
            by_commits,
        },
        top_repos,
        languages: Languages {
            distribution,
            bytes,
            top_languages,
            language_of_the_year,
        },
        activity: Activity {
            weekday_distribution,
            peak_day,
            peak_day_count,
            monthly_distribution,
            peak_month,
            total_contribution_days,
        },
    }
}

/// Build the report and write it under `<data_dir>/analysis/`.
pub fn write_report(store: &SyncStore) -> anyhow::Result<PathBuf> {
    let report = build_report(store);
    let dir = store.data_dir().join("analysis");
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create analysis dir {}", dir.display()))?;
    let path = dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(path)
}
