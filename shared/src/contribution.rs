use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::GithubHandle;

/// Aggregate contribution counts plus the daily calendar for one profile
/// over a fixed window. Keyed by handle and replaced wholesale on each sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub user_id: u64,
    pub login: GithubHandle,
    pub total_commits: u32,
    pub total_prs: u32,
    pub total_issues: u32,
    pub total_reviews: u32,
    pub total_contributions: u32,
    pub repos_contributed_to: u32,
    pub calendar: Vec<ContributionWeek>,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionWeek {
    pub days: Vec<ContributionDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionDay {
    pub date: NaiveDate,
    /// 0 = Sunday .. 6 = Saturday, as reported by the calendar query.
    pub weekday: u8,
    pub count: u32,
}

impl ContributionSummary {
    /// Iterate all calendar days in order.
    pub fn days(&self) -> impl Iterator<Item = &ContributionDay> {
        self.calendar.iter().flat_map(|week| week.days.iter())
    }
}
