use std::time::Duration;

use chrono::{DateTime, Utc};

/// Free-text location queries used to discover the developer population.
/// "Libya" catches most profiles; major cities and the Arabic spellings
/// cover accounts that don't mention the country itself.
pub const LOCATION_QUERIES: [&str; 6] = [
    "Libya",
    "Tripoli",
    "Benghazi",
    "Misrata",
    "طرابلس",
    "ليبيا",
];

/// Search results per page. The search API caps result offsets at
/// `SEARCH_MAX_RESULTS` regardless of pagination.
pub const SEARCH_PAGE_SIZE: u8 = 100;
pub const SEARCH_MAX_RESULTS: u32 = 1000;

/// The search pool allows 30 requests/minute, so pages are paced apart.
pub const SEARCH_PAGE_DELAY: Duration = Duration::from_secs(2);

pub const REPO_PAGE_SIZE: u8 = 100;

/// Per-profile pacing for the contribution loop.
pub const CONTRIBUTION_DELAY: Duration = Duration::from_millis(100);

/// Checkpoint cadences: progress is flushed every N processed items and at
/// the end of each work list.
pub const PROFILE_CHECKPOINT_EVERY: u64 = 10;
pub const REPO_CHECKPOINT_EVERY: usize = 5;
pub const CONTRIBUTION_CHECKPOINT_EVERY: u64 = 10;

/// A stored profile older than this is re-fetched when rediscovered.
pub const PROFILE_FRESHNESS_HOURS: i64 = 24;

/// Repositories last pushed before this date are skipped entirely,
/// including their language/commit detail calls.
pub fn cutoff_date() -> DateTime<Utc> {
    "2025-01-01T00:00:00Z".parse().expect("valid cutoff date")
}

/// The fixed window contribution summaries are fetched for.
pub fn contribution_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        "2025-01-01T00:00:00Z".parse().expect("valid window start"),
        "2025-12-31T23:59:59Z".parse().expect("valid window end"),
    )
}
