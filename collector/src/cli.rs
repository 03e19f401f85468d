use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use shared::SyncTarget;

use crate::analyze;
use crate::api::{GatewayError, GithubApi, GithubGateway, RateLimitResources};
use crate::store::SyncStore;
use crate::sync::{self, SyncOptions};

/// Typed process environment. The token is optional here so read-only
/// commands (`status`, `reset`, `analyze`) work without credentials;
/// gateway construction fails without it.
#[derive(Deserialize)]
pub struct Env {
    pub github_token: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Env {
    pub fn from_env() -> Result<Self> {
        Ok(envy::from_env::<Env>()?)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn gateway(&self) -> Result<GithubGateway> {
        GithubGateway::new(self.github_token.as_deref().unwrap_or_default())
    }
}

#[derive(Parser)]
#[clap(
    name = "dev-recap",
    version,
    about = "Libyan developer ecosystem recap: GitHub data collector"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync data from GitHub (target: users, repos, contributions, or all)
    Sync {
        #[clap(default_value = "all")]
        target: SyncTarget,
        /// Re-sync even if already complete
        #[clap(short, long)]
        force: bool,
        /// Cap the number of new items fetched in this run
        #[clap(short, long)]
        limit: Option<u64>,
    },
    /// Show current sync status
    Status,
    /// Generate the recap report from the synced data
    Analyze,
    /// Reset sync state (target: users, repos, contributions, or all)
    Reset {
        #[clap(default_value = "all")]
        target: SyncTarget,
    },
    /// Check API rate limit status
    RateLimit,
    /// Add a single profile outside the search-driven discovery flow
    AddUser { login: String },
}

pub async fn run(cli: Cli) -> Result<()> {
    let env = Env::from_env()?;

    match cli.command {
        Commands::Sync {
            target,
            force,
            limit,
        } => {
            let gateway = env.gateway()?;
            let mut store = SyncStore::load(env.data_dir())?;

            match gateway.quota_status().await {
                Ok(resources) => print_quota(&resources),
                Err(err) => eprintln!("could not fetch rate limits: {err}"),
            }

            let report =
                sync::run_sync(target, SyncOptions { force, limit }, &gateway, &mut store).await?;
            for (target, outcome) in &report.outcomes {
                println!("{target}: {outcome}");
            }
        }
        Commands::Status => {
            let store = SyncStore::load(env.data_dir())?;
            print_stats(&store);

            // Best effort: only shown when a token is configured.
            if let Ok(gateway) = env.gateway() {
                if let Ok(resources) = gateway.quota_status().await {
                    print_quota(&resources);
                }
            }
        }
        Commands::Analyze => {
            let store = SyncStore::load(env.data_dir())?;
            let path = analyze::write_report(&store)?;
            println!("report written to {}", path.display());
        }
        Commands::Reset { target } => {
            let mut store = SyncStore::load(env.data_dir())?;
            store.reset(target)?;
            println!("reset complete for: {target}");
        }
        Commands::RateLimit => {
            let gateway = env.gateway()?;
            let resources = gateway.quota_status().await?;
            print_quota(&resources);
        }
        Commands::AddUser { login } => add_user(&env, &login).await?,
    }

    Ok(())
}

async fn add_user(env: &Env, login: &str) -> Result<()> {
    let gateway = env.gateway()?;
    let mut store = SyncStore::load(env.data_dir())?;

    if let Some(existing) = store.profile_by_login(login) {
        println!("{login} already exists in the dataset (id {})", existing.id);
        println!("use `sync repos --force` or `sync contributions --force` to refresh their data");
        return Ok(());
    }

    let profile = match gateway.fetch_profile(login).await {
        Ok(profile) => profile,
        Err(GatewayError::NotFound(_)) => {
            anyhow::bail!("user \"{login}\" not found on GitHub")
        }
        Err(err) => return Err(err.into()),
    };

    println!("added {}", profile.login);
    println!("  name:      {}", profile.name.as_deref().unwrap_or("-"));
    println!("  location:  {}", profile.location.as_deref().unwrap_or("-"));
    println!("  followers: {}", profile.followers);

    store.upsert_profile(profile);
    store.save_profiles()?;

    println!("run `sync repos` and `sync contributions` to fetch their data");
    Ok(())
}

fn format_reset(reset_epoch: i64) -> String {
    match DateTime::from_timestamp(reset_epoch, 0) {
        Some(reset) => {
            let mins = (reset - Utc::now()).num_minutes();
            if mins > 0 {
                format!("in {mins} min")
            } else {
                "now".to_string()
            }
        }
        None => "unknown".to_string(),
    }
}

fn print_quota(resources: &RateLimitResources) {
    println!("GitHub API rate limits:");
    println!(
        "  core:    {}/{} (resets {})",
        resources.core.remaining,
        resources.core.limit,
        format_reset(resources.core.reset)
    );
    println!(
        "  search:  {}/{} (resets {})",
        resources.search.remaining,
        resources.search.limit,
        format_reset(resources.search.reset)
    );
    println!(
        "  graphql: {}/{} (resets {})",
        resources.graphql.remaining,
        resources.graphql.limit,
        format_reset(resources.graphql.reset)
    );
}

fn format_sync_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

fn print_stats(store: &SyncStore) {
    let stats = store.stats();

    println!("users:");
    println!("  count:     {}", stats.users_count);
    println!("  complete:  {}", stats.state.users.complete);
    println!("  last sync: {}", format_sync_time(stats.state.users.last_sync));
    if !stats.state.users.complete {
        println!(
            "  progress:  query {}, page {}, {} fetched",
            stats.state.users.current_query,
            stats.state.users.current_page,
            stats.state.users.total_fetched
        );
    }

    println!("repositories:");
    println!("  total:     {}", stats.repos_count);
    println!("  original:  {} (used for metrics)", stats.original_repos_count);
    println!("  forks:     {} (excluded from metrics)", stats.forked_repos_count);
    println!("  complete:  {}", stats.state.repos.complete);
    println!("  last sync: {}", format_sync_time(stats.state.repos.last_sync));
    if !stats.state.repos.complete {
        println!(
            "  progress:  {} users processed",
            stats.state.repos.users_processed.len()
        );
    }

    println!("contributions:");
    println!("  count:     {}", stats.contributions_count);
    println!("  complete:  {}", stats.state.contributions.complete);
    println!(
        "  last sync: {}",
        format_sync_time(stats.state.contributions.last_sync)
    );
    if !stats.state.contributions.complete {
        println!(
            "  progress:  {} users processed",
            stats.state.contributions.users_processed.len()
        );
    }
}
