use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use recap_collector::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    run(cli).await
}
