use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use creel::commands::{Registry, State};
use creel::config::Config;
use creel::db::Database;
use creel::fetcher::Fetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(Config::default_path())?;

    let db = Database::new(&config.db_url).await?;
    db.initialize().await?;

    let mut state = State {
        db,
        config,
        fetcher: Fetcher::new(),
    };
    let registry = Registry::with_defaults();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        eprintln!("no command given");
        std::process::exit(1);
    };
    let args: Vec<String> = args.collect();

    if let Err(e) = registry.dispatch(&mut state, &name, &args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
