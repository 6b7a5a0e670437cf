pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use scout_service::{ScoutService, Sources};
use scout_storage::{cache::RedisCache, db::Db};

#[derive(Debug, Parser)]
#[command(
	version = scout_cli::VERSION,
	rename_all = "kebab",
	styles = scout_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Rebuild once and exit instead of rebuilding on `rebuild_interval_secs`.
	#[arg(long)]
	pub once: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = scout_config::load(&args.config)?;

	scout_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	// Metadata written here must be visible to the API processes, so no in-process fallback.
	let cache = RedisCache::connect(&config.storage.redis).await?;
	let service = ScoutService::new(config, Arc::new(cache), Sources::postgres(db));

	worker::run_indexer(Arc::new(service), args.once, shutdown_signal()).await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for Ctrl-C.");

		std::future::pending::<()>().await;
	}
}
