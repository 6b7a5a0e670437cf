use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{self, MissedTickBehavior};

use crate::Result;
use scout_service::{Error as ServiceError, RebuildReport, ScoutService};

/// Rebuilds the index immediately and then every `rebuild_interval_secs` until `shutdown`
/// resolves. With `once` it returns after the first rebuild, propagating its error.
///
/// A shutdown during a rebuild asks the service to abort and waits for the rebuild to stop, so
/// the previous artifact is never left half-published.
pub async fn run_indexer<F>(service: Arc<ScoutService>, once: bool, shutdown: F) -> Result<()>
where
	F: Future<Output = ()>,
{
	let period = Duration::from_secs(service.cfg.storage.index.rebuild_interval_secs.max(1));
	let mut interval = time::interval(period);

	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			_ = &mut shutdown => {
				tracing::info!("Shutdown requested. Indexer stopping.");

				return Ok(());
			},
			_ = interval.tick() => {},
		}

		let mut task = tokio::spawn({
			let service = service.clone();

			async move { service.rebuild_index().await }
		});
		let result = tokio::select! {
			joined = &mut task => joined?,
			_ = &mut shutdown => {
				tracing::info!("Shutdown requested. Aborting in-flight rebuild.");

				service.abort_rebuild();
				log_interrupted(task.await?);

				return Ok(());
			},
		};

		match result {
			Ok(_) if once => return Ok(()),
			Err(err) if once => return Err(err.into()),
			// Failures are logged by the service; the next tick retries.
			Ok(_) | Err(_) => {},
		}
	}
}

fn log_interrupted(result: Result<RebuildReport, ServiceError>) {
	match result {
		Ok(report) => tracing::info!(
			indexed = report.indexed_count,
			"Rebuild finished before the abort was observed."
		),
		Err(ServiceError::BuildAborted) => tracing::info!("Rebuild aborted."),
		Err(err) => tracing::warn!(error = %err, "Rebuild failed while shutting down."),
	}
}
