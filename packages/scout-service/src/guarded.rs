//! Timeout and failure boundary around the remote cache.
//!
//! Every remote call made by search and prediction goes through [`GuardedCache::call`], which
//! turns an error or an expired budget into `None` after logging it. Callers treat `None` as the
//! signal to take their fallback branch.

use std::{sync::Arc, time::Duration};

use scout_storage::{BoxFuture, cache::KeyValueCache};

#[derive(Clone)]
pub struct GuardedCache {
	cache: Arc<dyn KeyValueCache>,
	namespace: String,
	timeout: Duration,
}
impl GuardedCache {
	pub fn new(cache: Arc<dyn KeyValueCache>, cfg: &scout_config::Redis) -> Self {
		Self {
			cache,
			namespace: cfg.key_prefix.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
		}
	}

	pub fn cache(&self) -> &dyn KeyValueCache {
		self.cache.as_ref()
	}

	/// Prefixes `suffix` with the configured namespace.
	pub fn key(&self, suffix: &str) -> String {
		format!("{}:{suffix}", self.namespace)
	}

	pub async fn call<T>(
		&self,
		op: &'static str,
		fut: BoxFuture<'_, scout_storage::Result<T>>,
	) -> Option<T> {
		match tokio::time::timeout(self.timeout, fut).await {
			Ok(Ok(value)) => Some(value),
			Ok(Err(err)) => {
				tracing::warn!(op, error = %err, "Cache call failed; taking fallback path.");

				None
			},
			Err(_) => {
				tracing::warn!(
					op,
					timeout_ms = self.timeout.as_millis() as u64,
					"Cache call timed out; taking fallback path."
				);

				None
			},
		}
	}
}
