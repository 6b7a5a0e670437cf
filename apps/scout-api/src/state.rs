use std::sync::Arc;

use scout_config::{Config, Redis};
use scout_service::{ScoutService, Sources};
use scout_storage::{
	cache::{KeyValueCache, MemoryCache, RedisCache},
	db::Db,
};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ScoutService>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let cache = connect_cache(&config.storage.redis).await;
		let service = ScoutService::new(config, cache, Sources::postgres(db));

		Ok(Self::from_service(Arc::new(service)))
	}

	pub fn from_service(service: Arc<ScoutService>) -> Self {
		Self { service }
	}
}

/// Redis when reachable, otherwise an in-process cache so the server still starts.
///
/// Prediction state then lives in this process only and expert metadata stays empty until the
/// next rebuild through the admin router.
pub async fn connect_cache(cfg: &Redis) -> Arc<dyn KeyValueCache> {
	match RedisCache::connect(cfg).await {
		Ok(cache) => Arc::new(cache),
		Err(err) => {
			tracing::warn!(error = %err, "Redis unavailable at startup. Using an in-process cache.");

			Arc::new(MemoryCache::new())
		},
	}
}
