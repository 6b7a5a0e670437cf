pub mod admin;
pub mod guarded;
pub mod index;
pub mod metadata;
pub mod prediction;
pub mod search;
pub mod sources;

mod error;

pub use admin::RebuildReport;
pub use error::{Error, Result};
pub use prediction::{PredictRequest, PredictResponse};
pub use scout_storage::BoxFuture;
pub use search::{ExpertMatch, SearchRequest};
pub use sources::{InMemoryExperts, InMemoryHistory};

use std::sync::{Arc, atomic::AtomicBool};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
	guarded::GuardedCache,
	index::VectorIndex,
	metadata::VectorMetadataStore,
	prediction::{AutocompletePredictor, LocalUserStore, PredictionCache},
};
use scout_config::{Config, EmbeddingProviderConfig};
use scout_domain::{ExpertRecord, HistoricalQuery};
use scout_providers::embedding;
use scout_storage::{cache::KeyValueCache, db::Db};

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait ExpertRecordSource
where
	Self: Send + Sync,
{
	fn fetch_experts<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<ExpertRecord>>>;
}

pub trait QueryHistoryStore
where
	Self: Send + Sync,
{
	/// Aggregated history per normalized query, limited to searches at or after `since`.
	fn fetch_history<'a>(
		&'a self,
		user_id: &'a str,
		since: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Vec<HistoricalQuery>>>;

	fn record_search<'a>(
		&'a self,
		user_id: &'a str,
		query: &'a str,
		result_count: u32,
	) -> BoxFuture<'a, color_eyre::Result<Uuid>>;

	/// Returns false when `search_id` is unknown.
	fn record_click<'a>(
		&'a self,
		search_id: Uuid,
		expert_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<bool>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

/// Where expert rows and search history come from.
#[derive(Clone)]
pub struct Sources {
	pub experts: Arc<dyn ExpertRecordSource>,
	pub history: Arc<dyn QueryHistoryStore>,
}
impl Sources {
	pub fn new(experts: Arc<dyn ExpertRecordSource>, history: Arc<dyn QueryHistoryStore>) -> Self {
		Self { experts, history }
	}

	pub fn postgres(db: Db) -> Self {
		let db = Arc::new(db);

		Self { experts: db.clone(), history: db }
	}
}

pub struct ScoutService {
	pub cfg: Config,
	pub providers: Providers,
	pub sources: Sources,
	pub(crate) index: Arc<VectorIndex>,
	pub(crate) metadata: VectorMetadataStore,
	pub(crate) results: GuardedCache,
	pub(crate) predictor: AutocompletePredictor,
	pub(crate) rebuild_lock: Mutex<()>,
	pub(crate) abort: AtomicBool,
}
impl ScoutService {
	pub fn new(cfg: Config, cache: Arc<dyn KeyValueCache>, sources: Sources) -> Self {
		Self::with_providers(cfg, cache, sources, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		cache: Arc<dyn KeyValueCache>,
		sources: Sources,
		providers: Providers,
	) -> Self {
		let guarded = GuardedCache::new(cache, &cfg.storage.redis);
		let index =
			Arc::new(VectorIndex::new(cfg.storage.index.artifact_path(), embedder_id(&cfg)));
		let predictor = AutocompletePredictor::new(
			PredictionCache::new(guarded.clone()),
			LocalUserStore::new(cfg.prediction.max_recent as usize),
			cfg.prediction.clone(),
		);

		Self {
			metadata: VectorMetadataStore::new(guarded.clone()),
			results: guarded,
			index,
			predictor,
			cfg,
			providers,
			sources,
			rebuild_lock: Mutex::new(()),
			abort: AtomicBool::new(false),
		}
	}

	pub fn index(&self) -> &VectorIndex {
		&self.index
	}

	pub fn predictor(&self) -> &AutocompletePredictor {
		&self.predictor
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

/// Identifies the embedding space an artifact was built in.
pub(crate) fn embedder_id(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.providers.embedding.dimensions
	)
}
