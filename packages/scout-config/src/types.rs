use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub prediction: Prediction,
	pub security: Security,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub redis: Redis,
	pub index: IndexStorage,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Redis {
	pub url: String,
	/// Namespace for every key written by this system, e.g. "scout" yields "scout:expert:42".
	#[serde(default = "default_key_prefix")]
	pub key_prefix: String,
	/// Budget for a single cache round trip. On expiry the caller takes its fallback branch.
	#[serde(default = "default_redis_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IndexStorage {
	pub dir: PathBuf,
	#[serde(default = "default_index_file_name")]
	pub file_name: String,
	#[serde(default = "default_embed_batch_size")]
	pub embed_batch_size: u32,
	#[serde(default = "default_rebuild_interval_secs")]
	pub rebuild_interval_secs: u64,
}
impl IndexStorage {
	pub fn artifact_path(&self) -> PathBuf {
		self.dir.join(&self.file_name)
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_k: u32,
	pub max_k: u32,
	pub active_only: bool,
	/// Candidates fetched per requested result when inactive experts are filtered out.
	pub overfetch_factor: u32,
	/// Zero disables the search result cache.
	pub result_cache_ttl_secs: u64,
	/// Zero disables the query embedding cache.
	pub embedding_cache_ttl_secs: u64,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_k: 5,
			max_k: 100,
			active_only: true,
			overfetch_factor: 2,
			result_cache_ttl_secs: 3_600,
			embedding_cache_ttl_secs: 3_600,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prediction {
	pub min_chars: u32,
	pub default_limit: u32,
	pub max_limit: u32,
	pub candidate_multiplier: u32,
	pub max_recent: u32,
	pub window_days: i64,
	pub prefix_ttl_secs: u64,
	pub score_ttl_secs: u64,
	pub result_ttl_secs: u64,
	pub global_suggestions: bool,
	pub weights: PredictionWeights,
}
impl Default for Prediction {
	fn default() -> Self {
		Self {
			min_chars: 2,
			default_limit: 5,
			max_limit: 50,
			candidate_multiplier: 2,
			max_recent: 1_000,
			window_days: 30,
			prefix_ttl_secs: 3_600,
			score_ttl_secs: 3_600,
			result_ttl_secs: 300,
			global_suggestions: true,
			weights: PredictionWeights::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PredictionWeights {
	pub usage: f32,
	pub click: f32,
	pub success: f32,
	/// Usage count at which the normalized usage term reaches 0.5.
	pub usage_half_saturation: f32,
}
impl Default for PredictionWeights {
	fn default() -> Self {
		Self { usage: 0.3, click: 0.4, success: 0.3, usage_half_saturation: 4.0 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}

fn default_key_prefix() -> String {
	"scout".to_string()
}

fn default_redis_timeout_ms() -> u64 {
	250
}

fn default_index_file_name() -> String {
	"experts.scix".to_string()
}

fn default_embed_batch_size() -> u32 {
	32
}

fn default_rebuild_interval_secs() -> u64 {
	86_400
}
