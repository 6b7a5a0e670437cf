use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	Error, Result, ScoutService,
	index::IndexSnapshot,
	metadata::{self, MetadataLookup},
	prediction::require_user,
};
use scout_domain::{ExpertMetadata, scoring};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchRequest {
	pub query: String,
	pub k: Option<u32>,
	pub active_only: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ExpertMatch {
	pub id: String,
	pub score: f32,
	pub metadata: ExpertMetadata,
}

impl ScoutService {
	/// Ranks experts by similarity to `req.query`, best first.
	///
	/// With `active_only` the index is over-fetched once and inactive experts are dropped, so
	/// fewer than `k` matches may come back. Experts without cached metadata are skipped, and a
	/// list with skipped experts is never written to the result cache.
	pub async fn search(&self, req: &SearchRequest) -> Result<Vec<ExpertMatch>> {
		let cfg = &self.cfg.search;
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::invalid("query must be non-empty."));
		}

		let k = req.k.unwrap_or(cfg.default_k);

		if k == 0 || k > cfg.max_k {
			return Err(Error::invalid(format!("k must be between 1 and {}.", cfg.max_k)));
		}

		let active_only = req.active_only.unwrap_or(cfg.active_only);
		let snapshot = self.index.load_snapshot().await?;
		let cache_key = (cfg.result_cache_ttl_secs > 0)
			.then(|| self.result_cache_key(&snapshot, query, k, active_only));

		if let Some(key) = cache_key.as_deref()
			&& let Some(cached) = self.cached_results(key).await
		{
			return Ok(cached);
		}

		let vector = self.embed_query(query).await?;
		let fetch = if active_only { k.saturating_mul(cfg.overfetch_factor) } else { k };
		let neighbors = snapshot.nearest(&vector, fetch as usize)?;
		let mut matches = Vec::with_capacity(k as usize);
		let mut complete = true;

		for neighbor in neighbors {
			if matches.len() >= k as usize {
				break;
			}

			let cached = match self.metadata.get(&neighbor.expert_id).await {
				MetadataLookup::Hit(cached) => cached,
				MetadataLookup::Miss | MetadataLookup::Unavailable => {
					tracing::warn!(
						expert_id = %neighbor.expert_id,
						"Skipping search hit without cached metadata."
					);

					complete = false;

					continue;
				},
			};

			if active_only && !cached.metadata.is_active {
				continue;
			}

			matches.push(ExpertMatch {
				id: neighbor.expert_id,
				score: scoring::similarity_score(neighbor.distance),
				metadata: cached.metadata,
			});
		}

		if let Some(key) = cache_key.as_deref()
			&& complete
		{
			self.store_results(key, &matches).await;
		}

		Ok(matches)
	}

	/// Stores a search in the user's history. Returns its id for click tracking.
	pub async fn record_search(&self, user_id: &str, query: &str, result_count: u32) -> Result<Uuid> {
		let user_id = require_user(user_id)?;

		self.sources.history.record_search(user_id, query, result_count).await.map_err(Error::storage)
	}

	pub async fn record_click(&self, search_id: Uuid, expert_id: &str) -> Result<()> {
		if expert_id.trim().is_empty() {
			return Err(Error::invalid("expert_id must be non-empty."));
		}

		let found = self
			.sources
			.history
			.record_click(search_id, expert_id.trim())
			.await
			.map_err(Error::storage)?;

		if !found {
			return Err(Error::invalid(format!("Unknown search_id {search_id}.")));
		}

		Ok(())
	}

	/// Embeds `query`, reusing a cached vector for the configured embedder when one exists.
	async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let ttl = self.cfg.search.embedding_cache_ttl_secs;
		let dimension = self.cfg.providers.embedding.dimensions as usize;
		let key = (ttl > 0).then(|| {
			let mut hasher = blake3::Hasher::new();

			hasher.update(self.index.embedder_id().as_bytes());
			hasher.update(&[0]);
			hasher.update(query.as_bytes());

			self.results.key(&format!("embedding:{}", hasher.finalize().to_hex()))
		});
		let cached = match key.as_deref() {
			Some(key) => self.results.call("get", self.results.cache().get(key)).await.flatten(),
			None => None,
		};

		if let Some(bytes) = cached {
			match metadata::decode_vector(&bytes) {
				Some(vector) if vector.len() == dimension => return Ok(vector),
				_ => tracing::warn!("Cached query embedding is malformed; embedding again."),
			}
		}

		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &[query.to_string()])
			.await
			.map_err(Error::provider)?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if let Some(key) = key.as_deref()
			&& vector.len() == dimension
		{
			let bytes = metadata::encode_vector(&vector);

			self.results.call("set", self.results.cache().set_ex(key, &bytes, ttl)).await;
		}

		Ok(vector)
	}

	fn result_cache_key(
		&self,
		snapshot: &IndexSnapshot,
		query: &str,
		k: u32,
		active_only: bool,
	) -> String {
		let query_hash = blake3::hash(query.as_bytes()).to_hex();

		self.results.key(&format!("search:{}:{k}:{active_only}:{query_hash}", snapshot.checksum()))
	}

	async fn cached_results(&self, key: &str) -> Option<Vec<ExpertMatch>> {
		let bytes = self.results.call("get", self.results.cache().get(key)).await??;

		match serde_json::from_slice(&bytes) {
			Ok(matches) => Some(matches),
			Err(err) => {
				tracing::warn!(error = %err, "Cached search results failed to decode.");

				None
			},
		}
	}

	async fn store_results(&self, key: &str, matches: &[ExpertMatch]) {
		let bytes = match serde_json::to_vec(matches) {
			Ok(bytes) => bytes,
			Err(err) => {
				tracing::warn!(error = %err, "Failed to encode search results for caching.");

				return;
			},
		};
		let ttl = self.cfg.search.result_cache_ttl_secs;

		self.results.call("set", self.results.cache().set_ex(key, &bytes, ttl)).await;
	}
}
