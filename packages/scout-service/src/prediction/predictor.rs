use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::prediction::{
	cache::{CacheTtls, PredictionCache},
	local::{LocalUserState, LocalUserStore},
};
use scout_config::Prediction;
use scout_domain::{
	HistoricalQuery, QueryStats,
	query::{self, char_len, normalize_query, prefixes, unix_ms},
	scoring::{self, UsageWindow},
};

/// Which store a request is currently being served from.
///
/// Every request starts on the fast path. The first remote failure moves it to the fallback path
/// for the rest of the request, so a dead cache costs at most one timeout per request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Path {
	Fast,
	Fallback,
}

pub struct AutocompletePredictor {
	cache: PredictionCache,
	local: LocalUserStore,
	cfg: Prediction,
}
impl AutocompletePredictor {
	pub fn new(cache: PredictionCache, local: LocalUserStore, cfg: Prediction) -> Self {
		Self { cache, local, cfg }
	}

	pub fn local(&self) -> &LocalUserStore {
		&self.local
	}

	/// Ranked completions of `partial` for `user_id`, at most `limit`.
	///
	/// Never fails: cache errors degrade ranking or freshness, not availability.
	pub async fn predict(&self, partial: &str, user_id: &str, limit: usize) -> Vec<String> {
		let prefix = normalize_query(partial);

		if limit == 0 || char_len(&prefix) < self.cfg.min_chars as usize {
			return Vec::new();
		}

		let ttls = CacheTtls::from(&self.cfg);
		let state = self.local.lock(user_id).await;
		let mut path = Path::Fast;

		match self.cache.results(user_id, &prefix, limit).await {
			Some(Some(cached)) => return cached,
			Some(None) => {},
			None => path = Path::Fallback,
		}

		let scan = limit.saturating_mul(self.cfg.candidate_multiplier as usize);
		let mut candidates = Vec::new();

		if path == Path::Fast {
			match self.cache.prefix_candidates(user_id, &prefix, scan, ttls.prefix_secs).await {
				Some(found) => candidates = found,
				None => path = Path::Fallback,
			}
		}
		if candidates.is_empty() {
			candidates = state.trie.queries_with_prefix(&prefix, scan);

			if path == Path::Fast && !candidates.is_empty() {
				let entries: Vec<(String, f64)> = candidates
					.iter()
					.map(|candidate| (candidate.clone(), state.frequency(candidate) as f64))
					.collect();

				// Warming is best-effort; a failure only moves the request to the fallback path.
				if self.cache.upsert_prefix(user_id, &prefix, &entries, ttls.prefix_secs).await.is_none()
				{
					path = Path::Fallback;
				}
			}
		}

		candidates.retain(|candidate| candidate.starts_with(&prefix));

		let window = UsageWindow::days(unix_ms(OffsetDateTime::now_utc()), self.cfg.window_days);
		let mut scored = Vec::with_capacity(candidates.len());

		for candidate in candidates {
			let score = match path {
				Path::Fast => match self.remote_score(user_id, &candidate, window, ttls).await {
					Some(score) => score,
					None => {
						path = Path::Fallback;

						self.local_score(&state, &candidate, window)
					},
				},
				Path::Fallback => self.local_score(&state, &candidate, window),
			};

			scored.push((candidate, score));
		}

		scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

		let mut predictions: Vec<String> =
			scored.into_iter().take(limit).map(|(candidate, _)| candidate).collect();

		if self.cfg.global_suggestions && path == Path::Fast && predictions.len() < limit {
			match self.cache.global_candidates(&prefix, scan).await {
				Some(global) => {
					for (candidate, _) in global {
						if predictions.len() >= limit {
							break;
						}
						if !predictions.contains(&candidate) {
							predictions.push(candidate);
						}
					}
				},
				None => path = Path::Fallback,
			}
		}
		if path == Path::Fast {
			self.cache.set_results(user_id, &prefix, limit, &predictions, ttls.result_secs).await;
		}

		predictions
	}

	/// Feeds one issued query back into the user's structures.
	///
	/// Local state is always updated first, so later predictions see the query even when every
	/// remote write fails.
	pub async fn update(&self, raw_query: &str, user_id: &str) {
		let query = normalize_query(raw_query);

		if query.is_empty() {
			return;
		}

		let now_ms = unix_ms(OffsetDateTime::now_utc());
		let mut state = self.local.lock(user_id).await;

		state.record(&query, now_ms);

		let fallback_stats = state.stats(&query).unwrap_or(QueryStats::touched(now_ms));

		match self.update_remote(user_id, &query, now_ms, fallback_stats).await {
			Some(stats) => state.set_stats(&query, stats),
			None => tracing::info!(user_id, "Prediction update kept in local state only."),
		}
	}

	/// Resets the user's structures and replays `history`. Returns the number of distinct
	/// queries replayed.
	pub async fn train(&self, history: Vec<HistoricalQuery>, user_id: &str) -> usize {
		let merged = query::merge_history(history);
		let mut state = self.local.lock(user_id).await;

		state.reset();

		for entry in &merged {
			state.seed(&entry.query, entry.search_count, stats_of(entry));
		}

		let mut by_time: Vec<&HistoricalQuery> = merged.iter().collect();

		by_time.sort_by(|a, b| a.last_used.cmp(&b.last_used).then_with(|| a.query.cmp(&b.query)));

		for entry in &by_time {
			state.push_recent(&entry.query);
		}

		if self.train_remote(user_id, &merged, &by_time).await.is_none() {
			tracing::warn!(user_id, "Prediction cache not retrained; local state was rebuilt.");
		}

		tracing::info!(user_id, queries = merged.len(), "Trained prediction model.");

		merged.len()
	}

	/// Use count for `(user_id, query)`. Remote first, local when the cache is unavailable.
	pub async fn frequency(&self, raw_query: &str, user_id: &str) -> u64 {
		let query = normalize_query(raw_query);
		let state = self.local.lock(user_id).await;

		match self.cache.frequency(user_id, &query).await {
			Some(count) => count,
			None => state.frequency(&query),
		}
	}

	/// Newest first. Remote first, local when the cache is unavailable.
	pub async fn recent_queries(&self, user_id: &str, limit: usize) -> Vec<String> {
		let limit = limit.min(self.cfg.max_recent as usize);
		let state = self.local.lock(user_id).await;

		match self.cache.recent(user_id, limit).await {
			Some(queries) => queries,
			None => state.recent(limit),
		}
	}

	async fn remote_score(
		&self,
		user_id: &str,
		candidate: &str,
		window: UsageWindow,
		ttls: CacheTtls,
	) -> Option<f32> {
		if let Some(score) = self.cache.score(user_id, candidate).await? {
			return Some(score);
		}

		let count = self.cache.frequency(user_id, candidate).await?;
		let stats = self.cache.stats(user_id, candidate).await?;
		let score = scoring::prediction_score(&self.cfg.weights, count, stats, window);

		self.cache.set_score(user_id, candidate, score, ttls.score_secs).await;

		Some(score)
	}

	fn local_score(&self, state: &LocalUserState, candidate: &str, window: UsageWindow) -> f32 {
		scoring::prediction_score(
			&self.cfg.weights,
			state.frequency(candidate),
			state.stats(candidate),
			window,
		)
	}

	async fn update_remote(
		&self,
		user_id: &str,
		query: &str,
		now_ms: i64,
		fallback_stats: QueryStats,
	) -> Option<QueryStats> {
		let count = self.cache.incr_frequency(user_id, query).await?;
		let stats = match self.cache.stats(user_id, query).await? {
			Some(stats) => stats.touch(now_ms),
			None => fallback_stats,
		};
		let entry = [(query.to_string(), count as f64)];

		self.cache.set_stats(user_id, &[(query.to_string(), stats)]).await?;
		self.cache.push_recent(user_id, query, self.cfg.max_recent as usize).await?;

		for prefix in prefixes(query) {
			self.cache.upsert_prefix(user_id, prefix, &entry, self.cfg.prefix_ttl_secs).await?;
		}

		if self.cfg.global_suggestions {
			self.cache.bump_global(query).await?;
		}

		Some(stats)
	}

	async fn train_remote(
		&self,
		user_id: &str,
		merged: &[HistoricalQuery],
		by_time: &[&HistoricalQuery],
	) -> Option<()> {
		self.cache.clear_user(user_id).await?;

		let counts: Vec<(String, u64)> =
			merged.iter().map(|entry| (entry.query.clone(), entry.search_count)).collect();
		let stats: Vec<(String, QueryStats)> =
			merged.iter().map(|entry| (entry.query.clone(), stats_of(entry))).collect();
		let mut prefix_sets: BTreeMap<&str, Vec<(String, f64)>> = BTreeMap::new();

		for entry in merged {
			let weight =
				scoring::training_weight(entry.search_count, entry.click_rate, entry.success_rate);

			for prefix in prefixes(&entry.query) {
				prefix_sets.entry(prefix).or_default().push((entry.query.clone(), weight));
			}
		}

		self.cache.set_frequencies(user_id, &counts).await?;
		self.cache.set_stats(user_id, &stats).await?;

		for (prefix, entries) in &prefix_sets {
			self.cache.upsert_prefix(user_id, prefix, entries, self.cfg.prefix_ttl_secs).await?;
		}
		for entry in by_time {
			self.cache.push_recent(user_id, &entry.query, self.cfg.max_recent as usize).await?;
		}

		Some(())
	}
}

fn stats_of(entry: &HistoricalQuery) -> QueryStats {
	QueryStats {
		last_used_ms: unix_ms(entry.last_used),
		click_rate: query::clamp_rate(entry.click_rate),
		success_rate: query::clamp_rate(entry.success_rate),
	}
}
