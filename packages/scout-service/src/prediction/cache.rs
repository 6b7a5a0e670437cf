//! Remote prediction structures.
//!
//! Keys under `{ns}`:
//!
//! - `user:{u}:freq` hash, query to use count
//! - `user:{u}:stats` hash, query to JSON [`QueryStats`]
//! - `user:{u}:prefix:{p}` sorted set, completion to weight
//! - `user:{u}:score:{q}` string, cached relevance score
//! - `user:{u}:result:{limit}:{p}` string, cached ranked predictions
//! - `user:{u}:recent` list, newest first
//! - `global:lex` and `global:popular` sorted sets shared by all users
//!
//! `{u}` is the user id with every byte outside `[A-Za-z0-9._@-]` percent-encoded, so it never
//! contains `:` and one user's key prefix cannot cover another user's keys.
//!
//! Every method returns `None` when the cache failed, after the failure has been logged.

use crate::guarded::GuardedCache;
use scout_config::Prediction;
use scout_domain::QueryStats;

pub struct PredictionCache {
	cache: GuardedCache,
}
impl PredictionCache {
	pub fn new(cache: GuardedCache) -> Self {
		Self { cache }
	}

	fn user_key(&self, user_id: &str, suffix: &str) -> String {
		self.cache.key(&format!("user:{}:{suffix}", encode_user(user_id)))
	}

	pub async fn incr_frequency(&self, user_id: &str, query: &str) -> Option<u64> {
		let key = self.user_key(user_id, "freq");
		let count = self.cache.call("hincrby", self.cache.cache().hincr(&key, query, 1)).await?;

		Some(count.max(0) as u64)
	}

	/// `Some(0)` when the cache answered but has no counter.
	pub async fn frequency(&self, user_id: &str, query: &str) -> Option<u64> {
		let key = self.user_key(user_id, "freq");
		let raw = self.cache.call("hget", self.cache.cache().hget(&key, query)).await?;

		Some(raw.and_then(|bytes| parse_u64(&bytes)).unwrap_or_default())
	}

	pub async fn set_frequencies(&self, user_id: &str, counts: &[(String, u64)]) -> Option<()> {
		if counts.is_empty() {
			return Some(());
		}

		let key = self.user_key(user_id, "freq");
		let fields: Vec<(String, Vec<u8>)> = counts
			.iter()
			.map(|(query, count)| (query.clone(), count.to_string().into_bytes()))
			.collect();

		self.cache.call("hset", self.cache.cache().hset(&key, &fields)).await
	}

	/// `Some(None)` when the cache answered without usable stats.
	pub async fn stats(&self, user_id: &str, query: &str) -> Option<Option<QueryStats>> {
		let key = self.user_key(user_id, "stats");
		let raw = self.cache.call("hget", self.cache.cache().hget(&key, query)).await?;

		Some(raw.and_then(|bytes| decode_stats(user_id, query, &bytes)))
	}

	pub async fn set_stats(&self, user_id: &str, entries: &[(String, QueryStats)]) -> Option<()> {
		if entries.is_empty() {
			return Some(());
		}

		let key = self.user_key(user_id, "stats");
		let mut fields = Vec::with_capacity(entries.len());

		for (query, stats) in entries {
			match serde_json::to_vec(stats) {
				Ok(bytes) => fields.push((query.clone(), bytes)),
				Err(err) => tracing::warn!(user_id, error = %err, "Failed to encode query stats."),
			}
		}

		self.cache.call("hset", self.cache.cache().hset(&key, &fields)).await
	}

	/// Highest-weighted completions for `prefix`. Refreshes the prefix TTL on access.
	pub async fn prefix_candidates(
		&self,
		user_id: &str,
		prefix: &str,
		limit: usize,
		ttl_secs: u64,
	) -> Option<Vec<String>> {
		let key = self.user_key(user_id, &format!("prefix:{prefix}"));
		let members = self.cache.call("zrevrange", self.cache.cache().zrevrange(&key, limit)).await?;

		if !members.is_empty() {
			self.cache.call("expire", self.cache.cache().expire(&key, ttl_secs)).await;
		}

		Some(members.into_iter().map(|(member, _)| member).collect())
	}

	/// Upserts `entries` into the prefix set for `prefix` and refreshes its TTL.
	pub async fn upsert_prefix(
		&self,
		user_id: &str,
		prefix: &str,
		entries: &[(String, f64)],
		ttl_secs: u64,
	) -> Option<()> {
		if entries.is_empty() {
			return Some(());
		}

		let key = self.user_key(user_id, &format!("prefix:{prefix}"));

		self.cache.call("zadd", self.cache.cache().zadd(&key, entries)).await?;
		self.cache.call("expire", self.cache.cache().expire(&key, ttl_secs)).await?;

		Some(())
	}

	pub async fn score(&self, user_id: &str, query: &str) -> Option<Option<f32>> {
		let key = self.user_key(user_id, &format!("score:{query}"));
		let raw = self.cache.call("get", self.cache.cache().get(&key)).await?;

		Some(raw.and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse::<f32>().ok()))
	}

	pub async fn set_score(
		&self,
		user_id: &str,
		query: &str,
		score: f32,
		ttl_secs: u64,
	) -> Option<()> {
		let key = self.user_key(user_id, &format!("score:{query}"));
		let value = score.to_string();

		self.cache.call("setex", self.cache.cache().set_ex(&key, value.as_bytes(), ttl_secs)).await
	}

	pub async fn results(
		&self,
		user_id: &str,
		partial: &str,
		limit: usize,
	) -> Option<Option<Vec<String>>> {
		let key = self.user_key(user_id, &format!("result:{limit}:{partial}"));
		let raw = self.cache.call("get", self.cache.cache().get(&key)).await?;

		Some(raw.and_then(|bytes| match serde_json::from_slice(&bytes) {
			Ok(list) => Some(list),
			Err(err) => {
				tracing::warn!(user_id, error = %err, "Cached predictions failed to decode.");

				None
			},
		}))
	}

	pub async fn set_results(
		&self,
		user_id: &str,
		partial: &str,
		limit: usize,
		predictions: &[String],
		ttl_secs: u64,
	) -> Option<()> {
		let key = self.user_key(user_id, &format!("result:{limit}:{partial}"));
		let bytes = serde_json::to_vec(predictions).ok()?;

		self.cache.call("setex", self.cache.cache().set_ex(&key, &bytes, ttl_secs)).await
	}

	pub async fn push_recent(&self, user_id: &str, query: &str, max_len: usize) -> Option<()> {
		let key = self.user_key(user_id, "recent");

		self.cache.call("lpush", self.cache.cache().lpush_trim(&key, query, max_len)).await
	}

	pub async fn recent(&self, user_id: &str, limit: usize) -> Option<Vec<String>> {
		let key = self.user_key(user_id, "recent");

		self.cache.call("lrange", self.cache.cache().lrange(&key, limit)).await
	}

	/// Deletes every key belonging to `user_id`. Returns the number removed.
	pub async fn clear_user(&self, user_id: &str) -> Option<u64> {
		let prefix = self.user_key(user_id, "");

		self.cache.call("delete_prefix", self.cache.cache().delete_prefix(&prefix)).await
	}

	/// Counts one more use of `query` across all users.
	pub async fn bump_global(&self, query: &str) -> Option<()> {
		let lex = self.cache.key("global:lex");
		let popular = self.cache.key("global:popular");
		let member = [(query.to_string(), 0.0)];

		self.cache.call("zadd", self.cache.cache().zadd(&lex, &member)).await?;
		self.cache.call("zincrby", self.cache.cache().zincr(&popular, query, 1.0)).await?;

		Some(())
	}

	/// Global queries starting with `prefix`, most popular first.
	pub async fn global_candidates(&self, prefix: &str, scan: usize) -> Option<Vec<(String, f64)>> {
		let lex = self.cache.key("global:lex");
		let popular = self.cache.key("global:popular");
		let members = self
			.cache
			.call("zrangebylex", self.cache.cache().zrange_prefix(&lex, prefix, scan))
			.await?;
		let mut scored = Vec::with_capacity(members.len());

		for member in members {
			let score = self
				.cache
				.call("zscore", self.cache.cache().zscore(&popular, &member))
				.await?
				.unwrap_or_default();

			scored.push((member, score));
		}

		scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

		Some(scored)
	}
}

/// TTLs the predictor applies to remote keys, lifted from configuration.
#[derive(Clone, Copy, Debug)]
pub struct CacheTtls {
	pub prefix_secs: u64,
	pub score_secs: u64,
	pub result_secs: u64,
}
impl From<&Prediction> for CacheTtls {
	fn from(cfg: &Prediction) -> Self {
		Self {
			prefix_secs: cfg.prefix_ttl_secs,
			score_secs: cfg.score_ttl_secs,
			result_secs: cfg.result_ttl_secs,
		}
	}
}

fn encode_user(user_id: &str) -> String {
	let mut out = String::with_capacity(user_id.len());

	for byte in user_id.bytes() {
		if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'@' | b'-') {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{byte:02X}"));
		}
	}

	out
}

fn parse_u64(bytes: &[u8]) -> Option<u64> {
	std::str::from_utf8(bytes).ok()?.trim().parse::<i64>().ok().map(|value| value.max(0) as u64)
}

fn decode_stats(user_id: &str, query: &str, bytes: &[u8]) -> Option<QueryStats> {
	match serde_json::from_slice(bytes) {
		Ok(stats) => Some(stats),
		Err(err) => {
			tracing::warn!(user_id, query, error = %err, "Rejected malformed query stats.");

			None
		},
	}
}
