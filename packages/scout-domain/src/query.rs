use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One aggregated row of a user's search history inside the rolling window.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalQuery {
	pub query: String,
	pub search_count: u64,
	pub click_rate: f32,
	pub success_rate: f32,
	pub last_used: OffsetDateTime,
}

/// Per-(user, query) metrics stored next to the frequency counter.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct QueryStats {
	pub last_used_ms: i64,
	pub click_rate: f32,
	pub success_rate: f32,
}
impl QueryStats {
	pub fn touched(last_used_ms: i64) -> Self {
		Self { last_used_ms, click_rate: 0.0, success_rate: 0.0 }
	}

	/// Keeps known rates and moves the last-used timestamp forward.
	pub fn touch(self, now_ms: i64) -> Self {
		Self { last_used_ms: self.last_used_ms.max(now_ms), ..self }
	}
}

pub fn normalize_query(raw: &str) -> String {
	raw.trim().to_lowercase()
}

pub fn char_len(text: &str) -> usize {
	text.chars().count()
}

/// Every non-empty prefix of `text`, shortest first, cut on char boundaries.
pub fn prefixes(text: &str) -> impl Iterator<Item = &str> {
	text.char_indices().map(|(idx, ch)| &text[..idx + ch.len_utf8()])
}

pub fn unix_ms(at: OffsetDateTime) -> i64 {
	(at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Normalizes queries and folds duplicates together.
///
/// Counts are summed, the latest `last_used` wins, and rates are averaged weighted by count.
/// Output is ordered by query so replaying it is deterministic.
pub fn merge_history(entries: impl IntoIterator<Item = HistoricalQuery>) -> Vec<HistoricalQuery> {
	let mut merged: BTreeMap<String, HistoricalQuery> = BTreeMap::new();

	for entry in entries {
		let query = normalize_query(&entry.query);

		if query.is_empty() || entry.search_count == 0 {
			continue;
		}

		let click_rate = clamp_rate(entry.click_rate);
		let success_rate = clamp_rate(entry.success_rate);

		match merged.get_mut(&query) {
			Some(existing) => {
				let old_count = existing.search_count as f32;
				let new_count = entry.search_count as f32;
				let total = existing.search_count + entry.search_count;
				let weigh =
					|old: f32, new: f32| (old * old_count + new * new_count) / total as f32;

				existing.click_rate = weigh(existing.click_rate, click_rate);
				existing.success_rate = weigh(existing.success_rate, success_rate);
				existing.search_count = total;
				existing.last_used = existing.last_used.max(entry.last_used);
			},
			None => {
				merged.insert(
					query.clone(),
					HistoricalQuery {
						query,
						search_count: entry.search_count,
						click_rate,
						success_rate,
						last_used: entry.last_used,
					},
				);
			},
		}
	}

	merged.into_values().collect()
}

pub fn clamp_rate(rate: f32) -> f32 {
	if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 }
}
