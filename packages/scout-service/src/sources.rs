//! Record and history sources: Postgres for deployments, in-memory for single-node runs and tests.

use std::{
	collections::BTreeMap,
	sync::{Mutex, PoisonError},
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, ExpertRecordSource, QueryHistoryStore};
use scout_domain::{ExpertRecord, HistoricalQuery, query::normalize_query};
use scout_storage::{db::Db, experts, history};

impl ExpertRecordSource for Db {
	fn fetch_experts<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<ExpertRecord>>> {
		Box::pin(async move { Ok(experts::fetch_experts(self).await?) })
	}
}

impl QueryHistoryStore for Db {
	fn fetch_history<'a>(
		&'a self,
		user_id: &'a str,
		since: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Vec<HistoricalQuery>>> {
		Box::pin(async move { Ok(history::fetch_history(self, user_id, since).await?) })
	}

	fn record_search<'a>(
		&'a self,
		user_id: &'a str,
		query: &'a str,
		result_count: u32,
	) -> BoxFuture<'a, color_eyre::Result<Uuid>> {
		Box::pin(async move { Ok(history::record_search(self, user_id, query, result_count).await?) })
	}

	fn record_click<'a>(
		&'a self,
		search_id: Uuid,
		expert_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async move { Ok(history::record_click(self, search_id, expert_id).await?) })
	}
}

/// Fixed expert corpus that can be swapped at runtime.
#[derive(Debug, Default)]
pub struct InMemoryExperts {
	records: Mutex<Vec<ExpertRecord>>,
}
impl InMemoryExperts {
	pub fn new(records: Vec<ExpertRecord>) -> Self {
		Self { records: Mutex::new(records) }
	}

	pub fn replace(&self, records: Vec<ExpertRecord>) {
		*self.records.lock().unwrap_or_else(PoisonError::into_inner) = records;
	}
}
impl ExpertRecordSource for InMemoryExperts {
	fn fetch_experts<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<ExpertRecord>>> {
		let records = self.records.lock().unwrap_or_else(PoisonError::into_inner).clone();

		Box::pin(async move { Ok(records) })
	}
}

#[derive(Clone, Debug)]
struct SearchEntry {
	search_id: Uuid,
	user_id: String,
	normalized_query: String,
	result_count: u32,
	clicked_expert_id: Option<String>,
	created_at: OffsetDateTime,
}

/// Search log kept in process memory, aggregated the same way as the `search_queries` table.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
	entries: Mutex<Vec<SearchEntry>>,
}
impl InMemoryHistory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a search with an explicit timestamp and click outcome.
	pub fn push(
		&self,
		user_id: &str,
		query: &str,
		result_count: u32,
		clicked_expert_id: Option<&str>,
		created_at: OffsetDateTime,
	) -> Uuid {
		let search_id = Uuid::new_v4();

		self.entries.lock().unwrap_or_else(PoisonError::into_inner).push(SearchEntry {
			search_id,
			user_id: user_id.to_string(),
			normalized_query: normalize_query(query),
			result_count,
			clicked_expert_id: clicked_expert_id.map(str::to_string),
			created_at,
		});

		search_id
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn aggregate(&self, user_id: &str, since: OffsetDateTime) -> Vec<HistoricalQuery> {
		let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		let mut grouped: BTreeMap<&str, (u64, u64, u64, OffsetDateTime)> = BTreeMap::new();

		for entry in entries.iter().filter(|entry| {
			entry.user_id == user_id && entry.created_at >= since && !entry.normalized_query.is_empty()
		}) {
			let slot = grouped
				.entry(entry.normalized_query.as_str())
				.or_insert((0, 0, 0, entry.created_at));

			slot.0 += 1;
			slot.1 += u64::from(entry.clicked_expert_id.is_some());
			slot.2 += u64::from(entry.result_count > 0);
			slot.3 = slot.3.max(entry.created_at);
		}

		grouped
			.into_iter()
			.map(|(query, (count, clicks, successes, last_used))| HistoricalQuery {
				query: query.to_string(),
				search_count: count,
				click_rate: clicks as f32 / count as f32,
				success_rate: successes as f32 / count as f32,
				last_used,
			})
			.collect()
	}
}
impl QueryHistoryStore for InMemoryHistory {
	fn fetch_history<'a>(
		&'a self,
		user_id: &'a str,
		since: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<Vec<HistoricalQuery>>> {
		let rows = self.aggregate(user_id, since);

		Box::pin(async move { Ok(rows) })
	}

	fn record_search<'a>(
		&'a self,
		user_id: &'a str,
		query: &'a str,
		result_count: u32,
	) -> BoxFuture<'a, color_eyre::Result<Uuid>> {
		let search_id = self.push(user_id, query, result_count, None, OffsetDateTime::now_utc());

		Box::pin(async move { Ok(search_id) })
	}

	fn record_click<'a>(
		&'a self,
		search_id: Uuid,
		expert_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<bool>> {
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		let found = match entries.iter_mut().find(|entry| entry.search_id == search_id) {
			Some(entry) => {
				entry.clicked_expert_id = Some(expert_id.to_string());

				true
			},
			None => false,
		};

		Box::pin(async move { Ok(found) })
	}
}
