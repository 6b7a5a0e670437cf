use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::prediction::trie::PrefixTrie;
use scout_domain::QueryStats;

/// Everything the predictor knows about one user without the remote cache.
#[derive(Debug)]
pub struct LocalUserState {
	pub trie: PrefixTrie,
	freq: HashMap<String, u64>,
	stats: HashMap<String, QueryStats>,
	recent: VecDeque<String>,
	max_recent: usize,
}
impl LocalUserState {
	fn new(max_recent: usize) -> Self {
		Self {
			trie: PrefixTrie::new(),
			freq: HashMap::new(),
			stats: HashMap::new(),
			recent: VecDeque::new(),
			max_recent,
		}
	}

	/// Records one use of `query` at `now_ms`. Returns the new count.
	pub fn record(&mut self, query: &str, now_ms: i64) -> u64 {
		let count = self.freq.entry(query.to_string()).or_default();

		*count += 1;

		let count = *count;
		let stats = match self.stats.get(query) {
			Some(stats) => stats.touch(now_ms),
			None => QueryStats::touched(now_ms),
		};

		self.stats.insert(query.to_string(), stats);
		self.trie.insert(query);
		self.push_recent(query);

		count
	}

	/// Seeds state for one historical query during training.
	pub fn seed(&mut self, query: &str, count: u64, stats: QueryStats) {
		self.freq.insert(query.to_string(), count);
		self.stats.insert(query.to_string(), stats);
		self.trie.insert(query);
	}

	pub fn set_stats(&mut self, query: &str, stats: QueryStats) {
		self.stats.insert(query.to_string(), stats);
	}

	pub fn push_recent(&mut self, query: &str) {
		self.recent.push_front(query.to_string());
		self.recent.truncate(self.max_recent);
	}

	pub fn frequency(&self, query: &str) -> u64 {
		self.freq.get(query).copied().unwrap_or_default()
	}

	pub fn stats(&self, query: &str) -> Option<QueryStats> {
		self.stats.get(query).copied()
	}

	/// Newest first.
	pub fn recent(&self, limit: usize) -> Vec<String> {
		self.recent.iter().take(limit).cloned().collect()
	}

	pub fn reset(&mut self) {
		let max_recent = self.max_recent;

		*self = Self::new(max_recent);
	}
}

/// Per-user local state, each behind its own async lock.
///
/// Holding a user's guard serializes every prediction operation for that user while leaving other
/// users independent.
pub struct LocalUserStore {
	users: Mutex<HashMap<String, Arc<AsyncMutex<LocalUserState>>>>,
	max_recent: usize,
}
impl LocalUserStore {
	pub fn new(max_recent: usize) -> Self {
		Self { users: Mutex::new(HashMap::new()), max_recent }
	}

	/// Locks `user_id`'s state, creating it on first use.
	pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<LocalUserState> {
		let slot = {
			let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);

			users
				.entry(user_id.to_string())
				.or_insert_with(|| Arc::new(AsyncMutex::new(LocalUserState::new(self.max_recent))))
				.clone()
		};

		slot.lock_owned().await
	}

	pub fn user_count(&self) -> usize {
		self.users.lock().unwrap_or_else(PoisonError::into_inner).len()
	}
}
