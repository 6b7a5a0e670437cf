//! Remote key-value cache used for expert metadata and prediction state.
//!
//! The trait mirrors the small Redis surface this system needs. Callers own timeouts and fallback;
//! backends report every failure as an error and never retry.

pub mod memory;
pub mod remote;

pub use memory::MemoryCache;
pub use remote::RedisCache;

use crate::{BoxFuture, Result};

pub trait KeyValueCache: Send + Sync {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

	/// Sets a string value. A zero TTL stores it without expiry.
	fn set_ex<'a>(
		&'a self,
		key: &'a str,
		value: &'a [u8],
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

	/// Deletes every key starting with `prefix`. Returns the number of keys removed.
	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>>;

	/// Returns false when the key does not exist.
	fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<bool>>;

	fn hget<'a>(&'a self, key: &'a str, field: &'a str)
	-> BoxFuture<'a, Result<Option<Vec<u8>>>>;

	fn hset<'a>(
		&'a self,
		key: &'a str,
		fields: &'a [(String, Vec<u8>)],
	) -> BoxFuture<'a, Result<()>>;

	fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<(String, Vec<u8>)>>>;

	fn hincr<'a>(&'a self, key: &'a str, field: &'a str, delta: i64)
	-> BoxFuture<'a, Result<i64>>;

	fn zadd<'a>(&'a self, key: &'a str, members: &'a [(String, f64)]) -> BoxFuture<'a, Result<()>>;

	fn zincr<'a>(&'a self, key: &'a str, member: &'a str, delta: f64)
	-> BoxFuture<'a, Result<f64>>;

	fn zscore<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<Option<f64>>>;

	/// Highest-scored members first, at most `limit`.
	fn zrevrange<'a>(
		&'a self,
		key: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<(String, f64)>>>;

	/// Members starting with `prefix` in lexicographic order. Intended for sets whose members
	/// all share one score.
	fn zrange_prefix<'a>(
		&'a self,
		key: &'a str,
		prefix: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>>;

	/// Pushes to the head of a list and trims it to `max_len` entries, dropping the oldest.
	fn lpush_trim<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		max_len: usize,
	) -> BoxFuture<'a, Result<()>>;

	/// Newest entries first, at most `limit`.
	fn lrange<'a>(&'a self, key: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<String>>>;
}
