use std::{collections::HashMap, time::Duration};

use redis::{Client, aio::ConnectionManager};

use crate::{BoxFuture, Error, Result, cache::KeyValueCache};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SCAN_BATCH: usize = 200;

/// Redis-backed cache over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisCache {
	manager: ConnectionManager,
}
impl RedisCache {
	pub async fn connect(cfg: &scout_config::Redis) -> Result<Self> {
		let client = Client::open(cfg.url.as_str())?;
		let manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
			.await
			.map_err(|_| Error::Timeout(format!("Connecting to Redis at {}.", redacted(&cfg.url))))??;

		Ok(Self { manager })
	}

	fn conn(&self) -> ConnectionManager {
		self.manager.clone()
	}
}
impl KeyValueCache for RedisCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

			Ok(value)
		})
	}

	fn set_ex<'a>(
		&'a self,
		key: &'a str,
		value: &'a [u8],
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let mut cmd = redis::cmd("SET");

			cmd.arg(key).arg(value);

			if ttl_secs > 0 {
				cmd.arg("EX").arg(ttl_secs);
			}

			let _: () = cmd.query_async(&mut conn).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;

			Ok(removed > 0)
		})
	}

	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let pattern = format!("{}*", escape_glob(prefix));
			let mut cursor: u64 = 0;
			let mut removed: u64 = 0;

			loop {
				let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
					.arg(cursor)
					.arg("MATCH")
					.arg(&pattern)
					.arg("COUNT")
					.arg(SCAN_BATCH)
					.query_async(&mut conn)
					.await?;

				if !keys.is_empty() {
					let count: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;

					removed += count;
				}
				if next == 0 {
					break;
				}

				cursor = next;
			}

			Ok(removed)
		})
	}

	fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let applied: i64 =
				redis::cmd("EXPIRE").arg(key).arg(ttl_secs).query_async(&mut conn).await?;

			Ok(applied == 1)
		})
	}

	fn hget<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let value: Option<Vec<u8>> =
				redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn).await?;

			Ok(value)
		})
	}

	fn hset<'a>(
		&'a self,
		key: &'a str,
		fields: &'a [(String, Vec<u8>)],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if fields.is_empty() {
				return Ok(());
			}

			let mut conn = self.conn();
			let mut cmd = redis::cmd("HSET");

			cmd.arg(key);

			for (field, value) in fields {
				cmd.arg(field).arg(value.as_slice());
			}

			let _: i64 = cmd.query_async(&mut conn).await?;

			Ok(())
		})
	}

	fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<(String, Vec<u8>)>>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let map: HashMap<String, Vec<u8>> =
				redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;

			Ok(map.into_iter().collect())
		})
	}

	fn hincr<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		delta: i64,
	) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let value: i64 =
				redis::cmd("HINCRBY").arg(key).arg(field).arg(delta).query_async(&mut conn).await?;

			Ok(value)
		})
	}

	fn zadd<'a>(&'a self, key: &'a str, members: &'a [(String, f64)]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if members.is_empty() {
				return Ok(());
			}

			let mut conn = self.conn();
			let mut cmd = redis::cmd("ZADD");

			cmd.arg(key);

			for (member, score) in members {
				cmd.arg(*score).arg(member);
			}

			let _: i64 = cmd.query_async(&mut conn).await?;

			Ok(())
		})
	}

	fn zincr<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		delta: f64,
	) -> BoxFuture<'a, Result<f64>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let score: f64 =
				redis::cmd("ZINCRBY").arg(key).arg(delta).arg(member).query_async(&mut conn).await?;

			Ok(score)
		})
	}

	fn zscore<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<Option<f64>>> {
		Box::pin(async move {
			let mut conn = self.conn();
			let score: Option<f64> =
				redis::cmd("ZSCORE").arg(key).arg(member).query_async(&mut conn).await?;

			Ok(score)
		})
	}

	fn zrevrange<'a>(
		&'a self,
		key: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<(String, f64)>>> {
		Box::pin(async move {
			if limit == 0 {
				return Ok(Vec::new());
			}

			let mut conn = self.conn();
			let members: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
				.arg(key)
				.arg(0)
				.arg(limit as i64 - 1)
				.arg("WITHSCORES")
				.query_async(&mut conn)
				.await?;

			Ok(members)
		})
	}

	fn zrange_prefix<'a>(
		&'a self,
		key: &'a str,
		prefix: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if limit == 0 {
				return Ok(Vec::new());
			}

			let mut conn = self.conn();
			let mut min = Vec::with_capacity(prefix.len() + 1);
			let mut max = Vec::with_capacity(prefix.len() + 2);

			min.push(b'[');
			min.extend_from_slice(prefix.as_bytes());
			max.push(b'[');
			max.extend_from_slice(prefix.as_bytes());
			// 0xFF never occurs in UTF-8, so it sorts after every member sharing the prefix.
			max.push(0xFF);

			let members: Vec<String> = redis::cmd("ZRANGEBYLEX")
				.arg(key)
				.arg(min)
				.arg(max)
				.arg("LIMIT")
				.arg(0)
				.arg(limit)
				.query_async(&mut conn)
				.await?;

			Ok(members)
		})
	}

	fn lpush_trim<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		max_len: usize,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if max_len == 0 {
				return Err(Error::InvalidArgument(
					"List length bound must be greater than zero.".to_string(),
				));
			}

			let mut conn = self.conn();
			let _: () = redis::pipe()
				.atomic()
				.cmd("LPUSH")
				.arg(key)
				.arg(value)
				.ignore()
				.cmd("LTRIM")
				.arg(key)
				.arg(0)
				.arg(max_len as i64 - 1)
				.ignore()
				.query_async(&mut conn)
				.await?;

			Ok(())
		})
	}

	fn lrange<'a>(&'a self, key: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if limit == 0 {
				return Ok(Vec::new());
			}

			let mut conn = self.conn();
			let values: Vec<String> = redis::cmd("LRANGE")
				.arg(key)
				.arg(0)
				.arg(limit as i64 - 1)
				.query_async(&mut conn)
				.await?;

			Ok(values)
		})
	}
}

/// Escapes Redis glob metacharacters so a key prefix matches literally.
fn escape_glob(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

fn redacted(url: &str) -> String {
	match url.split_once('@') {
		Some((_, host)) => format!("redis://***@{host}"),
		None => url.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn glob_metacharacters_are_escaped() {
		assert_eq!(escape_glob("scout:user:a*b?[c]:"), "scout:user:a\\*b\\?\\[c\\]:");
	}

	#[test]
	fn credentials_are_redacted() {
		assert_eq!(redacted("redis://user:pw@host:6379/0"), "redis://***@host:6379/0");
		assert_eq!(redacted("redis://host:6379"), "redis://host:6379");
	}
}
