use std::{
	io,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
	},
	time::Duration,
};

use scout_storage::{
	BoxFuture, Error, Result,
	cache::{KeyValueCache, MemoryCache},
};

/// Cache wrapper that can be switched off or slowed down mid-test.
///
/// While down every call fails without touching the inner cache, so state written before the
/// outage is still there once it comes back.
pub struct FlakyCache {
	inner: Arc<dyn KeyValueCache>,
	down: AtomicBool,
	delay_ms: AtomicU64,
	failures: AtomicUsize,
}
impl FlakyCache {
	pub fn new(inner: Arc<dyn KeyValueCache>) -> Self {
		Self {
			inner,
			down: AtomicBool::new(false),
			delay_ms: AtomicU64::new(0),
			failures: AtomicUsize::new(0),
		}
	}

	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryCache::new()))
	}

	pub fn set_down(&self, down: bool) {
		self.down.store(down, Ordering::SeqCst);
	}

	/// Delays every call, to exercise caller-side timeouts.
	pub fn set_delay(&self, delay: Duration) {
		self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
	}

	/// Number of calls rejected while down.
	pub fn failures(&self) -> usize {
		self.failures.load(Ordering::SeqCst)
	}

	pub fn inner(&self) -> &Arc<dyn KeyValueCache> {
		&self.inner
	}

	async fn guard(&self) -> Result<()> {
		let delay = self.delay_ms.load(Ordering::SeqCst);

		if delay > 0 {
			tokio::time::sleep(Duration::from_millis(delay)).await;
		}
		if self.down.load(Ordering::SeqCst) {
			self.failures.fetch_add(1, Ordering::SeqCst);

			return Err(Error::Io(io::Error::new(
				io::ErrorKind::ConnectionRefused,
				"Cache is unavailable.",
			)));
		}

		Ok(())
	}
}
impl KeyValueCache for FlakyCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.get(key).await
		})
	}

	fn set_ex<'a>(
		&'a self,
		key: &'a str,
		value: &'a [u8],
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.set_ex(key, value, ttl_secs).await
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.delete(key).await
		})
	}

	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.delete_prefix(prefix).await
		})
	}

	fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.expire(key, ttl_secs).await
		})
	}

	fn hget<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.hget(key, field).await
		})
	}

	fn hset<'a>(
		&'a self,
		key: &'a str,
		fields: &'a [(String, Vec<u8>)],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.hset(key, fields).await
		})
	}

	fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<(String, Vec<u8>)>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.hgetall(key).await
		})
	}

	fn hincr<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		delta: i64,
	) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.hincr(key, field, delta).await
		})
	}

	fn zadd<'a>(&'a self, key: &'a str, members: &'a [(String, f64)]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.zadd(key, members).await
		})
	}

	fn zincr<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		delta: f64,
	) -> BoxFuture<'a, Result<f64>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.zincr(key, member, delta).await
		})
	}

	fn zscore<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<Option<f64>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.zscore(key, member).await
		})
	}

	fn zrevrange<'a>(
		&'a self,
		key: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<(String, f64)>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.zrevrange(key, limit).await
		})
	}

	fn zrange_prefix<'a>(
		&'a self,
		key: &'a str,
		prefix: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.zrange_prefix(key, prefix, limit).await
		})
	}

	fn lpush_trim<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		max_len: usize,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.lpush_trim(key, value, max_len).await
		})
	}

	fn lrange<'a>(&'a self, key: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			self.guard().await?;
			self.inner.lrange(key, limit).await
		})
	}
}
