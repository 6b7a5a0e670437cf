use std::{
	collections::{HashMap, VecDeque, hash_map::Entry as MapEntry},
	sync::{
		Mutex,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use crate::{BoxFuture, Error, Result, cache::KeyValueCache};

/// Every this many operations, expired entries are purged even if nothing touches them again.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug)]
enum Slot {
	Bytes(Vec<u8>),
	Hash(HashMap<String, Vec<u8>>),
	ZSet(HashMap<String, f64>),
	List(VecDeque<String>),
}
impl Slot {
	fn kind(&self) -> &'static str {
		match self {
			Self::Bytes(_) => "string",
			Self::Hash(_) => "hash",
			Self::ZSet(_) => "zset",
			Self::List(_) => "list",
		}
	}
}

#[derive(Debug)]
struct Entry {
	slot: Slot,
	expires_at: Option<Instant>,
}
impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// In-process cache with Redis-like semantics. Expired keys are dropped when touched and by a
/// periodic sweep.
#[derive(Debug, Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, Entry>>,
	ops: AtomicU64,
}
impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.with_entries(|entries| {
			purge_expired(entries);

			Ok(entries.len())
		})
		.unwrap_or_default()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<R>) -> Result<R> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
			purge_expired(&mut entries);
		}

		f(&mut entries)
	}

	fn read<R>(&self, key: &str, f: impl FnOnce(Option<&Slot>) -> Result<R>) -> Result<R> {
		self.with_entries(|entries| f(live(entries, key).map(|entry| &entry.slot)))
	}

	fn write<R>(
		&self,
		key: &str,
		create: impl FnOnce() -> Slot,
		f: impl FnOnce(&mut Slot) -> Result<R>,
	) -> Result<R> {
		self.with_entries(|entries| {
			live(entries, key);

			let entry = entries
				.entry(key.to_string())
				.or_insert_with(|| Entry { slot: create(), expires_at: None });

			f(&mut entry.slot)
		})
	}
}
impl KeyValueCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(None),
			Some(Slot::Bytes(value)) => Ok(Some(value.clone())),
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn set_ex<'a>(
		&'a self,
		key: &'a str,
		value: &'a [u8],
		ttl_secs: u64,
	) -> BoxFuture<'a, Result<()>> {
		let result = self.with_entries(|entries| {
			entries.insert(
				key.to_string(),
				Entry { slot: Slot::Bytes(value.to_vec()), expires_at: deadline(ttl_secs) },
			);

			Ok(())
		});

		Box::pin(async move { result })
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
		let result = self.with_entries(|entries| {
			let now = Instant::now();

			Ok(entries.remove(key).is_some_and(|entry| !entry.is_expired(now)))
		});

		Box::pin(async move { result })
	}

	fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<u64>> {
		let result = self.with_entries(|entries| {
			let now = Instant::now();
			let before = entries.len();
			let mut expired = 0;

			entries.retain(|key, entry| {
				if !key.starts_with(prefix) {
					return true;
				}
				if entry.is_expired(now) {
					expired += 1;
				}

				false
			});

			Ok((before - entries.len() - expired) as u64)
		});

		Box::pin(async move { result })
	}

	fn expire<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<bool>> {
		let result = self.with_entries(|entries| {
			Ok(match live(entries, key) {
				Some(entry) => {
					entry.expires_at = deadline(ttl_secs);

					true
				},
				None => false,
			})
		});

		Box::pin(async move { result })
	}

	fn hget<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(None),
			Some(Slot::Hash(map)) => Ok(map.get(field).cloned()),
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn hset<'a>(
		&'a self,
		key: &'a str,
		fields: &'a [(String, Vec<u8>)],
	) -> BoxFuture<'a, Result<()>> {
		let result = self.write(
			key,
			|| Slot::Hash(HashMap::new()),
			|slot| match slot {
				Slot::Hash(map) => {
					for (field, value) in fields {
						map.insert(field.clone(), value.clone());
					}

					Ok(())
				},
				other => Err(wrong_type(key, other)),
			},
		);

		Box::pin(async move { result })
	}

	fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<(String, Vec<u8>)>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(Vec::new()),
			Some(Slot::Hash(map)) =>
				Ok(map.iter().map(|(field, value)| (field.clone(), value.clone())).collect()),
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn hincr<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		delta: i64,
	) -> BoxFuture<'a, Result<i64>> {
		let result = self.write(
			key,
			|| Slot::Hash(HashMap::new()),
			|slot| match slot {
				Slot::Hash(map) => {
					let current = match map.get(field) {
						Some(raw) => parse_i64(raw)?,
						None => 0,
					};
					let next = current.checked_add(delta).ok_or_else(|| {
						Error::InvalidArgument("Increment would overflow.".to_string())
					})?;

					map.insert(field.to_string(), next.to_string().into_bytes());

					Ok(next)
				},
				other => Err(wrong_type(key, other)),
			},
		);

		Box::pin(async move { result })
	}

	fn zadd<'a>(&'a self, key: &'a str, members: &'a [(String, f64)]) -> BoxFuture<'a, Result<()>> {
		let result = self.write(
			key,
			|| Slot::ZSet(HashMap::new()),
			|slot| match slot {
				Slot::ZSet(set) => {
					for (member, score) in members {
						set.insert(member.clone(), *score);
					}

					Ok(())
				},
				other => Err(wrong_type(key, other)),
			},
		);

		Box::pin(async move { result })
	}

	fn zincr<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		delta: f64,
	) -> BoxFuture<'a, Result<f64>> {
		let result = self.write(
			key,
			|| Slot::ZSet(HashMap::new()),
			|slot| match slot {
				Slot::ZSet(set) => {
					let score = set.entry(member.to_string()).or_insert(0.0);

					*score += delta;

					Ok(*score)
				},
				other => Err(wrong_type(key, other)),
			},
		);

		Box::pin(async move { result })
	}

	fn zscore<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<Option<f64>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(None),
			Some(Slot::ZSet(set)) => Ok(set.get(member).copied()),
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn zrevrange<'a>(
		&'a self,
		key: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<(String, f64)>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(Vec::new()),
			Some(Slot::ZSet(set)) => {
				let mut members: Vec<(String, f64)> =
					set.iter().map(|(member, score)| (member.clone(), *score)).collect();

				// Redis breaks score ties in reverse lexicographic order.
				members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
				members.truncate(limit);

				Ok(members)
			},
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn zrange_prefix<'a>(
		&'a self,
		key: &'a str,
		prefix: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(Vec::new()),
			Some(Slot::ZSet(set)) => {
				let mut members: Vec<(&String, f64)> = set
					.iter()
					.filter(|(member, _)| member.starts_with(prefix))
					.map(|(member, score)| (member, *score))
					.collect();

				members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

				Ok(members.into_iter().take(limit).map(|(member, _)| member.clone()).collect())
			},
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}

	fn lpush_trim<'a>(
		&'a self,
		key: &'a str,
		value: &'a str,
		max_len: usize,
	) -> BoxFuture<'a, Result<()>> {
		let result = if max_len == 0 {
			Err(Error::InvalidArgument("List length bound must be greater than zero.".to_string()))
		} else {
			self.write(
				key,
				|| Slot::List(VecDeque::new()),
				|slot| match slot {
					Slot::List(list) => {
						list.push_front(value.to_string());
						list.truncate(max_len);

						Ok(())
					},
					other => Err(wrong_type(key, other)),
				},
			)
		};

		Box::pin(async move { result })
	}

	fn lrange<'a>(&'a self, key: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<String>>> {
		let result = self.read(key, |slot| match slot {
			None => Ok(Vec::new()),
			Some(Slot::List(list)) => Ok(list.iter().take(limit).cloned().collect()),
			Some(other) => Err(wrong_type(key, other)),
		});

		Box::pin(async move { result })
	}
}

fn purge_expired(entries: &mut HashMap<String, Entry>) {
	let now = Instant::now();

	entries.retain(|_, entry| !entry.is_expired(now));
}

/// Returns the live entry for `key`, dropping it first if it has expired.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
	let now = Instant::now();

	match entries.entry(key.to_string()) {
		MapEntry::Occupied(occupied) if occupied.get().is_expired(now) => {
			occupied.remove();

			None
		},
		MapEntry::Occupied(occupied) => Some(occupied.into_mut()),
		MapEntry::Vacant(_) => None,
	}
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
	if ttl_secs == 0 {
		return None;
	}

	Instant::now().checked_add(Duration::from_secs(ttl_secs))
}

fn parse_i64(raw: &[u8]) -> Result<i64> {
	std::str::from_utf8(raw)
		.ok()
		.and_then(|text| text.parse().ok())
		.ok_or_else(|| Error::InvalidArgument("Hash value is not an integer.".to_string()))
}

fn wrong_type(key: &str, slot: &Slot) -> Error {
	Error::InvalidArgument(format!("Key {key:?} holds a {} value.", slot.kind()))
}
