//! Per-expert vector and display metadata mirrored into the remote cache.
//!
//! Layout: hash `{ns}:expert:{id}` with field `vector` (little-endian f32 bytes) and field
//! `metadata` (JSON [`ExpertMetadata`]). Rebuilds overwrite both fields together.

use crate::guarded::GuardedCache;
use scout_domain::ExpertMetadata;

const VECTOR_FIELD: &str = "vector";
const METADATA_FIELD: &str = "metadata";

#[derive(Clone, Debug, PartialEq)]
pub struct CachedExpert {
	pub vector: Vec<f32>,
	pub metadata: ExpertMetadata,
}

#[derive(Debug)]
pub enum MetadataLookup {
	Hit(CachedExpert),
	/// No entry, or an entry whose payload failed validation.
	Miss,
	/// The cache did not answer in time.
	Unavailable,
}

pub struct VectorMetadataStore {
	cache: GuardedCache,
}
impl VectorMetadataStore {
	pub fn new(cache: GuardedCache) -> Self {
		Self { cache }
	}

	fn key(&self, expert_id: &str) -> String {
		self.cache.key(&format!("expert:{expert_id}"))
	}

	/// Returns false when the write did not land.
	pub async fn put(&self, metadata: &ExpertMetadata, vector: &[f32]) -> bool {
		let payload = match serde_json::to_vec(metadata) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(
					expert_id = %metadata.id,
					error = %err,
					"Failed to encode expert metadata."
				);

				return false;
			},
		};
		let key = self.key(&metadata.id);
		let fields =
			[(VECTOR_FIELD.to_string(), encode_vector(vector)), (METADATA_FIELD.to_string(), payload)];

		self.cache.call("hset", self.cache.cache().hset(&key, &fields)).await.is_some()
	}

	pub async fn get(&self, expert_id: &str) -> MetadataLookup {
		let key = self.key(expert_id);
		let Some(fields) = self.cache.call("hgetall", self.cache.cache().hgetall(&key)).await else {
			return MetadataLookup::Unavailable;
		};

		if fields.is_empty() {
			return MetadataLookup::Miss;
		}

		match decode_entry(expert_id, fields) {
			Ok(entry) => MetadataLookup::Hit(entry),
			Err(message) => {
				tracing::warn!(expert_id, reason = %message, "Rejected malformed expert metadata.");

				MetadataLookup::Miss
			},
		}
	}

	pub async fn remove(&self, expert_id: &str) -> bool {
		let key = self.key(expert_id);

		self.cache.call("del", self.cache.cache().delete(&key)).await.unwrap_or(false)
	}
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
	vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
	if bytes.len() % 4 != 0 {
		return None;
	}

	Some(
		bytes
			.chunks_exact(4)
			.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
			.collect(),
	)
}

fn decode_entry(
	expert_id: &str,
	fields: Vec<(String, Vec<u8>)>,
) -> std::result::Result<CachedExpert, String> {
	let mut vector = None;
	let mut metadata = None;

	for (field, value) in fields {
		match field.as_str() {
			VECTOR_FIELD => vector = Some(value),
			METADATA_FIELD => metadata = Some(value),
			_ => {},
		}
	}

	let vector = vector.ok_or("missing vector field")?;
	let vector = decode_vector(&vector).ok_or("vector bytes are not a whole number of f32s")?;
	let metadata = metadata.ok_or("missing metadata field")?;
	let metadata: ExpertMetadata =
		serde_json::from_slice(&metadata).map_err(|err| format!("invalid metadata JSON: {err}"))?;

	if metadata.id != expert_id {
		return Err(format!("metadata belongs to expert {}", metadata.id));
	}

	Ok(CachedExpert { vector, metadata })
}
