//! Exact L2 index over expert embeddings.
//!
//! The published artifact on disk is the source of truth. Each process keeps an immutable
//! snapshot of the generation it last loaded and swaps it when the file's stamp changes, so
//! readers never observe vectors from one generation paired with ids from another.

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::{Arc, PoisonError, RwLock},
};

use crate::{Error, Result};
use scout_storage::artifact::{self, FileStamp, IndexArtifact, StoredArtifact};

#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
	pub expert_id: String,
	pub ordinal: usize,
	pub distance: f32,
}

#[derive(Debug)]
pub struct IndexSnapshot {
	artifact: IndexArtifact,
	checksum: String,
	stamp: FileStamp,
}
impl IndexSnapshot {
	pub fn artifact(&self) -> &IndexArtifact {
		&self.artifact
	}

	pub fn checksum(&self) -> &str {
		&self.checksum
	}

	pub fn len(&self) -> usize {
		self.artifact.len()
	}

	pub fn is_empty(&self) -> bool {
		self.artifact.is_empty()
	}

	/// Flat search over every row, nearest first. Equal distances keep ordinal order.
	pub fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
		if query.len() != self.artifact.dimension() {
			return Err(Error::Provider {
				message: format!(
					"Query vector has {} dimensions but the index has {}.",
					query.len(),
					self.artifact.dimension()
				),
			});
		}

		let mut scored: Vec<(usize, &str, f32)> = self
			.artifact
			.rows()
			.enumerate()
			.map(|(ordinal, (id, row))| (ordinal, id, l2_distance(query, row)))
			.collect();

		scored.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
		scored.truncate(limit);

		Ok(scored
			.into_iter()
			.map(|(ordinal, id, distance)| Neighbor { expert_id: id.to_string(), ordinal, distance })
			.collect())
	}
}

pub struct VectorIndex {
	path: PathBuf,
	embedder_id: String,
	current: RwLock<Option<Arc<IndexSnapshot>>>,
}
impl VectorIndex {
	pub fn new(path: PathBuf, embedder_id: String) -> Self {
		Self { path, embedder_id, current: RwLock::new(None) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn embedder_id(&self) -> &str {
		&self.embedder_id
	}

	/// Last snapshot loaded by this process, without checking the disk.
	pub fn loaded(&self) -> Option<Arc<IndexSnapshot>> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// [`Self::snapshot`] on the blocking pool, for callers running on the async runtime.
	pub async fn load_snapshot(self: &Arc<Self>) -> Result<Arc<IndexSnapshot>> {
		let index = self.clone();

		tokio::task::spawn_blocking(move || index.snapshot())
			.await
			.map_err(|err| unavailable(format!("Index load task failed: {err}.")))?
	}

	/// The published generation, reloaded when the artifact changed on disk. Touches the
	/// filesystem.
	pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
		let stamp = match artifact::stamp(&self.path) {
			Ok(stamp) => stamp,
			Err(scout_storage::Error::Io(err)) if err.kind() == ErrorKind::NotFound => {
				return Err(unavailable(format!(
					"Index artifact {} does not exist.",
					self.path.display()
				)));
			},
			Err(err) => return Err(unavailable(format!("Failed to stat index artifact: {err}."))),
		};

		if let Some(current) = self.loaded()
			&& current.stamp == stamp
		{
			return Ok(current);
		}

		let stored = artifact::load(&self.path)
			.map_err(|err| unavailable(format!("Failed to load index artifact: {err}.")))?;

		tracing::info!(
			path = %self.path.display(),
			count = stored.artifact.len(),
			generation = %stored.artifact.generation(),
			checksum = %stored.checksum,
			"Loaded index generation."
		);

		self.install(stored)
	}

	pub(crate) fn install(&self, stored: StoredArtifact) -> Result<Arc<IndexSnapshot>> {
		if stored.artifact.embedder_id() != self.embedder_id {
			return Err(unavailable(format!(
				"Index was built with embedder {} but {} is configured.",
				stored.artifact.embedder_id(),
				self.embedder_id
			)));
		}

		let StoredArtifact { artifact, checksum, stamp } = stored;
		let snapshot = Arc::new(IndexSnapshot { artifact, checksum, stamp });

		*self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());

		Ok(snapshot)
	}
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

fn unavailable(message: String) -> Error {
	Error::IndexUnavailable { message }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn snapshot(ids: &[&str], vectors: Vec<f32>, dimension: usize) -> IndexSnapshot {
		let artifact = IndexArtifact::new(
			"test:model:2",
			dimension,
			ids.iter().map(|id| id.to_string()).collect(),
			vectors,
		)
		.expect("Failed to build artifact.");

		IndexSnapshot {
			artifact,
			checksum: "abc".to_string(),
			stamp: FileStamp { modified: None, len: 0 },
		}
	}

	#[test]
	fn nearest_orders_by_distance_then_ordinal() {
		let snapshot = snapshot(&["a", "b", "c"], vec![3.0, 0.0, 1.0, 0.0, 1.0, 0.0], 2);
		let neighbors = snapshot.nearest(&[0.0, 0.0], 3).expect("Search failed.");
		let ids: Vec<&str> = neighbors.iter().map(|n| n.expert_id.as_str()).collect();

		assert_eq!(ids, vec!["b", "c", "a"]);
		assert!((neighbors[2].distance - 3.0).abs() < 1e-6);
	}

	#[test]
	fn nearest_respects_limit() {
		let snapshot = snapshot(&["a", "b", "c"], vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0], 2);
		let neighbors = snapshot.nearest(&[0.0, 0.0], 2).expect("Search failed.");

		assert_eq!(neighbors.len(), 2);
		assert_eq!(neighbors[0].expert_id, "a");
	}

	#[test]
	fn nearest_rejects_dimension_mismatch() {
		let snapshot = snapshot(&["a"], vec![0.0, 0.0], 2);

		assert!(matches!(snapshot.nearest(&[0.0], 1), Err(Error::Provider { .. })));
	}

	#[test]
	fn missing_artifact_is_unavailable() {
		let index = VectorIndex::new(PathBuf::from("/nonexistent/scout/experts.scix"), "x".into());

		assert!(matches!(index.snapshot(), Err(Error::IndexUnavailable { .. })));
		assert!(index.loaded().is_none());
	}

	#[tokio::test]
	async fn load_snapshot_picks_up_published_generations() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");
		let path = dir.path().join("experts.scix");
		let index = Arc::new(VectorIndex::new(path.clone(), "test:model:2".into()));

		assert!(matches!(index.load_snapshot().await, Err(Error::IndexUnavailable { .. })));

		let artifact = IndexArtifact::new("test:model:2", 2, vec!["a".into()], vec![0.0, 1.0])
			.expect("Failed to build artifact.");
		let published = artifact::publish(&path, artifact).expect("Failed to publish.");
		let loaded = index.load_snapshot().await.expect("Failed to load snapshot.");

		assert_eq!(loaded.checksum(), published.checksum);
		assert!(index.loaded().is_some());
	}
}
