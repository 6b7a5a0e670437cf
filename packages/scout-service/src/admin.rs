use std::{collections::HashSet, sync::atomic::Ordering};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ScoutService};
use scout_domain::{ExpertMetadata, ExpertRecord, corpus};
use scout_storage::artifact::{self, IndexArtifact};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RebuildReport {
	pub indexed_count: u64,
	pub skipped_count: u64,
	pub metadata_error_count: u64,
	pub removed_count: u64,
	pub checksum: String,
}

impl ScoutService {
	/// Rebuilds the index from the record source and publishes it as a new generation.
	///
	/// Rebuilds are serialized. On any error the previously published artifact stays in place.
	pub async fn rebuild_index(&self) -> Result<RebuildReport> {
		let _guard = self.rebuild_lock.lock().await;

		self.abort.store(false, Ordering::SeqCst);

		let result = self.rebuild_locked().await;

		match &result {
			Ok(report) => tracing::info!(
				indexed = report.indexed_count,
				skipped = report.skipped_count,
				metadata_errors = report.metadata_error_count,
				removed = report.removed_count,
				checksum = %report.checksum,
				"Index rebuild finished."
			),
			Err(Error::BuildAborted) => tracing::warn!("Index rebuild aborted."),
			Err(err) => tracing::error!(error = %err, "Index rebuild failed."),
		}

		result
	}

	/// Asks an in-flight rebuild to stop at its next batch boundary.
	pub fn abort_rebuild(&self) {
		self.abort.store(true, Ordering::SeqCst);
	}

	async fn rebuild_locked(&self) -> Result<RebuildReport> {
		let records = self.sources.experts.fetch_experts().await.map_err(Error::storage)?;
		let (records, skipped_count) = dedup_records(records);

		if records.is_empty() {
			return Err(Error::BuildFailed { message: "No expert records to index.".to_string() });
		}

		let vectors = self.embed_records(&records).await?;

		self.check_abort()?;

		let mut metadata_error_count = 0_u64;

		for (record, vector) in records.iter().zip(&vectors) {
			if !self.metadata.put(&ExpertMetadata::from(record), vector).await {
				metadata_error_count += 1;
			}
		}

		let ids: Vec<String> = records.iter().map(|record| record.id.clone()).collect();
		let dimension = self.cfg.providers.embedding.dimensions as usize;
		let artifact =
			IndexArtifact::new(self.index.embedder_id(), dimension, ids, vectors.concat())
				.map_err(|err| Error::BuildFailed { message: err.to_string() })?;
		let previous = self.index.load_snapshot().await.ok().or_else(|| self.index.loaded());
		let path = self.index.path().to_path_buf();
		let stored = tokio::task::spawn_blocking(move || artifact::publish(&path, artifact))
			.await
			.map_err(|err| Error::Storage { message: format!("Publish task failed: {err}.") })??;
		let snapshot = self.index.install(stored)?;
		let mut removed_count = 0_u64;

		if let Some(previous) = previous {
			let current: HashSet<&str> =
				snapshot.artifact().ids().iter().map(String::as_str).collect();
			let stale = previous.artifact().ids().iter().filter(|id| !current.contains(id.as_str()));

			for id in stale {
				if self.metadata.remove(id).await {
					removed_count += 1;
				}
			}
		}

		Ok(RebuildReport {
			indexed_count: snapshot.len() as u64,
			skipped_count,
			metadata_error_count,
			removed_count,
			checksum: snapshot.checksum().to_string(),
		})
	}

	async fn embed_records(&self, records: &[ExpertRecord]) -> Result<Vec<Vec<f32>>> {
		let cfg = &self.cfg.providers.embedding;
		let batch_size = self.cfg.storage.index.embed_batch_size.max(1) as usize;
		let dimension = cfg.dimensions as usize;
		let mut vectors = Vec::with_capacity(records.len());

		for batch in records.chunks(batch_size) {
			self.check_abort()?;

			let texts: Vec<String> = batch.iter().map(corpus::build_text).collect();
			let embedded = self.providers.embedding.embed(cfg, &texts).await.map_err(Error::provider)?;

			if embedded.len() != texts.len() {
				return Err(Error::BuildFailed {
					message: format!(
						"Embedding provider returned {} vectors for {} texts.",
						embedded.len(),
						texts.len()
					),
				});
			}

			for (record, vector) in batch.iter().zip(embedded) {
				if vector.len() != dimension {
					return Err(Error::BuildFailed {
						message: format!(
							"Expert {} embedded to {} dimensions; expected {dimension}.",
							record.id,
							vector.len()
						),
					});
				}

				vectors.push(vector);
			}
		}

		Ok(vectors)
	}

	fn check_abort(&self) -> Result<()> {
		if self.abort.load(Ordering::SeqCst) {
			return Err(Error::BuildAborted);
		}

		Ok(())
	}
}

/// Drops records with an empty id and keeps the first of each duplicate id.
fn dedup_records(records: Vec<ExpertRecord>) -> (Vec<ExpertRecord>, u64) {
	let mut seen = HashSet::new();
	let mut kept = Vec::with_capacity(records.len());
	let mut skipped = 0_u64;

	for mut record in records {
		record.id = record.id.trim().to_string();

		if record.id.is_empty() {
			skipped += 1;

			continue;
		}
		if !seen.insert(record.id.clone()) {
			tracing::warn!(expert_id = %record.id, "Skipping duplicate expert id.");

			continue;
		}

		kept.push(record);
	}

	(kept, skipped)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dedup_skips_blank_ids_and_keeps_first_duplicate() {
		let record = |id: &str, name: &str| ExpertRecord {
			id: id.to_string(),
			first_name: Some(name.to_string()),
			..Default::default()
		};
		let (kept, skipped) = dedup_records(vec![
			record("1", "first"),
			record("  ", "blank"),
			record("1", "second"),
			record("2", "other"),
		]);

		assert_eq!(skipped, 1);
		assert_eq!(kept.len(), 2);
		assert_eq!(kept[0].first_name.as_deref(), Some("first"));
		assert_eq!(kept[1].id, "2");
	}
}
