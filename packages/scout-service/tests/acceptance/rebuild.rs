use std::{
	fs,
	sync::{Arc, atomic::Ordering},
};

use super::{FixedDimEmbedder, GatedEmbedder, HashEmbedder, harness, harness_with};
use scout_domain::ExpertRecord;
use scout_service::{Error, SearchRequest};
use scout_storage::cache::KeyValueCache;

#[tokio::test]
async fn rebuild_publishes_artifact_and_reports_counts() {
	let harness = harness();
	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.indexed_count, 3);
	assert_eq!(report.skipped_count, 0);
	assert_eq!(report.metadata_error_count, 0);
	assert_eq!(report.removed_count, 0);
	assert_eq!(report.checksum.len(), 64);
	assert!(harness.service.index().path().exists());

	let snapshot = harness.service.index().snapshot().expect("Snapshot failed.");

	assert_eq!(snapshot.checksum(), report.checksum);
	assert_eq!(snapshot.artifact().ids(), ["1", "2", "3"]);

	for id in ["1", "2", "3"] {
		let fields = harness
			.cache
			.inner()
			.hgetall(&format!("scout:expert:{id}"))
			.await
			.expect("Read failed.");

		assert_eq!(fields.len(), 2, "Expert {id} is missing cached fields.");
	}
}

#[tokio::test]
async fn empty_corpus_fails_and_keeps_previous_artifact() {
	let harness = harness();
	let first = harness.service.rebuild_index().await.expect("Rebuild failed.");
	let bytes = fs::read(harness.service.index().path()).expect("Read failed.");

	harness.experts.replace(Vec::new());

	let err = harness.service.rebuild_index().await.expect_err("Empty rebuild should fail.");

	assert!(matches!(err, Error::BuildFailed { .. }), "Unexpected error: {err:?}.");
	assert_eq!(fs::read(harness.service.index().path()).expect("Read failed."), bytes);
	assert_eq!(
		harness.service.index().snapshot().expect("Snapshot failed.").checksum(),
		first.checksum
	);
}

#[tokio::test]
async fn blank_and_duplicate_ids_are_not_indexed() {
	let mut records = scout_testkit::sample_experts();

	records.push(ExpertRecord { id: "  ".to_string(), ..Default::default() });
	records.push(scout_testkit::expert("1", "Impostor", "policy", true));

	let harness = harness_with(records, HashEmbedder::new(), |_| {});
	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.indexed_count, 3);
	assert_eq!(report.skipped_count, 1);

	let matches = harness
		.service
		.search(&SearchRequest {
			query: "Alice".to_string(),
			k: Some(3),
			active_only: Some(false),
		})
		.await
		.expect("Search failed.");
	let alice = matches.iter().find(|m| m.id == "1").expect("Missing expert 1.");

	assert_eq!(alice.metadata.first_name, "Alice");
}

#[tokio::test]
async fn rebuild_removes_metadata_of_departed_experts() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");
	harness.experts.replace(scout_testkit::sample_experts().into_iter().take(2).collect());

	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.indexed_count, 2);
	assert_eq!(report.removed_count, 1);
	assert!(
		harness.cache.inner().hgetall("scout:expert:3").await.expect("Read failed.").is_empty()
	);
}

#[tokio::test]
async fn wrong_dimension_vectors_fail_the_build() {
	let harness =
		harness_with(scout_testkit::sample_experts(), Arc::new(FixedDimEmbedder(3)), |_| {});
	let err = harness.service.rebuild_index().await.expect_err("Build should fail.");

	assert!(matches!(err, Error::BuildFailed { .. }), "Unexpected error: {err:?}.");
	assert!(!harness.service.index().path().exists());
}

#[tokio::test]
async fn abort_stops_rebuild_and_keeps_previous_artifact() {
	let embedder = GatedEmbedder::new();
	let harness = harness_with(scout_testkit::sample_experts(), embedder.clone(), |_| {});
	let first = harness.service.rebuild_index().await.expect("Rebuild failed.");

	embedder.gated.store(true, Ordering::SeqCst);
	harness.experts.replace({
		let mut records = scout_testkit::sample_experts();

		records.push(scout_testkit::expert("4", "Dana", "policy", true));

		records
	});

	let service = harness.service.clone();
	let task = tokio::spawn(async move { service.rebuild_index().await });

	embedder.entered.notified().await;
	harness.service.abort_rebuild();
	embedder.release.notify_one();

	let result = task.await.expect("Rebuild task panicked.");

	assert!(matches!(result, Err(Error::BuildAborted)), "Unexpected result: {result:?}.");
	assert_eq!(
		harness.service.index().snapshot().expect("Snapshot failed.").checksum(),
		first.checksum
	);

	// The next rebuild starts with a cleared flag.
	embedder.gated.store(false, Ordering::SeqCst);

	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.indexed_count, 4);
}

#[tokio::test]
async fn other_processes_pick_up_new_generations() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let reader = harness.sibling();
	let before = reader.index().snapshot().expect("Snapshot failed.");

	assert_eq!(before.len(), 3);

	harness.experts.replace(scout_testkit::sample_experts().into_iter().take(2).collect());
	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let after = reader.index().snapshot().expect("Snapshot failed.");

	assert_eq!(after.len(), 2);
	assert_ne!(after.checksum(), before.checksum());
}

#[tokio::test]
async fn corrupt_artifact_is_index_unavailable() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let path = harness.service.index().path().to_path_buf();
	let mut bytes = fs::read(&path).expect("Read failed.");
	let last = bytes.len() - 1;

	bytes[last] ^= 0xFF;
	bytes.push(0);
	fs::write(&path, bytes).expect("Write failed.");

	let reader = harness.sibling();

	assert!(matches!(reader.index().snapshot(), Err(Error::IndexUnavailable { .. })));
}
