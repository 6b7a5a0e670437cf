use std::sync::atomic::Ordering;

use super::{HashEmbedder, harness, harness_with};
use scout_domain::corpus;
use scout_service::{Error, SearchRequest};
use scout_storage::cache::KeyValueCache;

fn request(query: &str, k: u32, active_only: bool) -> SearchRequest {
	SearchRequest { query: query.to_string(), k: Some(k), active_only: Some(active_only) }
}

#[tokio::test]
async fn exact_corpus_text_returns_the_record_first() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	for record in scout_testkit::sample_experts() {
		let text = corpus::build_text(&record);
		let matches =
			harness.service.search(&request(&text, 1, false)).await.expect("Search failed.");

		assert_eq!(matches.len(), 1);
		assert_eq!(matches[0].id, record.id);
		assert!((matches[0].score - 1.0).abs() < 1e-5);
		assert_eq!(matches[0].metadata.first_name, record.first_name.clone().unwrap_or_default());
	}
}

#[tokio::test]
async fn active_only_never_returns_inactive_experts() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let matches = harness
		.service
		.search(&request("health research", 2, true))
		.await
		.expect("Search failed.");
	let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();

	assert!(ids.len() <= 2);
	assert!(!ids.contains(&"3"), "Inactive expert leaked into results: {ids:?}.");
	assert!(ids.iter().all(|id| ["1", "2"].contains(id)));

	let carol = &scout_testkit::sample_experts()[2];
	let nearest = harness
		.service
		.search(&request(&corpus::build_text(carol), 3, true))
		.await
		.expect("Search failed.");

	assert!(nearest.iter().all(|m| m.metadata.is_active));
}

#[tokio::test]
async fn inactive_experts_are_visible_without_the_filter() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let carol = &scout_testkit::sample_experts()[2];
	let matches = harness
		.service
		.search(&request(&corpus::build_text(carol), 1, false))
		.await
		.expect("Search failed.");

	assert_eq!(matches[0].id, "3");
	assert!(!matches[0].metadata.is_active);
}

#[tokio::test]
async fn over_fetch_does_not_back_fill() {
	let mut records = scout_testkit::sample_experts();

	records.push(scout_testkit::expert("4", "Dana", "health", false));
	records.push(scout_testkit::expert("5", "Eve", "health", false));

	let harness = harness_with(records, HashEmbedder::new(), |_| {});

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let dana = scout_testkit::expert("4", "Dana", "health", false);
	let matches = harness
		.service
		.search(&request(&corpus::build_text(&dana), 1, true))
		.await
		.expect("Search failed.");

	// Only the two nearest candidates are considered; Dana herself is inactive.
	assert!(matches.len() <= 1);
	assert!(matches.iter().all(|m| m.metadata.is_active));
}

#[tokio::test]
async fn scores_are_descending() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let matches =
		harness.service.search(&request("policy health", 3, false)).await.expect("Search failed.");

	assert_eq!(matches.len(), 3);
	assert!(matches.windows(2).all(|pair| pair[0].score >= pair[1].score));
	assert!(matches.iter().all(|m| m.score > 0.0 && m.score <= 1.0));
}

#[tokio::test]
async fn search_without_artifact_is_index_unavailable() {
	let harness = harness();
	let err = harness
		.service
		.search(&request("health", 2, true))
		.await
		.expect_err("Search should fail without an index.");

	assert!(matches!(err, Error::IndexUnavailable { .. }), "Unexpected error: {err:?}.");
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	for req in [request("   ", 2, true), request("health", 0, true), request("health", 101, true)] {
		let err = harness.service.search(&req).await.expect_err("Request should be rejected.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err:?}.");
	}

	let defaults = SearchRequest { query: "health".to_string(), ..Default::default() };

	assert!(harness.service.search(&defaults).await.is_ok());
}

#[tokio::test]
async fn metadata_miss_skips_the_expert() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");
	harness.cache.inner().delete("scout:expert:1").await.expect("Delete failed.");

	let alice = &scout_testkit::sample_experts()[0];
	let matches = harness
		.service
		.search(&request(&corpus::build_text(alice), 3, false))
		.await
		.expect("Search failed.");

	assert_eq!(matches.len(), 2);
	assert!(matches.iter().all(|m| m.id != "1"));
}

#[tokio::test]
async fn malformed_metadata_is_treated_as_a_miss() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");
	harness
		.cache
		.inner()
		.hset("scout:expert:2", &[("metadata".to_string(), b"{\"id\":\"2\"}".to_vec())])
		.await
		.expect("Write failed.");

	let matches =
		harness.service.search(&request("policy", 3, false)).await.expect("Search failed.");

	assert!(matches.iter().all(|m| m.id != "2"));
}

#[tokio::test]
async fn repeated_searches_hit_the_result_cache() {
	let embedder = HashEmbedder::new();
	let harness = harness_with(scout_testkit::sample_experts(), embedder.clone(), |_| {});

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let before = embedder.calls.load(Ordering::SeqCst);
	let first = harness.service.search(&request("health", 2, true)).await.expect("Search failed.");
	let second = harness.service.search(&request("health", 2, true)).await.expect("Search failed.");

	assert_eq!(first, second);
	assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn result_cache_can_be_disabled() {
	let embedder = HashEmbedder::new();
	let harness = harness_with(scout_testkit::sample_experts(), embedder.clone(), |cfg| {
		cfg.search.result_cache_ttl_secs = 0;
		cfg.search.embedding_cache_ttl_secs = 0;
	});

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let before = embedder.calls.load(Ordering::SeqCst);

	for _ in 0..2 {
		harness.service.search(&request("health", 2, true)).await.expect("Search failed.");
	}

	assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 2);
}

#[tokio::test]
async fn query_embeddings_are_reused_across_requests() {
	let embedder = HashEmbedder::new();
	let harness = harness_with(scout_testkit::sample_experts(), embedder.clone(), |cfg| {
		cfg.search.result_cache_ttl_secs = 0;
	});

	harness.service.rebuild_index().await.expect("Rebuild failed.");

	let before = embedder.calls.load(Ordering::SeqCst);
	let first = harness.service.search(&request("health", 1, true)).await.expect("Search failed.");
	let second = harness.service.search(&request("health", 2, true)).await.expect("Search failed.");

	assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 1);
	assert_eq!(first[0], second[0]);
}

#[tokio::test]
async fn republishing_the_same_corpus_invalidates_cached_results() {
	let embedder = HashEmbedder::new();
	let harness = harness_with(scout_testkit::sample_experts(), embedder.clone(), |cfg| {
		cfg.search.embedding_cache_ttl_secs = 0;
	});
	let first = harness.service.rebuild_index().await.expect("Rebuild failed.");

	harness.service.search(&request("health", 2, true)).await.expect("Search failed.");

	let second = harness.service.rebuild_index().await.expect("Rebuild failed.");
	let before = embedder.calls.load(Ordering::SeqCst);

	harness.service.search(&request("health", 2, true)).await.expect("Search failed.");

	assert_ne!(first.checksum, second.checksum);
	assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 1);
}
