use std::time::{Duration, Instant};

use super::harness;
use scout_service::{PredictRequest, SearchRequest};

fn request(partial: &str, limit: u32) -> PredictRequest {
	PredictRequest { partial: partial.to_string(), limit: Some(limit) }
}

#[tokio::test]
async fn fallback_predictions_match_the_fast_path() {
	let harness = harness();

	for (query, times) in [("malaria", 3), ("maternal health", 2), ("mapping", 1), ("market", 1)] {
		for _ in 0..times {
			harness.service.update(query, "u1").await.expect("Update failed.");
		}
	}

	let fast = harness.service.predict("u1", &request("ma", 5)).await.expect("Predict failed.");

	harness.cache.set_down(true);

	let slow = harness.service.predict("u1", &request("ma", 5)).await.expect("Predict failed.");

	assert!(harness.cache.failures() > 0);
	assert_eq!(fast.predictions.first(), slow.predictions.first());

	let mut fast_set = fast.predictions.clone();
	let mut slow_set = slow.predictions.clone();

	fast_set.sort();
	slow_set.sort();

	assert_eq!(fast_set, slow_set);
	assert_eq!(fast_set.len(), 4);
}

#[tokio::test]
async fn updates_during_an_outage_land_in_local_state() {
	let harness = harness();

	harness.cache.set_down(true);

	for _ in 0..2 {
		harness.service.update("offline query", "u1").await.expect("Update failed.");
	}

	assert!(harness.cache.failures() > 0);
	assert_eq!(harness.service.frequency("offline query", "u1").await.expect("Frequency."), 2);

	let response = harness.service.predict("u1", &request("off", 5)).await.expect("Predict failed.");

	assert_eq!(response.predictions, vec!["offline query"]);
	assert_eq!(
		harness.service.recent_queries("u1", None).await.expect("Recent failed."),
		vec!["offline query", "offline query"]
	);
}

#[tokio::test]
async fn slow_cache_is_bounded_by_the_timeout() {
	let harness = harness();

	harness.cache.set_delay(Duration::from_secs(2));

	let started = Instant::now();

	harness.service.update("slow query", "u1").await.expect("Update failed.");

	let response = harness.service.predict("u1", &request("slow", 5)).await.expect("Predict failed.");

	// One timeout per request: 250ms each, well under the 2s delay.
	assert!(started.elapsed() < Duration::from_millis(1_500), "Took {:?}.", started.elapsed());
	assert_eq!(response.predictions, vec!["slow query"]);
}

#[tokio::test]
async fn search_survives_a_cache_outage() {
	let harness = harness();

	harness.service.rebuild_index().await.expect("Rebuild failed.");
	harness.cache.set_down(true);

	let matches = harness
		.service
		.search(&SearchRequest { query: "health".to_string(), k: Some(2), active_only: Some(true) })
		.await
		.expect("Search should degrade, not fail.");

	assert!(matches.is_empty());

	harness.cache.set_down(false);

	let matches = harness
		.service
		.search(&SearchRequest { query: "health".to_string(), k: Some(2), active_only: Some(true) })
		.await
		.expect("Search failed.");

	assert!(!matches.is_empty(), "Results degraded by the outage must not be cached.");
}

#[tokio::test]
async fn results_missing_metadata_are_not_served_after_a_repair() {
	let harness = harness();
	let request =
		SearchRequest { query: "health".to_string(), k: Some(2), active_only: Some(true) };

	harness.cache.set_down(true);

	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.metadata_error_count, 3);

	harness.cache.set_down(false);

	assert!(harness.service.search(&request).await.expect("Search failed.").is_empty());

	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.metadata_error_count, 0);
	assert!(!harness.service.search(&request).await.expect("Search failed.").is_empty());
}

#[tokio::test]
async fn rebuild_publishes_even_when_metadata_writes_fail() {
	let harness = harness();

	harness.cache.set_down(true);

	let report = harness.service.rebuild_index().await.expect("Rebuild failed.");

	assert_eq!(report.indexed_count, 3);
	assert_eq!(report.metadata_error_count, 3);
	assert!(harness.service.index().snapshot().is_ok());
}

#[tokio::test]
async fn training_during_an_outage_rebuilds_local_state() {
	let harness = harness();
	let now = time::OffsetDateTime::now_utc();

	for query in ["malaria vaccines", "malaria vaccines", "maternal health"] {
		harness.history.push("u1", query, 1, None, now - time::Duration::hours(1));
	}

	harness.cache.set_down(true);

	let trained = harness.service.train_user_model("u1").await.expect("Train failed.");

	assert_eq!(trained, 2);
	assert_eq!(harness.service.frequency("malaria vaccines", "u1").await.expect("Frequency."), 2);

	let response = harness.service.predict("u1", &request("ma", 5)).await.expect("Predict failed.");

	assert_eq!(response.predictions, vec!["malaria vaccines", "maternal health"]);
}
