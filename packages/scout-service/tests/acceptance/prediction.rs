use time::{Duration, OffsetDateTime};

use super::{HashEmbedder, harness, harness_with};
use scout_service::{Error, PredictRequest, ScoutService};

async fn predict(service: &ScoutService, partial: &str, user_id: &str, limit: u32) -> Vec<String> {
	service
		.predict(user_id, &PredictRequest { partial: partial.to_string(), limit: Some(limit) })
		.await
		.expect("Predict failed.")
		.predictions
}

#[tokio::test]
async fn repeated_updates_count_monotonically() {
	let harness = harness();

	for (n, raw) in ["Machine Learning", "  machine learning", "MACHINE LEARNING "].iter().enumerate() {
		harness.service.update(raw, "u1").await.expect("Update failed.");

		assert_eq!(
			harness.service.frequency("machine learning", "u1").await.expect("Frequency failed."),
			n as u64 + 1
		);
	}
}

#[tokio::test]
async fn frequent_query_is_the_top_prediction() {
	let harness = harness();

	for _ in 0..3 {
		harness.service.update("machine learning", "u1").await.expect("Update failed.");
	}

	harness.service.update("machine vision", "u1").await.expect("Update failed.");

	assert_eq!(harness.service.frequency("machine learning", "u1").await.expect("Frequency."), 3);

	let predictions = predict(&harness.service, "mach", "u1", 5).await;

	assert_eq!(predictions.first().map(String::as_str), Some("machine learning"));
	assert!(predictions.contains(&"machine vision".to_string()));
}

#[tokio::test]
async fn single_character_partials_predict_nothing() {
	let harness = harness();

	harness.service.update("alpha", "u1").await.expect("Update failed.");

	assert!(predict(&harness.service, "a", "u1", 5).await.is_empty());
	assert!(predict(&harness.service, "  a ", "u1", 5).await.is_empty());
	assert_eq!(predict(&harness.service, "al", "u1", 5).await, vec!["alpha"]);
}

#[tokio::test]
async fn predictions_start_with_the_normalized_partial() {
	let harness = harness();

	for query in ["Malaria vaccines", "malnutrition", "machine learning", "policy", "mal"] {
		harness.service.update(query, "u1").await.expect("Update failed.");
	}

	for partial in ["MAL", "mal", " Mal", "ma", "po"] {
		let expected = partial.trim().to_lowercase();
		let predictions = predict(&harness.service, partial, "u1", 10).await;

		assert!(!predictions.is_empty(), "No predictions for {partial:?}.");
		assert!(
			predictions.iter().all(|p| p.starts_with(&expected)),
			"Prediction outside prefix {expected:?}: {predictions:?}."
		);
	}
}

#[tokio::test]
async fn predictions_respect_limit_and_report_confidence() {
	let harness = harness();

	for query in ["health a", "health b", "health c"] {
		harness.service.update(query, "u1").await.expect("Update failed.");
	}

	let response = harness
		.service
		.predict("u1", &PredictRequest { partial: "health".to_string(), limit: Some(2) })
		.await
		.expect("Predict failed.");

	assert_eq!(response.predictions.len(), 2);
	assert_eq!(response.confidence_scores, vec![1.0, 0.9]);

	for limit in [0, 51] {
		let err = harness
			.service
			.predict("u1", &PredictRequest { partial: "health".to_string(), limit: Some(limit) })
			.await
			.expect_err("Limit should be rejected.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}
}

#[tokio::test]
async fn blank_user_is_rejected() {
	let harness = harness();

	assert!(matches!(
		harness.service.update("health", "  ").await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(
		harness.service.predict(" ", &PredictRequest::default()).await,
		Err(Error::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn users_do_not_share_personal_history() {
	let harness = harness_with(scout_testkit::sample_experts(), HashEmbedder::new(), |cfg| {
		cfg.prediction.global_suggestions = false;
	});

	harness.service.update("malaria vaccines", "u1").await.expect("Update failed.");

	assert_eq!(harness.service.frequency("malaria vaccines", "u2").await.expect("Frequency."), 0);
	assert!(predict(&harness.service, "mal", "u2", 5).await.is_empty());
}

#[tokio::test]
async fn training_one_user_keeps_users_sharing_its_id_prefix() {
	let harness = harness_with(scout_testkit::sample_experts(), HashEmbedder::new(), |cfg| {
		cfg.prediction.global_suggestions = false;
	});

	for _ in 0..3 {
		harness.service.update("machine learning", "a:b").await.expect("Update failed.");
	}

	harness.service.update("marine biology", "a").await.expect("Update failed.");
	harness.service.train(Vec::new(), "a").await.expect("Train failed.");

	assert_eq!(harness.service.frequency("marine biology", "a").await.expect("Frequency."), 0);
	assert_eq!(harness.service.frequency("machine learning", "a:b").await.expect("Frequency."), 3);
	assert_eq!(predict(&harness.service, "mach", "a:b", 5).await, vec!["machine learning"]);
	assert_eq!(
		harness.service.recent_queries("a:b", None).await.expect("Recent failed."),
		vec!["machine learning"; 3]
	);
}

#[tokio::test]
async fn global_suggestions_top_up_sparse_users() {
	let harness = harness();

	harness.service.update("malaria vaccines", "u2").await.expect("Update failed.");
	harness.service.update("malaria vaccines", "u3").await.expect("Update failed.");
	harness.service.update("malnutrition", "u2").await.expect("Update failed.");
	harness.service.update("mali", "u1").await.expect("Update failed.");

	let predictions = predict(&harness.service, "mal", "u1", 5).await;

	assert_eq!(predictions, vec!["mali", "malaria vaccines", "malnutrition"]);
}

#[tokio::test]
async fn recent_queries_are_bounded_and_newest_first() {
	let harness = harness_with(scout_testkit::sample_experts(), HashEmbedder::new(), |cfg| {
		cfg.prediction.max_recent = 3;
	});

	for query in ["one", "two", "three", "four", "five"] {
		harness.service.update(query, "u1").await.expect("Update failed.");
	}

	let recent = harness.service.recent_queries("u1", Some(10)).await.expect("Recent failed.");

	assert_eq!(recent, vec!["five", "four", "three"]);
}

fn seed_history(harness: &super::Harness, user_id: &str) {
	let now = OffsetDateTime::now_utc();

	for _ in 0..4 {
		harness.history.push(user_id, "malaria vaccines", 3, None, now - Duration::days(1));
	}

	harness.history.push(user_id, "malaria vaccines", 2, Some("1"), now - Duration::hours(3));
	harness.history.push(user_id, "maternal health", 0, None, now - Duration::days(2));
	harness.history.push(user_id, "maternal health", 1, Some("2"), now - Duration::days(2));
	harness.history.push(user_id, "machine learning", 5, Some("3"), now - Duration::hours(1));
	harness.history.push(user_id, "ancient query", 5, Some("3"), now - Duration::days(90));
}

#[tokio::test]
async fn training_twice_yields_identical_predictions() {
	let harness = harness();

	seed_history(&harness, "u1");

	let trained = harness.service.train_user_model("u1").await.expect("Train failed.");

	assert_eq!(trained, 3);

	let partials = ["ma", "mal", "mat", "mac", "an"];
	let mut first = Vec::new();

	for partial in partials {
		first.push(predict(&harness.service, partial, "u1", 5).await);
	}

	harness.service.train_user_model("u1").await.expect("Train failed.");

	for (partial, expected) in partials.iter().zip(&first) {
		assert_eq!(&predict(&harness.service, partial, "u1", 5).await, expected);
	}

	assert_eq!(first[0].len(), 3);
	assert!(first[4].is_empty(), "Queries outside the window must not be trained.");
	assert_eq!(harness.service.frequency("malaria vaccines", "u1").await.expect("Frequency."), 5);
}

#[tokio::test]
async fn training_replaces_previous_user_state() {
	let harness = harness_with(scout_testkit::sample_experts(), HashEmbedder::new(), |cfg| {
		cfg.prediction.global_suggestions = false;
	});

	harness.service.update("zebra migration", "u1").await.expect("Update failed.");
	seed_history(&harness, "u1");
	harness.service.train_user_model("u1").await.expect("Train failed.");

	assert_eq!(harness.service.frequency("zebra migration", "u1").await.expect("Frequency."), 0);
	assert!(predict(&harness.service, "ze", "u1", 5).await.is_empty());
}

#[tokio::test]
async fn train_merges_duplicate_history_entries() {
	let harness = harness();
	let now = OffsetDateTime::now_utc();
	let history = vec![
		scout_domain::HistoricalQuery {
			query: "Health Policy".to_string(),
			search_count: 2,
			click_rate: 1.0,
			success_rate: 1.0,
			last_used: now - Duration::days(3),
		},
		scout_domain::HistoricalQuery {
			query: "health policy ".to_string(),
			search_count: 2,
			click_rate: 0.0,
			success_rate: 1.0,
			last_used: now,
		},
	];
	let trained = harness.service.train(history, "u1").await.expect("Train failed.");

	assert_eq!(trained, 1);
	assert_eq!(harness.service.frequency("health policy", "u1").await.expect("Frequency."), 4);
	assert_eq!(
		harness.service.recent_queries("u1", None).await.expect("Recent failed."),
		vec!["health policy"]
	);
}
