pub mod cache;
pub mod local;
pub mod predictor;
pub mod trie;

pub use cache::PredictionCache;
pub use local::{LocalUserState, LocalUserStore};
pub use predictor::AutocompletePredictor;
pub use trie::PrefixTrie;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{Error, Result, ScoutService};
use scout_domain::{HistoricalQuery, scoring};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PredictRequest {
	pub partial: String,
	pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictResponse {
	pub predictions: Vec<String>,
	pub confidence_scores: Vec<f32>,
}

impl ScoutService {
	pub async fn predict(&self, user_id: &str, req: &PredictRequest) -> Result<PredictResponse> {
		let user_id = require_user(user_id)?;
		let cfg = &self.cfg.prediction;
		let limit = req.limit.unwrap_or(cfg.default_limit);

		if limit == 0 || limit > cfg.max_limit {
			return Err(Error::invalid(format!("limit must be between 1 and {}.", cfg.max_limit)));
		}

		let predictions = self.predictor.predict(&req.partial, user_id, limit as usize).await;
		let confidence_scores = (0..predictions.len()).map(scoring::confidence).collect();

		Ok(PredictResponse { predictions, confidence_scores })
	}

	pub async fn update(&self, query: &str, user_id: &str) -> Result<()> {
		let user_id = require_user(user_id)?;

		self.predictor.update(query, user_id).await;

		Ok(())
	}

	/// Replaces the user's prediction model with one built from `history`.
	pub async fn train(&self, history: Vec<HistoricalQuery>, user_id: &str) -> Result<usize> {
		let user_id = require_user(user_id)?;

		Ok(self.predictor.train(history, user_id).await)
	}

	/// Trains from the user's stored history inside the rolling window.
	pub async fn train_user_model(&self, user_id: &str) -> Result<usize> {
		let user_id = require_user(user_id)?;
		let since = OffsetDateTime::now_utc() - Duration::days(self.cfg.prediction.window_days);
		let history =
			self.sources.history.fetch_history(user_id, since).await.map_err(Error::storage)?;

		Ok(self.predictor.train(history, user_id).await)
	}

	pub async fn frequency(&self, query: &str, user_id: &str) -> Result<u64> {
		let user_id = require_user(user_id)?;

		Ok(self.predictor.frequency(query, user_id).await)
	}

	pub async fn recent_queries(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<String>> {
		let user_id = require_user(user_id)?;
		let limit = limit.unwrap_or(self.cfg.prediction.default_limit);

		if limit == 0 {
			return Err(Error::invalid("limit must be greater than zero."));
		}

		Ok(self.predictor.recent_queries(user_id, limit as usize).await)
	}
}

pub(crate) fn require_user(user_id: &str) -> Result<&str> {
	let user_id = user_id.trim();

	if user_id.is_empty() {
		return Err(Error::invalid("user_id must be non-empty."));
	}

	Ok(user_id)
}
