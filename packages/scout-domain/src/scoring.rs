use scout_config::PredictionWeights;

use crate::query::{QueryStats, clamp_rate};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Rolling window used to decide whether a query still counts as used.
#[derive(Clone, Copy, Debug)]
pub struct UsageWindow {
	pub now_ms: i64,
	pub window_ms: i64,
}
impl UsageWindow {
	pub fn days(now_ms: i64, days: i64) -> Self {
		Self { now_ms, window_ms: days.saturating_mul(MS_PER_DAY) }
	}

	pub fn contains(&self, last_used_ms: i64) -> bool {
		self.now_ms.saturating_sub(last_used_ms) <= self.window_ms
	}

	pub fn since_ms(&self) -> i64 {
		self.now_ms.saturating_sub(self.window_ms)
	}
}

/// Saturating usage term in `[0, 1)`; zero once the query falls out of the window.
pub fn usage_score(count: u64, last_used_ms: i64, window: UsageWindow, half_saturation: f32) -> f32 {
	if count == 0 || !window.contains(last_used_ms) {
		return 0.0;
	}

	let count = count as f32;

	count / (count + half_saturation)
}

pub fn prediction_score(
	weights: &PredictionWeights,
	count: u64,
	stats: Option<QueryStats>,
	window: UsageWindow,
) -> f32 {
	let Some(stats) = stats else {
		return 0.0;
	};
	let usage = usage_score(count, stats.last_used_ms, window, weights.usage_half_saturation);

	weights.usage * usage
		+ weights.click * clamp_rate(stats.click_rate)
		+ weights.success * clamp_rate(stats.success_rate)
}

/// Replay weight for a historical query during training.
pub fn training_weight(search_count: u64, click_rate: f32, success_rate: f32) -> f64 {
	search_count as f64
		* (1.0 + f64::from(clamp_rate(click_rate)))
		* (1.0 + f64::from(clamp_rate(success_rate)))
}

pub fn similarity_score(distance: f32) -> f32 {
	1.0 / (1.0 + distance.max(0.0))
}

pub fn confidence(rank: usize) -> f32 {
	(1.0 - 0.1 * rank as f32).max(0.0)
}
