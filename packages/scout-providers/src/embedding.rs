use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use scout_config::EmbeddingProviderConfig;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
	model: &'a str,
	input: &'a [String],
	dimensions: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` through an OpenAI-compatible `/embeddings` endpoint.
///
/// The returned vectors line up with `texts` by position and all have `cfg.dimensions` entries.
pub async fn embed(cfg: &EmbeddingProviderConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = endpoint(&cfg.api_base, &cfg.path);
	let body = EmbeddingRequest { model: &cfg.model, input: texts, dimensions: cfg.dimensions };
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let response: EmbeddingResponse = res.error_for_status()?.json().await?;

	order_vectors(response, texts.len(), cfg.dimensions as usize)
}

fn endpoint(api_base: &str, path: &str) -> String {
	format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn order_vectors(
	response: EmbeddingResponse,
	expected: usize,
	dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
	if response.data.len() != expected {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response returned {} vectors for {expected} inputs.",
				response.data.len()
			),
		});
	}

	let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];

	for (fallback_index, item) in response.data.into_iter().enumerate() {
		let index = item.index.unwrap_or(fallback_index);

		if item.embedding.len() != dimensions {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding at index {index} has {} dimensions; expected {dimensions}.",
					item.embedding.len()
				),
			});
		}
		if item.embedding.iter().any(|value| !value.is_finite()) {
			return Err(Error::InvalidResponse {
				message: format!("Embedding at index {index} contains non-finite values."),
			});
		}

		let Some(slot) = slots.get_mut(index) else {
			return Err(Error::InvalidResponse {
				message: format!("Embedding index {index} is out of range."),
			});
		};

		if slot.replace(item.embedding).is_some() {
			return Err(Error::InvalidResponse {
				message: format!("Embedding index {index} appears more than once."),
			});
		}
	}

	Ok(slots.into_iter().flatten().collect())
}
