mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, IndexStorage, Postgres, Prediction, PredictionWeights,
	Providers, Redis, Search, Security, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.redis.url", &cfg.storage.redis.url),
		("storage.redis.key_prefix", &cfg.storage.redis.key_prefix),
		("storage.index.file_name", &cfg.storage.index.file_name),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.redis.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.redis.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.index.embed_batch_size == 0 {
		return Err(Error::Validation {
			message: "storage.index.embed_batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_search(&cfg.search)?;
	validate_prediction(&cfg.prediction)?;

	Ok(())
}

fn validate_search(search: &types::Search) -> Result<()> {
	if search.default_k == 0 {
		return Err(Error::Validation {
			message: "search.default_k must be greater than zero.".to_string(),
		});
	}
	if search.default_k > search.max_k {
		return Err(Error::Validation {
			message: "search.default_k must be less than or equal to search.max_k.".to_string(),
		});
	}
	if search.overfetch_factor == 0 {
		return Err(Error::Validation {
			message: "search.overfetch_factor must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_prediction(prediction: &types::Prediction) -> Result<()> {
	if prediction.min_chars == 0 {
		return Err(Error::Validation {
			message: "prediction.min_chars must be greater than zero.".to_string(),
		});
	}
	if prediction.default_limit == 0 {
		return Err(Error::Validation {
			message: "prediction.default_limit must be greater than zero.".to_string(),
		});
	}
	if prediction.default_limit > prediction.max_limit {
		return Err(Error::Validation {
			message: "prediction.default_limit must be less than or equal to prediction.max_limit."
				.to_string(),
		});
	}
	if prediction.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "prediction.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if prediction.max_recent == 0 {
		return Err(Error::Validation {
			message: "prediction.max_recent must be greater than zero.".to_string(),
		});
	}
	if prediction.window_days <= 0 {
		return Err(Error::Validation {
			message: "prediction.window_days must be greater than zero.".to_string(),
		});
	}

	for (label, ttl) in [
		("prediction.prefix_ttl_secs", prediction.prefix_ttl_secs),
		("prediction.score_ttl_secs", prediction.score_ttl_secs),
		("prediction.result_ttl_secs", prediction.result_ttl_secs),
	] {
		if ttl == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	let weights = &prediction.weights;

	for (label, weight) in [
		("prediction.weights.usage", weights.usage),
		("prediction.weights.click", weights.click),
		("prediction.weights.success", weights.success),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if !weights.usage_half_saturation.is_finite() || weights.usage_half_saturation <= 0.0 {
		return Err(Error::Validation {
			message: "prediction.weights.usage_half_saturation must be a positive finite number."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let prefix = cfg.storage.redis.key_prefix.trim().trim_end_matches(':').to_string();

	cfg.storage.redis.key_prefix = prefix;
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_strips_key_prefix_separator() {
		let raw = r#"
[service]
http_bind = "127.0.0.1:8080"
admin_bind = "127.0.0.1:8081"
log_level = " info "

[storage.postgres]
dsn = "postgres://localhost/scout"
pool_max_conns = 2

[storage.redis]
url = "redis://127.0.0.1:6379/5"
key_prefix = " scout:: "

[storage.index]
dir = "/tmp/scout"

[providers.embedding]
provider_id = "openai"
api_base = "http://127.0.0.1:9000"
api_key = "key"
path = "/v1/embeddings"
model = "m"
dimensions = 8
timeout_ms = 1000

[security]
bind_localhost_only = true
"#;
		let mut cfg: Config = toml::from_str(raw).expect("Failed to parse config.");

		normalize(&mut cfg);

		assert_eq!(cfg.storage.redis.key_prefix, "scout");
		assert_eq!(cfg.service.log_level, "info");
		assert_eq!(cfg.storage.index.file_name, "experts.scix");
		assert_eq!(cfg.search.overfetch_factor, 2);
		assert_eq!(cfg.prediction.max_recent, 1_000);
		assert!(validate(&cfg).is_ok());
	}
}
