mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, DecodeErrorPolicy, Dispatch, EmbeddingProviderConfig, Knowledge,
	LlmProviderConfig, ProviderConfig, Providers, Queue, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(path, &raw)
}

pub fn parse(path: &Path, raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.log_level", &cfg.service.log_level),
		("queue.redis_url", &cfg.queue.redis_url),
		("queue.namespace", &cfg.queue.namespace),
		("queue.task_queue", &cfg.queue.task_queue),
		("queue.task_response_queue", &cfg.queue.task_response_queue),
		("queue.chat_response_queue", &cfg.queue.chat_response_queue),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.queue.block_timeout_secs == 0 {
		return Err(Error::Validation {
			message: "queue.block_timeout_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.feature_store_base_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.feature_store_base_dir must be non-empty.".to_string(),
		});
	}
	if cfg.storage.config_template.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.config_template must be non-empty.".to_string(),
		});
	}
	if cfg.cache.max_len == 0 {
		return Err(Error::Validation {
			message: "cache.max_len must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.generation.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	let knowledge = &cfg.knowledge;

	if knowledge.top_k == 0 {
		return Err(Error::Validation {
			message: "knowledge.top_k must be greater than zero.".to_string(),
		});
	}
	if knowledge.rerank_top_n == 0 {
		return Err(Error::Validation {
			message: "knowledge.rerank_top_n must be greater than zero.".to_string(),
		});
	}
	if knowledge.max_tokens == 0 {
		return Err(Error::Validation {
			message: "knowledge.max_tokens must be greater than zero.".to_string(),
		});
	}
	if knowledge.overlap_tokens >= knowledge.max_tokens {
		return Err(Error::Validation {
			message: "knowledge.overlap_tokens must be less than knowledge.max_tokens.".to_string(),
		});
	}
	if knowledge.text_extensions.is_empty() {
		return Err(Error::Validation {
			message: "knowledge.text_extensions must be non-empty.".to_string(),
		});
	}
	if knowledge.max_context_chars == 0 {
		return Err(Error::Validation {
			message: "knowledge.max_context_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.knowledge.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false)
	{
		cfg.knowledge.tokenizer_repo = None;
	}

	for ext in &mut cfg.knowledge.text_extensions {
		*ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
	}

	cfg.knowledge.text_extensions.retain(|ext| !ext.is_empty());
}
