use std::sync::Arc;

use color_eyre::{Result, eyre};

use kbase_config::Config;
use kbase_service::{
	Dispatcher, KnowledgeSettings, Providers, RedisTransport, Settings, StatusReporter,
	VectorKnowledgeEngine,
};

/// Connects the queue, loads the tokenizer and assembles the dispatcher from `config`.
pub async fn build(config: &Config) -> Result<Dispatcher> {
	let transport = Arc::new(RedisTransport::connect(&config.queue).await?);
	let tokenizer_repo = config
		.knowledge
		.tokenizer_repo
		.clone()
		.unwrap_or_else(|| config.providers.embedding.model.clone());
	let tokenizer =
		kbase_chunking::load_tokenizer(&tokenizer_repo).map_err(|err| eyre::eyre!(err))?;

	tracing::info!(tokenizer_repo = %tokenizer_repo, "Loaded chunking tokenizer.");

	let engine = Arc::new(VectorKnowledgeEngine::new(
		KnowledgeSettings::from_config(config),
		Providers::default(),
		Arc::new(tokenizer),
	));
	let reporter = StatusReporter::new(transport.clone());

	Ok(Dispatcher::new(
		Settings::from_config(config),
		transport,
		engine,
		reporter,
		config.cache.max_len,
	))
}
