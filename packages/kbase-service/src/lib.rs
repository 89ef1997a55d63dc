pub mod add_doc;
pub mod cache;
pub mod chat;
pub mod dispatcher;
pub mod knowledge;
pub mod reporter;
pub mod transport;
pub mod update_sample;

mod error;

use std::{future::Future, path::PathBuf, pin::Pin, sync::Arc};

use serde_json::Value;

pub use cache::ResourceCache;
pub use dispatcher::{Dispatcher, Settings, TaskOutcome};
pub use error::{Error, Result};
pub use knowledge::{KnowledgeSettings, VectorKnowledgeEngine};
pub use reporter::{Channel, StatusReporter};
pub use transport::RedisTransport;

use kbase_config::{EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use kbase_domain::{ErrorCode, Exchange};
use kbase_providers::{embedding, generation, rerank};
use kbase_storage::TenantLayout;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// Builds, tunes and opens the per-tenant retrieval resources.
pub trait KnowledgeEngine
where
	Self: Send + Sync,
{
	fn ingest<'a>(
		&'a self,
		layout: &'a TenantLayout,
		files: &'a [PathBuf],
	) -> BoxFuture<'a, Result<IngestReport>>;

	/// Returns the reject throttle that separates `positive` from `negative` questions.
	fn calibrate<'a>(
		&'a self,
		layout: &'a TenantLayout,
		positive: &'a [String],
		negative: &'a [String],
	) -> BoxFuture<'a, Result<f64>>;

	fn open<'a>(
		&'a self,
		layout: &'a TenantLayout,
		reject_throttle: f64,
	) -> BoxFuture<'a, Result<Box<dyn Retriever>>>;
}

/// An opened, ready-to-query resource for one tenant.
pub trait Retriever
where
	Self: Send + Sync,
{
	fn answer<'a>(
		&'a self,
		query: &'a str,
		history: &'a [Exchange],
	) -> BoxFuture<'a, Result<Answer>>;
}

/// Source of raw task messages.
pub trait TaskQueue
where
	Self: Send + Sync,
{
	/// `Ok(None)` means no message arrived within the transport's wait window.
	fn pop(&self) -> BoxFuture<'_, Result<Option<String>>>;
}

pub trait ResponseSink
where
	Self: Send + Sync,
{
	fn push<'a>(&'a self, channel: Channel, body: &'a str) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
	pub success: usize,
	pub fail: usize,
	pub skip: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
	pub code: ErrorCode,
	pub text: String,
	pub references: Vec<Value>,
}
impl Answer {
	pub fn rejected(code: ErrorCode) -> Self {
		Self { code, text: String::new(), references: Vec::new() }
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, rerank, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(HttpProviders);

		Self { embedding: provider.clone(), rerank: provider.clone(), generation: provider }
	}
}

struct HttpProviders;
impl EmbeddingProvider for HttpProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl RerankProvider for HttpProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(rerank::rerank(cfg, query, docs))
	}
}
impl GenerationProvider for HttpProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(generation::generate(cfg, messages))
	}
}
