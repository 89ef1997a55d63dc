use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub queue: Queue,
	pub storage: Storage,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub dispatch: Dispatch,
	pub providers: Providers,
	#[serde(default)]
	pub knowledge: Knowledge,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Queue {
	pub redis_url: String,
	pub namespace: String,
	#[serde(default = "default_task_queue")]
	pub task_queue: String,
	#[serde(default = "default_task_response_queue")]
	pub task_response_queue: String,
	#[serde(default = "default_chat_response_queue")]
	pub chat_response_queue: String,
	/// Seconds a single `BLPOP` waits before the dispatcher polls again.
	#[serde(default = "default_block_timeout_secs")]
	pub block_timeout_secs: u64,
}
impl Queue {
	pub fn key(&self, name: &str) -> String {
		format!("{}:{}", self.namespace, name)
	}
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	/// Root directory holding one subdirectory per feature store.
	pub feature_store_base_dir: PathBuf,
	/// Seed copied into a tenant's config file the first time it is built.
	pub config_template: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub max_len: usize,
}
impl Default for Cache {
	fn default() -> Self {
		Self { max_len: 4 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Dispatch {
	pub on_decode_error: DecodeErrorPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
	/// Stop the worker and let the supervisor restart it.
	#[default]
	Fatal,
	/// Log the malformed message and keep consuming.
	Skip,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub generation: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Knowledge {
	pub top_k: u32,
	pub rerank_top_n: u32,
	pub max_tokens: u32,
	pub overlap_tokens: u32,
	/// Falls back to `providers.embedding.model` when unset.
	pub tokenizer_repo: Option<String>,
	pub text_extensions: Vec<String>,
	pub max_context_chars: usize,
}
impl Default for Knowledge {
	fn default() -> Self {
		Self {
			top_k: 30,
			rerank_top_n: 3,
			max_tokens: 512,
			overlap_tokens: 32,
			tokenizer_repo: None,
			text_extensions: ["md", "txt", "rst", "html", "csv", "json"]
				.into_iter()
				.map(str::to_string)
				.collect(),
			max_context_chars: 6_000,
		}
	}
}

fn default_task_queue() -> String {
	"Task".to_string()
}

fn default_task_response_queue() -> String {
	"TaskResponse".to_string()
}

fn default_chat_response_queue() -> String {
	"ChatResponse".to_string()
}

fn default_block_timeout_secs() -> u64 {
	5
}
