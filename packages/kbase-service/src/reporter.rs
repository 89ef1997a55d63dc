use std::sync::Arc;

use serde_json::Value;

use kbase_domain::{ChatResponse, ChatResponseBody, ErrorCode, TaskKind, TaskResponse};

use crate::{ResponseSink, Result};

/// Response queues the worker publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Task,
	Chat,
}

/// Publishes task and chat outcomes. Holds no per-task state.
#[derive(Clone)]
pub struct StatusReporter {
	sink: Arc<dyn ResponseSink>,
}
impl StatusReporter {
	pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
		Self { sink }
	}

	pub async fn task_state(
		&self,
		feature_store_id: &str,
		kind: TaskKind,
		code: ErrorCode,
		status: impl Into<String>,
	) -> Result<()> {
		let message = TaskResponse {
			feature_store_id: feature_store_id.to_string(),
			code,
			kind: kind.as_str().to_string(),
			status: status.into(),
		};
		let body = serde_json::to_string(&message)?;

		tracing::debug!(
			feature_store_id,
			task = %kind,
			code = code.code(),
			status = %message.status,
			"Publishing task state."
		);

		self.sink.push(Channel::Task, &body).await
	}

	/// Shorthand for a status whose text is the code's own description.
	pub async fn task_code(
		&self,
		feature_store_id: &str,
		kind: TaskKind,
		code: ErrorCode,
	) -> Result<()> {
		self.task_state(feature_store_id, kind, code, code.describe()).await
	}

	pub async fn chat_state(
		&self,
		feature_store_id: &str,
		query_id: &str,
		code: ErrorCode,
		status: impl Into<String>,
		text: String,
		references: Vec<Value>,
	) -> Result<()> {
		let message = ChatResponse {
			feature_store_id: feature_store_id.to_string(),
			query_id: query_id.to_string(),
			response: ChatResponseBody { code, status: status.into(), text, references },
		};
		let body = serde_json::to_string(&message)?;

		tracing::debug!(feature_store_id, query_id, code = code.code(), "Publishing chat state.");

		self.sink.push(Channel::Chat, &body).await
	}

	/// A chat reply that carries only a code, with its description as the status.
	pub async fn chat_code(
		&self,
		feature_store_id: &str,
		query_id: &str,
		code: ErrorCode,
	) -> Result<()> {
		self.chat_state(feature_store_id, query_id, code, code.describe(), String::new(), Vec::new())
			.await
	}
}
