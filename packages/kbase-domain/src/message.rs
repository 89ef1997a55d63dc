use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorCode, TaskKind, Turn};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("Task message is not a valid envelope: {0}.")]
	Envelope(#[source] serde_json::Error),
	#[error("Task {kind} has an invalid payload: {source}.")]
	Payload {
		kind: TaskKind,
		#[source]
		source: serde_json::Error,
	},
	#[error("Task {kind} is missing feature_store_id.")]
	MissingTenant { kind: TaskKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildPayload {
	pub name: String,
	pub feature_store_id: String,
	pub file_abs_base: String,
	#[serde(alias = "path_list")]
	pub file_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TunePayload {
	pub feature_store_id: String,
	#[serde(default)]
	pub positive: Vec<String>,
	#[serde(default)]
	pub negative: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryPayload {
	pub feature_store_id: String,
	pub query_id: String,
	pub content: String,
	#[serde(default)]
	pub images: Vec<String>,
	#[serde(default)]
	pub history: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
	Build(BuildPayload),
	Tune(TunePayload),
	Query(QueryPayload),
}
impl Task {
	pub fn kind(&self) -> TaskKind {
		match self {
			Self::Build(_) => TaskKind::Build,
			Self::Tune(_) => TaskKind::Tune,
			Self::Query(_) => TaskKind::Query,
		}
	}

	pub fn feature_store_id(&self) -> &str {
		match self {
			Self::Build(payload) => &payload.feature_store_id,
			Self::Tune(payload) => &payload.feature_store_id,
			Self::Query(payload) => &payload.feature_store_id,
		}
	}
}

/// Outcome of decoding one raw queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
	Task(Task),
	/// Well-formed envelope whose `type` is not one of the known task kinds.
	Unknown { kind: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	payload: Value,
}

pub fn decode_task(raw: &str) -> Result<Decoded, DecodeError> {
	let envelope: Envelope = serde_json::from_str(raw).map_err(DecodeError::Envelope)?;
	let Some(kind) = TaskKind::parse(&envelope.kind) else {
		return Ok(Decoded::Unknown { kind: envelope.kind });
	};
	let payload = envelope.payload;
	let task = match kind {
		TaskKind::Build => Task::Build(decode_payload(kind, payload)?),
		TaskKind::Tune => Task::Tune(decode_payload(kind, payload)?),
		TaskKind::Query => Task::Query(decode_payload(kind, payload)?),
	};

	if task.feature_store_id().trim().is_empty() {
		return Err(DecodeError::MissingTenant { kind });
	}

	Ok(Decoded::Task(task))
}

fn decode_payload<T>(kind: TaskKind, payload: Value) -> Result<T, DecodeError>
where
	T: serde::de::DeserializeOwned,
{
	serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
}

/// Message published on the task response queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResponse {
	pub feature_store_id: String,
	pub code: ErrorCode,
	#[serde(rename = "type")]
	pub kind: String,
	pub status: String,
}

/// Message published on the chat response queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
	pub feature_store_id: String,
	pub query_id: String,
	pub response: ChatResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponseBody {
	pub code: ErrorCode,
	pub status: String,
	pub text: String,
	pub references: Vec<Value>,
}
