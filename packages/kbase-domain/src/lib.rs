pub mod code;
pub mod history;
pub mod message;

pub use code::{ErrorCode, TaskKind};
pub use history::{Exchange, MergedHistory, Sender, Turn, merge_history};
pub use message::{
	BuildPayload, ChatResponse, ChatResponseBody, DecodeError, Decoded, QueryPayload, Task,
	TaskResponse, TunePayload, decode_task,
};
