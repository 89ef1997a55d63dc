use serde::{Serialize, Serializer};

/// Status codes carried by every response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	Success,
	NotAQuestion,
	NoTopic,
	Unrelated,
	NoSearchKeywords,
	NoSearchResult,
	Security,
	NotWorkTime,
	ParameterError,
	ParameterMiss,
	WorkInProgress,
	Failed,
	BadParameter,
	InternalError,
	SearchFail,
}
impl ErrorCode {
	pub fn code(self) -> i32 {
		match self {
			Self::Success => 0,
			Self::NotAQuestion => 1,
			Self::NoTopic => 2,
			Self::Unrelated => 3,
			Self::NoSearchKeywords => 4,
			Self::NoSearchResult => 5,
			Self::Security => 6,
			Self::NotWorkTime => 7,
			Self::ParameterError => 8,
			Self::ParameterMiss => 9,
			Self::WorkInProgress => 10,
			Self::Failed => 11,
			Self::BadParameter => 12,
			Self::InternalError => 13,
			Self::SearchFail => 14,
		}
	}

	pub fn describe(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::NotAQuestion => "query is not a question",
			Self::NoTopic => "the question does not have a topic",
			Self::Unrelated => "query is not related to the knowledge base",
			Self::NoSearchKeywords => "cannot extract keywords from the query",
			Self::NoSearchResult => "cannot find a search result",
			Self::Security => "reply is not safe",
			Self::NotWorkTime => "not work time",
			Self::ParameterError => "HTTP interface parameter error",
			Self::ParameterMiss => "HTTP interface parameter missing",
			Self::WorkInProgress => "work in progress",
			Self::Failed => "fail",
			Self::BadParameter => "bad parameter",
			Self::InternalError => "internal error",
			Self::SearchFail => "web search failed",
		}
	}

	pub fn is_success(self) -> bool {
		self == Self::Success
	}
}
impl Serialize for ErrorCode {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i32(self.code())
	}
}

/// Task types accepted on the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
	Build,
	Tune,
	Query,
}
impl TaskKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Build => "FS_ADD_DOC",
			Self::Tune => "FS_UPDATE_SAMPLE",
			Self::Query => "CHAT",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"FS_ADD_DOC" => Some(Self::Build),
			"FS_UPDATE_SAMPLE" => Some(Self::Tune),
			"CHAT" => Some(Self::Query),
			_ => None,
		}
	}
}
impl std::fmt::Display for TaskKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
