pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Queue error: {message}")]
	Queue { message: String },
	#[error("Malformed task message: {0}")]
	Decode(#[from] kbase_domain::DecodeError),
	#[error("Deployment error: {message}")]
	Deployment { message: String },
}
impl Error {
	/// Errors that must stop the dispatch loop instead of being logged per task.
	///
	/// `Decode` only reaches the loop under the fatal decode policy; the skip policy consumes it
	/// before an error is built.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Deployment { .. } | Self::Decode(_))
	}
}

impl From<kbase_storage::Error> for Error {
	fn from(err: kbase_storage::Error) -> Self {
		match err {
			kbase_storage::Error::NotFound(message) => Self::NotFound { message },
			kbase_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			err @ kbase_storage::Error::MissingTemplate { .. } =>
				Self::Deployment { message: err.to_string() },
			kbase_storage::Error::Redis(inner) => Self::Queue { message: inner.to_string() },
			err @ (kbase_storage::Error::Io { .. } | kbase_storage::Error::InvalidConfig { .. }) =>
				Self::Storage { message: err.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
