use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("I/O failed at {path:?}: {source}.")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Config template {path:?} does not exist.")]
	MissingTemplate { path: PathBuf },
	#[error("Invalid tenant config at {path:?}: {message}")]
	InvalidConfig { path: PathBuf, message: String },
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
}
impl Error {
	pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
		move |source| Self::Io { path: path.to_path_buf(), source }
	}
}
