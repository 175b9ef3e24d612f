use crate::methods::MethodId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmbcError {
	#[error("cannot read input {}: {source}", path.display())]
	InputUnavailable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Corrupt container: {0}")]
	CorruptContainer(String),

	#[error("Truncated container: {0}")]
	TruncatedContainer(String),

	#[error("Compression method {0} is not available in this build")]
	MethodUnavailable(MethodId),

	#[error("Data integrity check failed: checksum mismatch")]
	ChecksumMismatch,

	#[error("Compression with {method} failed: {reason}")]
	CompressionError { method: MethodId, reason: String },

	#[error("Configuration error: {0}")]
	ConfigError(String),
}

impl AmbcError {
	pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
		AmbcError::CorruptContainer(reason.into())
	}

	pub(crate) fn truncated(reason: impl Into<String>) -> Self {
		AmbcError::TruncatedContainer(reason.into())
	}
}

pub type Result<T> = std::result::Result<T, AmbcError>;
