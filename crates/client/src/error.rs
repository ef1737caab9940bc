use std::{path::PathBuf, time::Duration};

use crate::{
	key::ResourceKey,
	remote::{Capability, ErrorCode},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("resource not found: {0}")]
	NotFound(ResourceKey),
	#[error("invalid intent: {0}")]
	InvalidIntent(String),
	#[error(transparent)]
	Remote(#[from] RemoteError),
	#[error("server doesn't support capability: {0}")]
	Unsupported(Capability),
	#[error("client is shut down")]
	Shutdown,
}

impl Error {
	#[must_use]
	pub const fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}

	/// Errors that background loops retry on their own schedule.
	#[must_use]
	pub const fn is_retryable(&self) -> bool {
		matches!(self, Self::Remote(_))
	}
}

impl From<registry_scheduler::Error> for Error {
	fn from(_: registry_scheduler::Error) -> Self {
		Self::Shutdown
	}
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
	#[error(transparent)]
	Transport(#[from] TransportError),
	#[error("request timed out after {0:?}")]
	Timeout(Duration),
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	#[error("server error <code='{code}'>: {message}")]
	Server { code: ErrorCode, message: String },
	#[error("unexpected response to {request} request: {response}")]
	UnexpectedResponse {
		request: &'static str,
		response: &'static str,
	},
}

/// Failure reported by the transport itself, before any server answer.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file <path='{}'>: {source}", .path.display())]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("failed to parse config file: {0}")]
	Parse(#[from] toml::de::Error),
}
