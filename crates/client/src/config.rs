use std::{io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_NAMESPACE: &str = "public";

/// Client settings, read from TOML; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	pub namespace: String,
	/// Falls back to the client's default request timeout when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_timeout_ms: Option<u64>,
	pub agent_card_refresh_interval_ms: u64,
	pub mcp_server_refresh_interval_ms: u64,
	pub redo_delay_ms: u64,
	pub refresh_workers: usize,
	pub redo_workers: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			namespace: DEFAULT_NAMESPACE.to_string(),
			request_timeout_ms: None,
			agent_card_refresh_interval_ms: 10_000,
			mcp_server_refresh_interval_ms: 10_000,
			redo_delay_ms: 3_000,
			refresh_workers: 1,
			redo_workers: 1,
		}
	}
}

impl ClientConfig {
	/// Reads the config at `path`, or the defaults if there's no such file.
	pub async fn load(path: impl AsRef<Path> + Send) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		match fs::read_to_string(path).await {
			Ok(contents) => Self::parse(&contents),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!(path = %path.display(), "No client config file, using defaults");
				Ok(Self::default())
			}
			Err(source) => Err(ConfigError::Io {
				path: path.to_path_buf(),
				source,
			}),
		}
	}

	pub fn parse(contents: &str) -> Result<Self, ConfigError> {
		toml::from_str(contents).map_err(Into::into)
	}

	/// Blank namespaces mean the default one.
	#[must_use]
	pub fn namespace(&self) -> &str {
		if self.namespace.trim().is_empty() {
			DEFAULT_NAMESPACE
		} else {
			&self.namespace
		}
	}

	#[must_use]
	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}

	#[must_use]
	pub const fn agent_card_refresh_interval(&self) -> Duration {
		Duration::from_millis(self.agent_card_refresh_interval_ms)
	}

	#[must_use]
	pub const fn mcp_server_refresh_interval(&self) -> Duration {
		Duration::from_millis(self.mcp_server_refresh_interval_ms)
	}

	#[must_use]
	pub const fn redo_delay(&self) -> Duration {
		Duration::from_millis(self.redo_delay_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_file_gives_defaults() {
		let dir = tempfile::tempdir().unwrap();

		let config = ClientConfig::load(dir.path().join("client.toml"))
			.await
			.unwrap();

		assert_eq!(config, ClientConfig::default());
		assert_eq!(config.redo_delay(), Duration::from_secs(3));
		assert_eq!(config.agent_card_refresh_interval(), Duration::from_secs(10));
		assert_eq!(config.request_timeout(), None);
	}

	#[tokio::test]
	async fn partial_file_keeps_other_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("client.toml");
		fs::write(
			&path,
			"namespace = \"team-a\"\nrequest_timeout_ms = 500\nredo_workers = 2\n",
		)
		.await
		.unwrap();

		let config = ClientConfig::load(&path).await.unwrap();

		assert_eq!(config.namespace(), "team-a");
		assert_eq!(config.request_timeout(), Some(Duration::from_millis(500)));
		assert_eq!(config.redo_workers, 2);
		assert_eq!(config.mcp_server_refresh_interval_ms, 10_000);
	}

	#[test]
	fn blank_namespace_is_public() {
		let config = ClientConfig::parse("namespace = \"  \"").unwrap();
		assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
	}

	#[test]
	fn malformed_file_is_a_parse_error() {
		assert!(matches!(
			ClientConfig::parse("redo_delay_ms = \"soon\""),
			Err(ConfigError::Parse(_))
		));
	}
}
