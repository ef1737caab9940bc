use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{agent::same_elements, require, require_port};
use crate::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpFrontEndpoint {
	pub address: String,
	pub port: u16,
	#[serde(default)]
	pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpToolSpec {
	pub tools: Vec<McpTool>,
}

/// What a publisher states about an MCP server when releasing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerBasicInfo {
	pub name: String,
	pub description: String,
	pub protocol: String,
	pub version: String,
}

impl McpServerBasicInfo {
	pub(crate) fn validate(&self) -> Result<(), Error> {
		require("mcp server name", &self.name)?;
		require("mcp server version", &self.version)
	}
}

/// How clients reach a released server, `kind` being e.g. `REF` or `DIRECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpEndpointSpec {
	#[serde(rename = "type")]
	pub kind: String,
	pub data: BTreeMap<String, String>,
}

/// An MCP server as stored by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerDetail {
	pub id: String,
	pub name: String,
	pub description: String,
	pub protocol: String,
	pub version: String,
	pub front_endpoints: Option<Vec<McpFrontEndpoint>>,
	pub tool_spec: Option<McpToolSpec>,
	pub latest_version: Option<bool>,
}

impl McpServerDetail {
	/// Whether connecting to this server would resolve differently than with `previous`.
	#[must_use]
	pub fn connectivity_changed(&self, previous: Option<&Self>) -> bool {
		let Some(previous) = previous else {
			return true;
		};

		if self.version != previous.version {
			return true;
		}

		match (&self.front_endpoints, &previous.front_endpoints) {
			(None, None) => self.protocol != previous.protocol,
			(Some(current), Some(previous)) => !same_elements(current, previous),
			_ => true,
		}
	}
}

/// A backend instance of an MCP server, registered ephemerally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerEndpoint {
	pub address: String,
	pub port: u16,
	pub version: Option<String>,
}

impl McpServerEndpoint {
	pub fn new(address: impl Into<String>, port: u16, version: Option<&str>) -> Self {
		Self {
			address: address.into(),
			port,
			version: version.map(ToString::to_string),
		}
	}

	pub(crate) fn validate(&self) -> Result<(), Error> {
		require("endpoint address", &self.address)?;
		require_port(self.port)?;

		match &self.version {
			Some(version) => require("endpoint version", version),
			None => Ok(()),
		}
	}
}
