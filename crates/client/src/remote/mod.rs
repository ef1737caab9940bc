//! The boundary with the registry server: typed requests over an abstract session transport.

use std::fmt;

use tokio::sync::broadcast;

use crate::{
	error::RemoteError,
	key::ResourceKey,
	model::{
		AgentCard, AgentCardDetail, AgentEndpoint, McpEndpointSpec, McpServerBasicInfo,
		McpServerDetail, McpServerEndpoint, McpToolSpec,
	},
};

mod client;

pub use client::{RemoteClient, DEFAULT_REQUEST_TIMEOUT};

/// Server features negotiated when the session is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
	AgentRegistry,
	McpRegistry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityStatus {
	Supported,
	NotSupported,
	/// No session, so nothing negotiated yet.
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
	Connected,
	Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EndpointOperation {
	Register,
	Deregister,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
	QueryAgentCard {
		namespace: String,
		key: ResourceKey,
		registration_type: Option<String>,
	},
	ReleaseAgentCard {
		namespace: String,
		card: AgentCard,
		registration_type: String,
		set_as_latest: bool,
	},
	AgentEndpoint {
		namespace: String,
		agent_name: String,
		operation: EndpointOperation,
		endpoint: AgentEndpoint,
	},
	BatchAgentEndpoint {
		namespace: String,
		agent_name: String,
		endpoints: Vec<AgentEndpoint>,
	},
	QueryMcpServer {
		namespace: String,
		key: ResourceKey,
	},
	ReleaseMcpServer {
		namespace: String,
		server: McpServerBasicInfo,
		tool_spec: Option<McpToolSpec>,
		endpoint_spec: Option<McpEndpointSpec>,
	},
	McpServerEndpoint {
		namespace: String,
		server_name: String,
		operation: EndpointOperation,
		endpoint: McpServerEndpoint,
	},
}

impl Request {
	#[must_use]
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::QueryAgentCard { .. } => "query_agent_card",
			Self::ReleaseAgentCard { .. } => "release_agent_card",
			Self::AgentEndpoint { .. } => "agent_endpoint",
			Self::BatchAgentEndpoint { .. } => "batch_agent_endpoint",
			Self::QueryMcpServer { .. } => "query_mcp_server",
			Self::ReleaseMcpServer { .. } => "release_mcp_server",
			Self::McpServerEndpoint { .. } => "mcp_server_endpoint",
		}
	}

	/// The record this request is about, used to name a missing resource.
	#[must_use]
	pub fn resource_key(&self) -> ResourceKey {
		match self {
			Self::QueryAgentCard { key, .. } | Self::QueryMcpServer { key, .. } => key.clone(),
			Self::ReleaseAgentCard { card, .. } => {
				ResourceKey::versioned(card.name.clone(), card.version.clone())
			}
			Self::AgentEndpoint { agent_name, .. } | Self::BatchAgentEndpoint { agent_name, .. } => {
				ResourceKey::latest(agent_name.clone())
			}
			Self::ReleaseMcpServer { server, .. } => {
				ResourceKey::versioned(server.name.clone(), server.version.clone())
			}
			Self::McpServerEndpoint { server_name, .. } => ResourceKey::latest(server_name.clone()),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
	AgentCard(AgentCardDetail),
	McpServer(McpServerDetail),
	Released { id: String },
	EndpointAck,
	Failed { code: ErrorCode, message: String },
}

impl Response {
	#[must_use]
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::AgentCard(_) => "agent_card",
			Self::McpServer(_) => "mcp_server",
			Self::Released { .. } => "released",
			Self::EndpointAck => "endpoint_ack",
			Self::Failed { .. } => "failed",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
	NotFound,
	NoRight,
	InvalidParam,
	ServerError,
	Other(i32),
}

impl ErrorCode {
	/// Maps the registry's numeric result codes.
	#[must_use]
	pub const fn from_code(code: i32) -> Self {
		match code {
			404 => Self::NotFound,
			403 => Self::NoRight,
			400 => Self::InvalidParam,
			500 => Self::ServerError,
			other => Self::Other(other),
		}
	}

	#[must_use]
	pub const fn code(self) -> i32 {
		match self {
			Self::NotFound => 404,
			Self::NoRight => 403,
			Self::InvalidParam => 400,
			Self::ServerError => 500,
			Self::Other(code) => code,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.code())
	}
}

/// Session-oriented connection to the registry server.
///
/// Connection lifecycle, TLS, authentication and serialization all live behind this trait.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
	async fn request(&self, request: Request) -> Result<Response, RemoteError>;

	/// Whether the session is currently up.
	fn is_running(&self) -> bool;

	fn capability(&self, capability: Capability) -> CapabilityStatus;

	/// A receiver for connection state changes from now on.
	fn session_events(&self) -> broadcast::Receiver<SessionEvent>;

	/// Called after the server rejected a request for lack of permission.
	async fn refresh_credentials(&self);
}
