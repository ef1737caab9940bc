use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{
	Capability, CapabilityStatus, EndpointOperation, ErrorCode, Request, Response, Transport,
};
use crate::{
	error::{Error, RemoteError},
	key::ResourceKey,
	model::{
		AgentCard, AgentCardDetail, AgentEndpoint, EndpointPayload, McpEndpointSpec,
		McpServerBasicInfo, McpServerDetail, McpServerEndpoint, McpToolSpec,
	},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Issues typed registry requests over a [`Transport`], turning server failures into [`Error`]s.
#[derive(Clone)]
pub struct RemoteClient {
	id: Uuid,
	namespace: String,
	request_timeout: Duration,
	transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for RemoteClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteClient")
			.field("id", &self.id)
			.field("namespace", &self.namespace)
			.field("request_timeout", &self.request_timeout)
			.finish_non_exhaustive()
	}
}

impl RemoteClient {
	pub fn new(
		namespace: impl Into<String>,
		request_timeout: Option<Duration>,
		transport: Arc<dyn Transport>,
	) -> Self {
		Self {
			id: Uuid::new_v4(),
			namespace: namespace.into(),
			request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
			transport,
		}
	}

	#[must_use]
	pub const fn id(&self) -> Uuid {
		self.id
	}

	#[must_use]
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	#[must_use]
	pub fn is_healthy(&self) -> bool {
		self.transport.is_running()
	}

	#[must_use]
	pub fn capability_status(&self, capability: Capability) -> CapabilityStatus {
		if !self.is_healthy() {
			return CapabilityStatus::Unknown;
		}

		self.transport.capability(capability)
	}

	#[must_use]
	pub fn is_capability_supported(&self, capability: Capability) -> bool {
		self.capability_status(capability) == CapabilityStatus::Supported
	}

	/// Fails only when the server is known to lack `capability`; an unknown status lets the
	/// caller go on, since nothing was negotiated yet.
	pub fn ensure_capability(&self, capability: Capability) -> Result<(), Error> {
		match self.capability_status(capability) {
			CapabilityStatus::NotSupported => Err(Error::Unsupported(capability)),
			CapabilityStatus::Supported | CapabilityStatus::Unknown => Ok(()),
		}
	}

	pub async fn query_agent_card(
		&self,
		key: &ResourceKey,
		registration_type: Option<&str>,
	) -> Result<AgentCardDetail, Error> {
		let request = Request::QueryAgentCard {
			namespace: self.namespace.clone(),
			key: key.clone(),
			registration_type: registration_type.map(ToString::to_string),
		};

		match self.send(request).await? {
			Response::AgentCard(detail) => Ok(detail),
			other => Err(unexpected("query_agent_card", &other)),
		}
	}

	pub async fn release_agent_card(
		&self,
		card: AgentCard,
		registration_type: &str,
		set_as_latest: bool,
	) -> Result<(), Error> {
		let request = Request::ReleaseAgentCard {
			namespace: self.namespace.clone(),
			card,
			registration_type: registration_type.to_string(),
			set_as_latest,
		};

		match self.send(request).await? {
			Response::Released { .. } | Response::EndpointAck => Ok(()),
			other => Err(unexpected("release_agent_card", &other)),
		}
	}

	/// Registers the whole payload; a batch replaces every endpoint previously pushed for the
	/// agent by this session.
	pub async fn push_agent_endpoints(
		&self,
		agent_name: &str,
		payload: &EndpointPayload,
	) -> Result<(), Error> {
		let request = match payload {
			EndpointPayload::Single(endpoint) => Request::AgentEndpoint {
				namespace: self.namespace.clone(),
				agent_name: agent_name.to_string(),
				operation: EndpointOperation::Register,
				endpoint: endpoint.clone(),
			},
			EndpointPayload::Batch(endpoints) => Request::BatchAgentEndpoint {
				namespace: self.namespace.clone(),
				agent_name: agent_name.to_string(),
				endpoints: endpoints.clone(),
			},
		};

		self.expect_ack(request).await
	}

	pub async fn withdraw_agent_endpoint(
		&self,
		agent_name: &str,
		endpoint: &AgentEndpoint,
	) -> Result<(), Error> {
		self.expect_ack(Request::AgentEndpoint {
			namespace: self.namespace.clone(),
			agent_name: agent_name.to_string(),
			operation: EndpointOperation::Deregister,
			endpoint: endpoint.clone(),
		})
		.await
	}

	pub async fn query_mcp_server(&self, key: &ResourceKey) -> Result<McpServerDetail, Error> {
		let request = Request::QueryMcpServer {
			namespace: self.namespace.clone(),
			key: key.clone(),
		};

		match self.send(request).await? {
			Response::McpServer(detail) => Ok(detail),
			other => Err(unexpected("query_mcp_server", &other)),
		}
	}

	pub async fn release_mcp_server(
		&self,
		server: McpServerBasicInfo,
		tool_spec: Option<McpToolSpec>,
		endpoint_spec: Option<McpEndpointSpec>,
	) -> Result<String, Error> {
		let request = Request::ReleaseMcpServer {
			namespace: self.namespace.clone(),
			server,
			tool_spec,
			endpoint_spec,
		};

		match self.send(request).await? {
			Response::Released { id } => Ok(id),
			other => Err(unexpected("release_mcp_server", &other)),
		}
	}

	pub async fn push_mcp_server_endpoint(
		&self,
		server_name: &str,
		endpoint: &McpServerEndpoint,
	) -> Result<(), Error> {
		self.mcp_server_endpoint(server_name, EndpointOperation::Register, endpoint)
			.await
	}

	pub async fn withdraw_mcp_server_endpoint(
		&self,
		server_name: &str,
		endpoint: &McpServerEndpoint,
	) -> Result<(), Error> {
		self.mcp_server_endpoint(server_name, EndpointOperation::Deregister, endpoint)
			.await
	}

	async fn mcp_server_endpoint(
		&self,
		server_name: &str,
		operation: EndpointOperation,
		endpoint: &McpServerEndpoint,
	) -> Result<(), Error> {
		self.expect_ack(Request::McpServerEndpoint {
			namespace: self.namespace.clone(),
			server_name: server_name.to_string(),
			operation,
			endpoint: endpoint.clone(),
		})
		.await
	}

	async fn expect_ack(&self, request: Request) -> Result<(), Error> {
		let kind = request.kind();

		match self.send(request).await? {
			Response::EndpointAck => Ok(()),
			other => Err(unexpected(kind, &other)),
		}
	}

	/// Sends `request` within the request timeout and maps a failed response to an error.
	async fn send(&self, request: Request) -> Result<Response, Error> {
		let kind = request.kind();
		let key = request.resource_key();

		trace!(client_id = %self.id, %key, kind, "Sending request");

		let response = timeout(self.request_timeout, self.transport.request(request))
			.await
			.map_err(|_| RemoteError::Timeout(self.request_timeout))??;

		match response {
			Response::Failed {
				code: ErrorCode::NotFound,
				..
			} => {
				debug!(client_id = %self.id, %key, kind, "Resource not found");
				Err(Error::NotFound(key))
			}

			Response::Failed {
				code: ErrorCode::NoRight,
				message,
			} => {
				warn!(
					client_id = %self.id,
					%key,
					kind,
					%message,
					"Permission denied by server, refreshing credentials;"
				);
				self.transport.refresh_credentials().await;
				Err(RemoteError::PermissionDenied(message).into())
			}

			Response::Failed { code, message } => Err(RemoteError::Server { code, message }.into()),

			response => Ok(response),
		}
	}
}

fn unexpected(request: &'static str, response: &Response) -> Error {
	RemoteError::UnexpectedResponse {
		request,
		response: response.kind(),
	}
	.into()
}
