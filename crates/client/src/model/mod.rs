//! Records and payloads exchanged with the registry server.

mod agent;
mod mcp;

pub use agent::{
	AgentCapabilities, AgentCard, AgentCardDetail, AgentEndpoint, AgentInterface, AgentProvider,
	AgentSkill, EndpointPayload, DEFAULT_REGISTRATION_TYPE, DEFAULT_TRANSPORT,
};
pub use mcp::{
	McpEndpointSpec, McpFrontEndpoint, McpServerBasicInfo, McpServerDetail, McpServerEndpoint,
	McpTool, McpToolSpec,
};

use crate::Error;

fn require(field: &str, value: &str) -> Result<(), Error> {
	if value.trim().is_empty() {
		return Err(Error::InvalidIntent(format!("{field} can't be blank")));
	}

	Ok(())
}

fn require_port(port: u16) -> Result<(), Error> {
	if port == 0 {
		return Err(Error::InvalidIntent("port must be in 1..=65535".to_string()));
	}

	Ok(())
}
