use crate::{
	error::Error,
	key::ResourceKey,
	model::{AgentCardDetail, McpServerDetail},
	remote::{Capability, RemoteClient},
};

use super::ResourceKind;

#[derive(Debug, Clone, Copy)]
pub struct AgentCardKind;

#[async_trait::async_trait]
impl ResourceKind for AgentCardKind {
	type Record = AgentCardDetail;

	const KIND: &'static str = "agent_card";
	const CAPABILITY: Capability = Capability::AgentRegistry;

	fn key_of(record: &AgentCardDetail) -> ResourceKey {
		ResourceKey::versioned(record.card.name.clone(), record.card.version.clone())
	}

	fn is_latest(record: &AgentCardDetail) -> Option<bool> {
		record.latest_version
	}

	fn has_changed(current: &AgentCardDetail, previous: Option<&AgentCardDetail>) -> bool {
		current.connectivity_changed(previous)
	}

	async fn fetch(client: &RemoteClient, key: &ResourceKey) -> Result<AgentCardDetail, Error> {
		client.query_agent_card(key, None).await
	}
}

#[derive(Debug, Clone, Copy)]
pub struct McpServerKind;

#[async_trait::async_trait]
impl ResourceKind for McpServerKind {
	type Record = McpServerDetail;

	const KIND: &'static str = "mcp_server";
	const CAPABILITY: Capability = Capability::McpRegistry;

	fn key_of(record: &McpServerDetail) -> ResourceKey {
		ResourceKey::versioned(record.name.clone(), record.version.clone())
	}

	fn is_latest(record: &McpServerDetail) -> Option<bool> {
		record.latest_version
	}

	fn has_changed(current: &McpServerDetail, previous: Option<&McpServerDetail>) -> bool {
		current.connectivity_changed(previous)
	}

	async fn fetch(client: &RemoteClient, key: &ResourceKey) -> Result<McpServerDetail, Error> {
		client.query_mcp_server(key).await
	}
}
