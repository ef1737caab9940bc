use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use futures_concurrency::future::Join;
use registry_scheduler::Scheduler;
use tokio::spawn;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{
	cache::{AgentCardKind, McpServerKind, ReadCache, ResourceKind},
	config::ClientConfig,
	error::Error,
	key::ResourceKey,
	model::{
		AgentCard, AgentCardDetail, AgentEndpoint, EndpointPayload, McpEndpointSpec,
		McpServerBasicInfo, McpServerDetail, McpServerEndpoint, McpToolSpec,
		DEFAULT_REGISTRATION_TYPE,
	},
	notifier::{ChangeNotifier, Listener},
	redo::{Reconciler, RedoLog, RedoPayload, RedoService},
	remote::{Capability, RemoteClient, Transport},
};

/// A registry client session: agent cards, MCP servers and the endpoints registered for them.
///
/// Owns its caches, redo logs and background pools; all of them stop with [`Self::shutdown`].
pub struct AiClient {
	client: RemoteClient,
	redo: Arc<RedoService>,
	agent_cards: Arc<ReadCache<AgentCardKind>>,
	mcp_servers: Arc<ReadCache<McpServerKind>>,
	agent_card_refresh: Scheduler,
	mcp_server_refresh: Scheduler,
	redo_scheduler: Scheduler,
	session_watcher: CancellationToken,
	is_shutdown: AtomicBool,
}

impl std::fmt::Debug for AiClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AiClient")
			.field("client", &self.client)
			.field("agent_cards", &self.agent_cards)
			.field("mcp_servers", &self.mcp_servers)
			.field("is_shutdown", &self.is_shutdown())
			.finish_non_exhaustive()
	}
}

impl AiClient {
	/// Starts the session's background work; must be called from within a tokio runtime.
	pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, Error> {
		// Subscribed before reading the current state, so no transition goes unseen
		let mut session_events = transport.session_events();
		let redo = Arc::new(RedoService::new(transport.is_running()));

		let client = RemoteClient::new(config.namespace(), config.request_timeout(), transport);

		let agent_card_refresh = Scheduler::new("agent_card_refresh", config.refresh_workers);
		let mcp_server_refresh = Scheduler::new("mcp_server_refresh", config.refresh_workers);
		let redo_scheduler = Scheduler::new("redo", config.redo_workers);

		let agent_cards = Arc::new(ReadCache::new(
			client.clone(),
			Arc::new(ChangeNotifier::default()),
			agent_card_refresh.clone(),
			config.agent_card_refresh_interval(),
		));

		let mcp_servers = Arc::new(ReadCache::new(
			client.clone(),
			Arc::new(ChangeNotifier::default()),
			mcp_server_refresh.clone(),
			config.mcp_server_refresh_interval(),
		));

		redo_scheduler.schedule_with_fixed_delay(
			config.redo_delay(),
			config.redo_delay(),
			Reconciler::new(Arc::clone(&redo), client.clone()),
		)?;

		let session_watcher = CancellationToken::new();

		spawn({
			let redo = Arc::clone(&redo);
			let stop = session_watcher.clone();

			async move {
				loop {
					tokio::select! {
						() = stop.cancelled() => break,
						res = session_events.recv() => {
							if !redo.on_session_recv(res) {
								break;
							}
						}
					}
				}

				trace!("Session watcher stopped");
			}
		});

		info!(client_id = %client.id(), namespace = client.namespace(), "Registry client started");

		Ok(Self {
			client,
			redo,
			agent_cards,
			mcp_servers,
			agent_card_refresh,
			mcp_server_refresh,
			redo_scheduler,
			session_watcher,
			is_shutdown: AtomicBool::new(false),
		})
	}

	#[must_use]
	pub const fn remote(&self) -> &RemoteClient {
		&self.client
	}

	#[must_use]
	pub fn redo(&self) -> &RedoService {
		&self.redo
	}

	#[must_use]
	pub fn agent_cards(&self) -> &ReadCache<AgentCardKind> {
		&self.agent_cards
	}

	#[must_use]
	pub fn mcp_servers(&self) -> &ReadCache<McpServerKind> {
		&self.mcp_servers
	}

	#[must_use]
	pub fn is_shutdown(&self) -> bool {
		self.is_shutdown.load(Ordering::Acquire)
	}

	/// One-shot query, bypassing the cache.
	pub async fn get_agent_card(
		&self,
		name: &str,
		version: Option<&str>,
		registration_type: Option<&str>,
	) -> Result<AgentCardDetail, Error> {
		self.ensure_running()?;
		require_name(name)?;
		self.client.ensure_capability(Capability::AgentRegistry)?;

		self.client
			.query_agent_card(&ResourceKey::new(name, version), registration_type)
			.await
	}

	/// Publishes `card`, with [`DEFAULT_REGISTRATION_TYPE`] when none is given.
	pub async fn release_agent_card(
		&self,
		card: AgentCard,
		registration_type: Option<&str>,
		set_as_latest: bool,
	) -> Result<(), Error> {
		self.ensure_running()?;
		card.validate()?;
		self.client.ensure_capability(Capability::AgentRegistry)?;

		let registration_type = registration_type
			.filter(|kind| !kind.trim().is_empty())
			.unwrap_or(DEFAULT_REGISTRATION_TYPE);

		self.client
			.release_agent_card(card, registration_type, set_as_latest)
			.await
	}

	pub async fn register_agent_endpoint(
		&self,
		agent_name: &str,
		endpoint: AgentEndpoint,
	) -> Result<(), Error> {
		self.register_agent_payload(agent_name, EndpointPayload::Single(endpoint))
			.await
	}

	/// Registers every endpoint at once, replacing whatever this session registered before.
	pub async fn register_agent_endpoints(
		&self,
		agent_name: &str,
		endpoints: Vec<AgentEndpoint>,
	) -> Result<(), Error> {
		self.register_agent_payload(agent_name, EndpointPayload::Batch(endpoints))
			.await
	}

	async fn register_agent_payload(
		&self,
		agent_name: &str,
		payload: EndpointPayload,
	) -> Result<(), Error> {
		self.ensure_running()?;
		require_name(agent_name)?;
		payload.validate()?;
		self.client.ensure_capability(Capability::AgentRegistry)?;

		self.register_with_redo(&self.redo.agent_endpoints, agent_name, payload)
			.await
	}

	pub async fn deregister_agent_endpoint(
		&self,
		agent_name: &str,
		endpoint: AgentEndpoint,
	) -> Result<(), Error> {
		self.ensure_running()?;
		require_name(agent_name)?;
		endpoint.validate()?;
		self.client.ensure_capability(Capability::AgentRegistry)?;

		self.deregister_with_redo(
			&self.redo.agent_endpoints,
			agent_name,
			EndpointPayload::Single(endpoint),
		)
		.await
	}

	#[must_use]
	pub fn is_agent_endpoint_registered(&self, agent_name: &str) -> bool {
		self.redo.agent_endpoints.is_registered(agent_name)
	}

	/// Current card for the key and a watch on it; `listener` hears about every later change.
	///
	/// Returns `None` for an agent that doesn't exist yet, whose creation is still watched.
	pub async fn subscribe_agent_card(
		&self,
		agent_name: &str,
		version: Option<&str>,
		listener: Arc<dyn Listener<AgentCardDetail>>,
	) -> Result<Option<AgentCardDetail>, Error> {
		self.subscribe(&self.agent_cards, agent_name, version, listener)
			.await
	}

	pub fn unsubscribe_agent_card(
		&self,
		agent_name: &str,
		version: Option<&str>,
		listener: &Arc<dyn Listener<AgentCardDetail>>,
	) -> Result<(), Error> {
		unsubscribe(&self.agent_cards, agent_name, version, listener)
	}

	/// One-shot query, bypassing the cache.
	pub async fn get_mcp_server(
		&self,
		name: &str,
		version: Option<&str>,
	) -> Result<McpServerDetail, Error> {
		self.ensure_running()?;
		require_name(name)?;
		self.client.ensure_capability(Capability::McpRegistry)?;

		self.client
			.query_mcp_server(&ResourceKey::new(name, version))
			.await
	}

	/// Publishes a server and returns the id the registry gave it.
	pub async fn release_mcp_server(
		&self,
		server: McpServerBasicInfo,
		tool_spec: Option<McpToolSpec>,
		endpoint_spec: Option<McpEndpointSpec>,
	) -> Result<String, Error> {
		self.ensure_running()?;
		server.validate()?;
		self.client.ensure_capability(Capability::McpRegistry)?;

		self.client
			.release_mcp_server(server, tool_spec, endpoint_spec)
			.await
	}

	pub async fn register_mcp_server_endpoint(
		&self,
		server_name: &str,
		address: &str,
		port: u16,
		version: Option<&str>,
	) -> Result<(), Error> {
		self.ensure_running()?;
		require_name(server_name)?;
		let endpoint = McpServerEndpoint::new(address, port, version);
		endpoint.validate()?;
		self.client.ensure_capability(Capability::McpRegistry)?;

		self.register_with_redo(&self.redo.mcp_endpoints, server_name, endpoint)
			.await
	}

	pub async fn deregister_mcp_server_endpoint(
		&self,
		server_name: &str,
		address: &str,
		port: u16,
	) -> Result<(), Error> {
		self.ensure_running()?;
		require_name(server_name)?;

		let version = self
			.redo
			.mcp_endpoints
			.get(server_name)
			.and_then(|entry| entry.desired.version);
		let endpoint = McpServerEndpoint::new(address, port, version.as_deref());
		endpoint.validate()?;
		self.client.ensure_capability(Capability::McpRegistry)?;

		self.deregister_with_redo(&self.redo.mcp_endpoints, server_name, endpoint)
			.await
	}

	#[must_use]
	pub fn is_mcp_server_endpoint_registered(&self, server_name: &str) -> bool {
		self.redo.mcp_endpoints.is_registered(server_name)
	}

	/// Current server for the key and a watch on it; `listener` hears about every later change.
	pub async fn subscribe_mcp_server(
		&self,
		server_name: &str,
		version: Option<&str>,
		listener: Arc<dyn Listener<McpServerDetail>>,
	) -> Result<Option<McpServerDetail>, Error> {
		self.subscribe(&self.mcp_servers, server_name, version, listener)
			.await
	}

	pub fn unsubscribe_mcp_server(
		&self,
		server_name: &str,
		version: Option<&str>,
		listener: &Arc<dyn Listener<McpServerDetail>>,
	) -> Result<(), Error> {
		unsubscribe(&self.mcp_servers, server_name, version, listener)
	}

	/// Stops every background pool; pending redo entries are not flushed.
	pub async fn shutdown(&self) {
		if self.is_shutdown.swap(true, Ordering::AcqRel) {
			return;
		}

		self.session_watcher.cancel();

		(
			self.agent_card_refresh.shutdown(),
			self.mcp_server_refresh.shutdown(),
			self.redo_scheduler.shutdown(),
		)
			.join()
			.await;

		info!(client_id = %self.client.id(), "Registry client shut down");
	}

	fn ensure_running(&self) -> Result<(), Error> {
		if self.is_shutdown() {
			return Err(Error::Shutdown);
		}

		Ok(())
	}

	fn is_online(&self) -> bool {
		self.redo.is_connected() && self.client.is_healthy()
	}

	async fn register_with_redo<P: RedoPayload>(
		&self,
		log: &RedoLog<P>,
		name: &str,
		payload: P,
	) -> Result<(), Error> {
		log.record_register_intent(name, payload.clone());

		if !self.is_online() {
			debug!(kind = P::KIND, %name, "Session offline, registration deferred");
			return Ok(());
		}

		let session = log.session();
		payload.register(&self.client, name).await?;
		log.mark_pushed(name, &payload, session);

		Ok(())
	}

	async fn deregister_with_redo<P: RedoPayload>(
		&self,
		log: &RedoLog<P>,
		name: &str,
		withdrawn: P,
	) -> Result<(), Error> {
		if !log.record_deregister_intent(name) {
			trace!(kind = P::KIND, %name, "Nothing registered, skipping deregistration");
			return Ok(());
		}

		if !self.is_online() {
			debug!(kind = P::KIND, %name, "Session offline, deregistration deferred");
			return Ok(());
		}

		let session = log.session();
		withdrawn.deregister(&self.client, name).await?;
		log.mark_deregistered(name, session);

		Ok(())
	}

	async fn subscribe<K: ResourceKind>(
		&self,
		cache: &Arc<ReadCache<K>>,
		name: &str,
		version: Option<&str>,
		listener: Arc<dyn Listener<K::Record>>,
	) -> Result<Option<K::Record>, Error> {
		self.ensure_running()?;
		require_name(name)?;
		self.client.ensure_capability(K::CAPABILITY)?;

		cache
			.subscribe(&ResourceKey::new(name, version), listener)
			.await
	}
}

fn unsubscribe<K: ResourceKind>(
	cache: &ReadCache<K>,
	name: &str,
	version: Option<&str>,
	listener: &Arc<dyn Listener<K::Record>>,
) -> Result<(), Error> {
	require_name(name)?;

	cache.unsubscribe(&ResourceKey::new(name, version), listener);

	Ok(())
}

fn require_name(name: &str) -> Result<(), Error> {
	if name.trim().is_empty() {
		return Err(Error::InvalidIntent("resource name can't be blank".to_string()));
	}

	Ok(())
}
