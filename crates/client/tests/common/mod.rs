#![allow(dead_code, clippy::unwrap_used)]

use std::{
	collections::{HashMap, HashSet},
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use registry_client::{
	model::{AgentCardDetail, AgentEndpoint, McpServerDetail},
	remote::{EndpointOperation, ErrorCode, Request, Response},
	AiClient, Capability, CapabilityStatus, ClientConfig, Listener, RemoteError, ResourceKey,
	SessionEvent, Transport, TransportError,
};
use tokio::sync::broadcast;

pub const TICK: Duration = Duration::from_secs(1);

/// In-memory registry server behind a session that tests connect and disconnect at will.
pub struct FakeTransport {
	running: AtomicBool,
	events: broadcast::Sender<SessionEvent>,
	capabilities: Mutex<HashMap<Capability, CapabilityStatus>>,
	agent_cards: Mutex<HashMap<ResourceKey, AgentCardDetail>>,
	mcp_servers: Mutex<HashMap<ResourceKey, McpServerDetail>>,
	failing: Mutex<HashSet<String>>,
	deny: AtomicBool,
	requests: Mutex<Vec<Request>>,
	credential_refreshes: AtomicUsize,
	drop_session_before_ack: AtomicBool,
	query_delay: Mutex<Duration>,
}

impl FakeTransport {
	pub fn new(running: bool) -> Arc<Self> {
		Arc::new(Self {
			running: AtomicBool::new(running),
			events: broadcast::channel(16).0,
			capabilities: Mutex::default(),
			agent_cards: Mutex::default(),
			mcp_servers: Mutex::default(),
			failing: Mutex::default(),
			deny: AtomicBool::new(false),
			requests: Mutex::default(),
			credential_refreshes: AtomicUsize::new(0),
			drop_session_before_ack: AtomicBool::new(false),
			query_delay: Mutex::new(Duration::ZERO),
		})
	}

	pub fn connect(&self) {
		self.running.store(true, Ordering::SeqCst);
		let _ = self.events.send(SessionEvent::Connected);
	}

	pub fn disconnect(&self) {
		self.running.store(false, Ordering::SeqCst);
		let _ = self.events.send(SessionEvent::Disconnected);
	}

	pub fn set_capability(&self, capability: Capability, status: CapabilityStatus) {
		self.capabilities
			.lock()
			.unwrap()
			.insert(capability, status);
	}

	/// Stores `card` under its version, and as latest unless marked otherwise, demoting the
	/// previous latest version.
	pub fn put_agent_card(&self, card: AgentCardDetail) {
		let mut cards = self.agent_cards.lock().unwrap();
		let key = ResourceKey::versioned(card.card.name.clone(), card.card.version.clone());

		if card.latest_version != Some(false) {
			for (other, stored) in cards.iter_mut() {
				if other.name() == key.name() && !other.is_latest() && *other != key {
					stored.latest_version = Some(false);
				}
			}
			cards.insert(key.as_latest(), card.clone());
		}
		cards.insert(key, card);
	}

	pub fn put_mcp_server(&self, server: McpServerDetail) {
		let mut servers = self.mcp_servers.lock().unwrap();
		let key = ResourceKey::versioned(server.name.clone(), server.version.clone());

		if server.latest_version != Some(false) {
			for (other, stored) in servers.iter_mut() {
				if other.name() == key.name() && !other.is_latest() && *other != key {
					stored.latest_version = Some(false);
				}
			}
			servers.insert(key.as_latest(), server.clone());
		}
		servers.insert(key, server);
	}

	/// Endpoint requests for `name` get a server error until [`Self::heal`].
	pub fn fail(&self, name: &str) {
		self.failing.lock().unwrap().insert(name.to_string());
	}

	pub fn heal(&self, name: &str) {
		self.failing.lock().unwrap().remove(name);
	}

	/// The next endpoint request is applied, but the session drops before it's acknowledged.
	pub fn drop_session_before_next_ack(&self) {
		self.drop_session_before_ack.store(true, Ordering::SeqCst);
	}

	/// Queries take `delay` to answer.
	pub fn delay_queries(&self, delay: Duration) {
		*self.query_delay.lock().unwrap() = delay;
	}

	pub fn deny(&self, deny: bool) {
		self.deny.store(deny, Ordering::SeqCst);
	}

	pub fn credential_refreshes(&self) -> usize {
		self.credential_refreshes.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<Request> {
		self.requests.lock().unwrap().clone()
	}

	pub fn query_count(&self) -> usize {
		self.requests()
			.iter()
			.filter(|request| {
				matches!(
					request,
					Request::QueryAgentCard { .. } | Request::QueryMcpServer { .. }
				)
			})
			.count()
	}

	/// Endpoint requests as `(name, operation, endpoints)`, in arrival order.
	pub fn agent_endpoint_requests(&self) -> Vec<(String, EndpointOperation, Vec<AgentEndpoint>)> {
		self.requests()
			.into_iter()
			.filter_map(|request| match request {
				Request::AgentEndpoint {
					agent_name,
					operation,
					endpoint,
					..
				} => Some((agent_name, operation, vec![endpoint])),
				Request::BatchAgentEndpoint {
					agent_name,
					endpoints,
					..
				} => Some((agent_name, EndpointOperation::Register, endpoints)),
				_ => None,
			})
			.collect()
	}

	pub fn mcp_endpoint_requests(&self) -> Vec<(String, EndpointOperation)> {
		self.requests()
			.into_iter()
			.filter_map(|request| match request {
				Request::McpServerEndpoint {
					server_name,
					operation,
					..
				} => Some((server_name, operation)),
				_ => None,
			})
			.collect()
	}

	async fn endpoint_response(&self, name: &str) -> Response {
		if self.drop_session_before_ack.swap(false, Ordering::SeqCst) {
			self.disconnect();
			// Lets the client see the disconnect before the answer
			for _ in 0..10 {
				tokio::task::yield_now().await;
			}
		}

		if self.failing.lock().unwrap().contains(name) {
			Response::Failed {
				code: ErrorCode::from_code(500),
				message: format!("{name} is failing"),
			}
		} else {
			Response::EndpointAck
		}
	}
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
	async fn request(&self, request: Request) -> Result<Response, RemoteError> {
		if !self.running.load(Ordering::SeqCst) {
			return Err(TransportError("session is down".to_string()).into());
		}

		self.requests.lock().unwrap().push(request.clone());

		if self.deny.load(Ordering::SeqCst) {
			return Ok(Response::Failed {
				code: ErrorCode::NoRight,
				message: "token expired".to_string(),
			});
		}

		if matches!(
			request,
			Request::QueryAgentCard { .. } | Request::QueryMcpServer { .. }
		) {
			let delay = *self.query_delay.lock().unwrap();
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
		}

		let not_found = || Response::Failed {
			code: ErrorCode::NotFound,
			message: "no such resource".to_string(),
		};

		Ok(match request {
			Request::QueryAgentCard { key, .. } => self
				.agent_cards
				.lock()
				.unwrap()
				.get(&key)
				.cloned()
				.map_or_else(not_found, Response::AgentCard),

			Request::QueryMcpServer { key, .. } => self
				.mcp_servers
				.lock()
				.unwrap()
				.get(&key)
				.cloned()
				.map_or_else(not_found, Response::McpServer),

			Request::ReleaseAgentCard { card, .. } => Response::Released { id: card.name },

			Request::ReleaseMcpServer { server, .. } => Response::Released {
				id: format!("{}-id", server.name),
			},

			Request::AgentEndpoint { agent_name, .. }
			| Request::BatchAgentEndpoint { agent_name, .. } => {
				self.endpoint_response(&agent_name).await
			}

			Request::McpServerEndpoint { server_name, .. } => {
				self.endpoint_response(&server_name).await
			}
		})
	}

	fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	fn capability(&self, capability: Capability) -> CapabilityStatus {
		self.capabilities
			.lock()
			.unwrap()
			.get(&capability)
			.copied()
			.unwrap_or(CapabilityStatus::Supported)
	}

	fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
		self.events.subscribe()
	}

	async fn refresh_credentials(&self) {
		self.credential_refreshes.fetch_add(1, Ordering::SeqCst);
	}
}

pub fn config() -> ClientConfig {
	ClientConfig {
		agent_card_refresh_interval_ms: 1_000,
		mcp_server_refresh_interval_ms: 1_000,
		redo_delay_ms: 1_000,
		..Default::default()
	}
}

pub fn client(transport: &Arc<FakeTransport>) -> AiClient {
	AiClient::new(&config(), Arc::clone(transport) as Arc<dyn Transport>).unwrap()
}

pub fn agent_card(name: &str, version: &str, url: &str) -> AgentCardDetail {
	let mut detail = AgentCardDetail::default();
	detail.card.name = name.to_string();
	detail.card.version = version.to_string();
	detail.card.protocol_version = "0.3.0".to_string();
	detail.card.url = url.to_string();
	detail
}

/// A listener counting its calls and keeping the last event.
pub struct Recorder<E> {
	pub calls: AtomicUsize,
	pub last: Mutex<Option<E>>,
}

impl<E: Clone + Send + 'static> Recorder<E> {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			last: Mutex::new(None),
		})
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last(&self) -> Option<E> {
		self.last.lock().unwrap().clone()
	}
}

impl<E: Clone + Send + 'static> Listener<E> for Recorder<E> {
	fn on_event(&self, event: &E) {
		self.calls.fetch_add(1, Ordering::SeqCst);
		*self.last.lock().unwrap() = Some(event.clone());
	}
}
