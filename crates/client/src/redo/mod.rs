//! Desired versus confirmed registration state for ephemeral endpoints.
//!
//! Every register or deregister call first records its intent here, then tries to push it. A
//! recurring [`Reconciler`] replays whatever is still divergent once the session is healthy, so
//! registrations survive reconnects without being pushed twice or lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::{
	error::Error,
	model::{EndpointPayload, McpServerEndpoint},
	remote::{RemoteClient, SessionEvent},
};

mod reconciler;

pub use reconciler::Reconciler;

/// Something the reconciler knows how to push and withdraw.
#[async_trait::async_trait]
pub trait RedoPayload: Clone + PartialEq + Send + Sync + 'static {
	const KIND: &'static str;

	async fn register(&self, client: &RemoteClient, name: &str) -> Result<(), Error>;

	async fn deregister(&self, client: &RemoteClient, name: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl RedoPayload for EndpointPayload {
	const KIND: &'static str = "agent_endpoint";

	async fn register(&self, client: &RemoteClient, name: &str) -> Result<(), Error> {
		client.push_agent_endpoints(name, self).await
	}

	async fn deregister(&self, client: &RemoteClient, name: &str) -> Result<(), Error> {
		match self.primary() {
			Some(endpoint) => client.withdraw_agent_endpoint(name, endpoint).await,
			None => Ok(()),
		}
	}
}

#[async_trait::async_trait]
impl RedoPayload for McpServerEndpoint {
	const KIND: &'static str = "mcp_server_endpoint";

	async fn register(&self, client: &RemoteClient, name: &str) -> Result<(), Error> {
		client.push_mcp_server_endpoint(name, self).await
	}

	async fn deregister(&self, client: &RemoteClient, name: &str) -> Result<(), Error> {
		client.withdraw_mcp_server_endpoint(name, self).await
	}
}

/// What the reconciler has to do for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoAction {
	Register,
	Deregister,
	/// Settled, only needs pruning.
	Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoEntry<P> {
	pub desired: P,
	pub registered_on_server: bool,
	pub unregistering: bool,
	pub expected_registered: bool,
}

impl<P> RedoEntry<P> {
	const fn new(desired: P) -> Self {
		Self {
			desired,
			registered_on_server: false,
			unregistering: false,
			expected_registered: true,
		}
	}

	/// `None` while confirmed state already matches the desired one.
	#[must_use]
	pub const fn action(&self) -> Option<RedoAction> {
		match (
			self.registered_on_server,
			self.expected_registered,
			self.unregistering,
		) {
			(false, true, _) => Some(RedoAction::Register),
			// A deregister is pushed even when its register was never confirmed, the server
			// may have applied a push whose answer got lost.
			(true, false, _) | (false, false, true) => Some(RedoAction::Deregister),
			(false, false, false) => Some(RedoAction::Remove),
			(true, true, _) => None,
		}
	}

	#[must_use]
	pub const fn is_settled(&self) -> bool {
		!self.registered_on_server && !self.unregistering && !self.expected_registered
	}
}

/// Redo entries of one payload kind, keyed by resource name.
///
/// Confirmations carry the session they were pushed in, see [`Self::session`].
#[derive(Debug)]
pub struct RedoLog<P> {
	entries: DashMap<String, RedoEntry<P>>,
	session: AtomicU64,
}

impl<P> Default for RedoLog<P> {
	fn default() -> Self {
		Self {
			entries: DashMap::new(),
			session: AtomicU64::new(0),
		}
	}
}

impl<P: Clone + PartialEq> RedoLog<P> {
	/// Must happen before the push, so the intent outlives a push that never completes.
	///
	/// The confirmation survives only a repeat of the exact registration already in place.
	pub fn record_register_intent(&self, name: &str, desired: P) {
		self.entries
			.entry(name.to_string())
			.and_modify(|entry| {
				let unchanged = entry.expected_registered && entry.desired == desired;
				entry.registered_on_server &= unchanged;
				entry.desired = desired.clone();
				entry.expected_registered = true;
				entry.unregistering = false;
			})
			.or_insert_with(|| RedoEntry::new(desired));
	}

	/// Current session, to be read before a push and handed back with its confirmation.
	///
	/// Bumped on every disconnect, so an answer that arrives after its session died confirms
	/// nothing.
	#[must_use]
	pub fn session(&self) -> u64 {
		self.session.load(Ordering::Acquire)
	}

	fn is_current(&self, session: u64) -> bool {
		self.session() == session
	}

	/// Ignored if a deregister intent superseded the register this confirms, or if the
	/// session it was pushed in is gone.
	pub fn mark_registered(&self, name: &str, session: u64) {
		if let Some(mut entry) = self.entries.get_mut(name) {
			if entry.expected_registered && self.is_current(session) {
				entry.registered_on_server = true;
			}
		}
	}

	/// Like [`Self::mark_registered`], and also ignored if the desired payload changed since
	/// `pushed` was sent.
	pub fn mark_pushed(&self, name: &str, pushed: &P, session: u64) {
		if let Some(mut entry) = self.entries.get_mut(name) {
			if entry.expected_registered && entry.desired == *pushed && self.is_current(session) {
				entry.registered_on_server = true;
			}
		}
	}

	/// Returns `false` when there's nothing registered, or about to be, under `name`.
	pub fn record_deregister_intent(&self, name: &str) -> bool {
		self.entries.get_mut(name).map_or(false, |mut entry| {
			entry.unregistering = true;
			entry.expected_registered = false;
			true
		})
	}

	/// Ignored if a register intent superseded the deregister this confirms, or if the session
	/// it was pushed in is gone.
	pub fn mark_deregistered(&self, name: &str, session: u64) {
		if let Some(mut entry) = self.entries.get_mut(name) {
			if !entry.expected_registered && self.is_current(session) {
				entry.registered_on_server = false;
				entry.unregistering = false;
			}
		}
	}

	pub fn remove(&self, name: &str) -> Option<RedoEntry<P>> {
		self.entries.remove(name).map(|(_, entry)| entry)
	}

	/// Removes the entry only if it's still settled at removal time.
	pub fn remove_if_settled(&self, name: &str) -> bool {
		self.entries
			.remove_if(name, |_, entry| entry.is_settled())
			.is_some()
	}

	#[must_use]
	pub fn is_registered(&self, name: &str) -> bool {
		self.entries
			.get(name)
			.map_or(false, |entry| entry.registered_on_server)
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<RedoEntry<P>> {
		self.entries.get(name).map(|entry| entry.clone())
	}

	/// Snapshot of every entry needing a push or a prune.
	#[must_use]
	pub fn reconcilable_entries(&self) -> Vec<(String, RedoEntry<P>)> {
		self.entries
			.iter()
			.filter(|entry| entry.action().is_some())
			.map(|entry| (entry.key().clone(), entry.value().clone()))
			.collect()
	}

	/// Ephemeral registrations die with the session; pending deregisters become settled.
	pub fn mark_all_unregistered(&self) {
		// Before clearing, so a confirmation racing with this can't outlive it
		self.session.fetch_add(1, Ordering::AcqRel);

		self.entries.iter_mut().for_each(|mut entry| {
			entry.registered_on_server = false;
			if !entry.expected_registered {
				entry.unregistering = false;
			}
		});
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Every redo log of a client session, plus what the redo side knows about the connection.
#[derive(Debug)]
pub struct RedoService {
	pub agent_endpoints: RedoLog<EndpointPayload>,
	pub mcp_endpoints: RedoLog<McpServerEndpoint>,
	connected: AtomicBool,
}

impl RedoService {
	#[must_use]
	pub fn new(connected: bool) -> Self {
		Self {
			agent_endpoints: RedoLog::default(),
			mcp_endpoints: RedoLog::default(),
			connected: AtomicBool::new(connected),
		}
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	pub fn on_session_event(&self, event: SessionEvent) {
		match event {
			SessionEvent::Connected => {
				info!("Registry session connected, pending registrations will be redone");
				self.connected.store(true, Ordering::Release);
			}

			SessionEvent::Disconnected => {
				info!("Registry session disconnected, dropping confirmed registrations");
				self.connected.store(false, Ordering::Release);
				self.agent_endpoints.mark_all_unregistered();
				self.mcp_endpoints.mark_all_unregistered();
			}
		}
	}

	/// Applies a received session event; returns `false` once the sender is gone.
	pub(crate) fn on_session_recv(&self, res: Result<SessionEvent, RecvError>) -> bool {
		match res {
			Ok(event) => {
				self.on_session_event(event);
				true
			}

			// Missed events may have included a disconnect
			Err(RecvError::Lagged(skipped)) => {
				debug!(skipped, "Session events lagged, assuming a disconnect");
				self.on_session_event(SessionEvent::Disconnected);
				true
			}

			Err(RecvError::Closed) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn log() -> RedoLog<u16> {
		RedoLog::default()
	}

	#[test]
	fn register_intent_then_confirmation() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		let entry = log.get("svc-a").unwrap();
		assert!(entry.expected_registered);
		assert!(!entry.registered_on_server);
		assert_eq!(entry.action(), Some(RedoAction::Register));

		log.mark_registered("svc-a", log.session());
		assert!(log.is_registered("svc-a"));
		assert!(log.reconcilable_entries().is_empty());
	}

	#[test]
	fn late_register_confirmation_does_not_resurrect() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		assert!(log.record_deregister_intent("svc-a"));
		log.mark_registered("svc-a", log.session());

		assert!(!log.is_registered("svc-a"));
		assert_eq!(
			log.get("svc-a").unwrap().action(),
			Some(RedoAction::Deregister)
		);
	}

	#[test]
	fn late_deregister_confirmation_does_not_undo_register() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		log.mark_registered("svc-a", log.session());
		log.record_deregister_intent("svc-a");
		log.record_register_intent("svc-a", 1);
		log.mark_deregistered("svc-a", log.session());

		let entry = log.get("svc-a").unwrap();
		assert!(entry.expected_registered);
		assert!(!entry.unregistering);
		// The deregister may have reached the server, so push again
		assert_eq!(entry.action(), Some(RedoAction::Register));
	}

	#[test]
	fn repeated_registration_keeps_confirmation() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		log.mark_registered("svc-a", log.session());
		log.record_register_intent("svc-a", 1);
		assert!(log.is_registered("svc-a"));

		log.record_register_intent("svc-a", 2);
		assert!(!log.is_registered("svc-a"));
		assert_eq!(log.get("svc-a").unwrap().desired, 2);
	}

	#[test]
	fn deregister_lifecycle_reaches_settled() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		log.mark_registered("svc-a", log.session());
		log.record_deregister_intent("svc-a");

		let entry = log.get("svc-a").unwrap();
		assert!(entry.unregistering);
		assert!(entry.registered_on_server);
		assert_eq!(entry.action(), Some(RedoAction::Deregister));

		// Not settled yet
		assert!(!log.remove_if_settled("svc-a"));

		log.mark_deregistered("svc-a", log.session());
		let entry = log.get("svc-a").unwrap();
		assert!(entry.is_settled());
		assert_eq!(entry.action(), Some(RedoAction::Remove));
		assert!(log.remove_if_settled("svc-a"));
		assert!(log.is_empty());
	}

	#[test]
	fn confirmation_of_a_replaced_payload_is_ignored() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		log.record_register_intent("svc-a", 2);
		log.mark_pushed("svc-a", &1, log.session());
		assert!(!log.is_registered("svc-a"));

		log.mark_pushed("svc-a", &2, log.session());
		assert!(log.is_registered("svc-a"));
	}

	#[test]
	fn deregister_without_entry() {
		let log = log();
		assert!(!log.record_deregister_intent("svc-a"));
		assert!(log.is_empty());
	}

	#[test]
	fn last_intent_wins() {
		let log = log();

		log.record_register_intent("svc-a", 1);
		log.mark_registered("svc-a", log.session());
		log.record_deregister_intent("svc-a");
		log.record_register_intent("svc-a", 2);
		log.record_deregister_intent("svc-a");
		log.record_register_intent("svc-a", 3);

		let entry = log.get("svc-a").unwrap();
		assert_eq!(entry.desired, 3);
		assert!(entry.expected_registered);
		assert!(!entry.unregistering);
		assert_eq!(entry.action(), Some(RedoAction::Register));
		assert_eq!(log.len(), 1);
	}

	#[test]
	fn disconnect_drops_confirmations() {
		let log = log();

		log.record_register_intent("registered", 1);
		log.mark_registered("registered", log.session());

		log.record_register_intent("leaving", 2);
		log.mark_registered("leaving", log.session());
		log.record_deregister_intent("leaving");

		log.mark_all_unregistered();

		let registered = log.get("registered").unwrap();
		assert!(!registered.registered_on_server);
		assert_eq!(registered.action(), Some(RedoAction::Register));

		let leaving = log.get("leaving").unwrap();
		assert!(leaving.is_settled());
		assert_eq!(leaving.action(), Some(RedoAction::Remove));
	}

	#[test]
	fn confirmation_from_a_dropped_session_is_ignored() {
		let log = log();

		log.record_register_intent("registering", 1);
		log.record_register_intent("leaving", 2);
		log.mark_registered("leaving", log.session());
		log.record_deregister_intent("leaving");

		let session = log.session();
		log.mark_all_unregistered();
		log.record_register_intent("leaving", 2);

		log.mark_pushed("registering", &1, session);
		log.mark_registered("leaving", session);
		assert!(!log.is_registered("registering"));
		assert!(!log.is_registered("leaving"));

		log.mark_pushed("registering", &1, log.session());
		assert!(log.is_registered("registering"));
	}

	#[test]
	fn session_events_drive_connected_flag() {
		let service = RedoService::new(false);
		service.agent_endpoints.record_register_intent(
			"agent",
			EndpointPayload::Single(crate::model::AgentEndpoint::new("10.0.0.1", 9000, "1.0")),
		);
		service
			.agent_endpoints
			.mark_registered("agent", service.agent_endpoints.session());

		service.on_session_event(SessionEvent::Connected);
		assert!(service.is_connected());
		assert!(service.agent_endpoints.is_registered("agent"));

		assert!(service.on_session_recv(Err(RecvError::Lagged(3))));
		assert!(!service.is_connected());
		assert!(!service.agent_endpoints.is_registered("agent"));

		assert!(!service.on_session_recv(Err(RecvError::Closed)));
	}
}
