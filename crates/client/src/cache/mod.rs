//! Read-through cache of registry records, kept warm by one refresh task per watched key.

use std::{sync::Arc, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use registry_scheduler::{Scheduler, TaskHandle};
use tracing::{debug, trace};

use crate::{
	error::Error,
	key::ResourceKey,
	notifier::{ChangeNotifier, Listener},
	remote::{Capability, RemoteClient},
};

mod kinds;
mod refresh;

pub use kinds::{AgentCardKind, McpServerKind};
pub use refresh::RefreshTask;

/// A kind of record the registry serves and this client caches.
#[async_trait::async_trait]
pub trait ResourceKind: Send + Sync + 'static {
	type Record: Clone + Send + Sync + 'static;

	const KIND: &'static str;
	const CAPABILITY: Capability;

	/// The concrete versioned slot of `record`.
	fn key_of(record: &Self::Record) -> ResourceKey;

	/// Whether the server marks `record` as the latest version, `None` if it didn't say.
	fn is_latest(record: &Self::Record) -> Option<bool>;

	fn has_changed(current: &Self::Record, previous: Option<&Self::Record>) -> bool;

	async fn fetch(client: &RemoteClient, key: &ResourceKey) -> Result<Self::Record, Error>;
}

pub struct ReadCache<K: ResourceKind> {
	records: DashMap<ResourceKey, K::Record>,
	refresh_tasks: DashMap<ResourceKey, TaskHandle>,
	notifier: Arc<ChangeNotifier<K::Record>>,
	client: RemoteClient,
	scheduler: Scheduler,
	refresh_interval: Duration,
}

impl<K: ResourceKind> std::fmt::Debug for ReadCache<K> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReadCache")
			.field("kind", &K::KIND)
			.field("records", &self.records.len())
			.field("refresh_tasks", &self.refresh_tasks.len())
			.field("refresh_interval", &self.refresh_interval)
			.finish_non_exhaustive()
	}
}

impl<K: ResourceKind> ReadCache<K> {
	#[must_use]
	pub fn new(
		client: RemoteClient,
		notifier: Arc<ChangeNotifier<K::Record>>,
		scheduler: Scheduler,
		refresh_interval: Duration,
	) -> Self {
		Self {
			records: DashMap::new(),
			refresh_tasks: DashMap::new(),
			notifier,
			client,
			scheduler,
			refresh_interval,
		}
	}

	/// Cached record for `key`, never touching the network.
	#[must_use]
	pub fn get(&self, key: &ResourceKey) -> Option<K::Record> {
		self.records.get(key).map(|record| record.clone())
	}

	#[must_use]
	pub fn notifier(&self) -> &Arc<ChangeNotifier<K::Record>> {
		&self.notifier
	}

	/// Stores a freshly fetched record and tells listeners if it changed.
	///
	/// Change detection runs against the same version's previous record; latest listeners are
	/// also told when the latest slot moved to another version.
	pub fn process_update(&self, record: K::Record) {
		let key = K::key_of(&record);
		let is_latest = K::is_latest(&record).unwrap_or(true);

		let previous = self.records.insert(key.clone(), record.clone());
		let previous_latest = is_latest
			.then(|| self.records.insert(key.as_latest(), record.clone()))
			.flatten();

		let changed = K::has_changed(&record, previous.as_ref());
		let latest_moved = previous_latest
			.as_ref()
			.map_or(false, |previous| K::key_of(previous) != key);

		trace!(kind = K::KIND, %key, is_latest, changed, latest_moved, "Processed update");

		if changed {
			self.notifier.dispatch(&key, &record);
		}

		if is_latest && (changed || latest_moved) {
			self.notifier.dispatch(&key.as_latest(), &record);
		}
	}

	/// Starts watching `key`, unless it's already watched.
	pub fn add_refresh_task(self: &Arc<Self>, key: ResourceKey) -> Result<(), Error> {
		if let Entry::Vacant(entry) = self.refresh_tasks.entry(key.clone()) {
			let handle = self.scheduler.schedule_with_fixed_delay(
				self.refresh_interval,
				self.refresh_interval,
				RefreshTask::new(Arc::clone(self), key),
			)?;

			debug!(kind = K::KIND, key = %entry.key(), "Added refresh task");
			entry.insert(handle);
		}

		Ok(())
	}

	/// Stops watching `key`; a refresh in flight completes but won't reschedule.
	pub fn remove_refresh_task(&self, key: &ResourceKey) {
		if let Some((_, handle)) = self.refresh_tasks.remove(key) {
			handle.cancel();
			debug!(kind = K::KIND, %key, "Removed refresh task");
		}
	}

	#[must_use]
	pub fn is_refreshing(&self, key: &ResourceKey) -> bool {
		self.refresh_tasks.contains_key(key)
	}

	#[must_use]
	pub fn refresh_task_count(&self) -> usize {
		self.refresh_tasks.len()
	}

	/// Current record for `key`, from the cache or else the server.
	async fn current(&self, key: &ResourceKey) -> Result<Option<K::Record>, Error> {
		if let Some(record) = self.get(key) {
			return Ok(Some(record));
		}

		match K::fetch(&self.client, key).await {
			Ok(record) => {
				self.process_update(record.clone());
				Ok(Some(record))
			}
			Err(Error::NotFound(_)) => {
				debug!(kind = K::KIND, %key, "Subscribed to a resource that doesn't exist yet");
				Ok(None)
			}
			Err(e) => Err(e),
		}
	}

	/// Registers `listener` on `key`, starts watching it and returns its current record.
	///
	/// The watch is in place before the first fetch, so a resource that doesn't exist yet gets
	/// its creation noticed, and other fetch failures are returned with the watch still running.
	/// `listener` gets the current record unless a refresh already delivered one.
	pub async fn subscribe(
		self: &Arc<Self>,
		key: &ResourceKey,
		listener: Arc<dyn Listener<K::Record>>,
	) -> Result<Option<K::Record>, Error> {
		let handle = self
			.notifier
			.try_register_with(key.clone(), listener, || self.add_refresh_task(key.clone()))?;

		let current = self.current(key).await?;

		if let Some(record) = &current {
			handle.invoke_initial(record);
		}

		Ok(current)
	}

	/// Removes `listener` from `key`, and stops watching `key` once nobody listens anymore.
	///
	/// The cached record stays, to serve a later subscription right away.
	pub fn unsubscribe(&self, key: &ResourceKey, listener: &Arc<dyn Listener<K::Record>>) {
		self.notifier
			.deregister_and_then(key, listener, || self.remove_refresh_task(key));
	}
}
