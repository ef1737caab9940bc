//! Fan-out of change events to the listeners subscribed to a resource key.

use std::{
	fmt,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use dashmap::DashMap;
use tracing::{error, trace};

use crate::key::ResourceKey;

/// Application callback receiving change events.
pub trait Listener<E>: Send + Sync + 'static {
	fn on_event(&self, event: &E);
}

impl<E, F> Listener<E> for F
where
	F: Fn(&E) + Send + Sync + 'static,
{
	fn on_event(&self, event: &E) {
		self(event);
	}
}

/// A registered listener plus whether it already received anything.
pub struct ListenerHandle<E> {
	listener: Arc<dyn Listener<E>>,
	invoked: AtomicBool,
}

impl<E: 'static> fmt::Debug for ListenerHandle<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerHandle")
			.field("invoked", &self.is_invoked())
			.finish_non_exhaustive()
	}
}

impl<E: 'static> ListenerHandle<E> {
	fn new(listener: Arc<dyn Listener<E>>) -> Self {
		Self {
			listener,
			invoked: AtomicBool::new(false),
		}
	}

	pub fn invoke(&self, event: &E) {
		self.invoked.store(true, Ordering::Release);
		self.listener.on_event(event);
	}

	/// Delivers the value current at subscription time, unless an event got here first.
	///
	/// Returns whether the listener was called.
	pub fn invoke_initial(&self, event: &E) -> bool {
		if self
			.invoked
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}

		self.listener.on_event(event);
		true
	}

	#[must_use]
	pub fn is_invoked(&self) -> bool {
		self.invoked.load(Ordering::Acquire)
	}

	/// Identity is the wrapped callback's allocation, not its behaviour.
	#[must_use]
	pub fn wraps(&self, listener: &Arc<dyn Listener<E>>) -> bool {
		Arc::as_ptr(&self.listener).cast::<()>() == Arc::as_ptr(listener).cast::<()>()
	}
}

pub struct ChangeNotifier<E> {
	listeners: DashMap<ResourceKey, Vec<Arc<ListenerHandle<E>>>>,
}

impl<E> fmt::Debug for ChangeNotifier<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChangeNotifier")
			.field("keys", &self.listeners.len())
			.finish()
	}
}

impl<E> Default for ChangeNotifier<E> {
	fn default() -> Self {
		Self {
			listeners: DashMap::new(),
		}
	}
}

impl<E: 'static> ChangeNotifier<E> {
	/// Returns the handle for `listener`, the one already registered for `key` if any.
	pub fn register(
		&self,
		key: ResourceKey,
		listener: Arc<dyn Listener<E>>,
	) -> Arc<ListenerHandle<E>> {
		match self.try_register_with(key, listener, || Ok::<_, std::convert::Infallible>(())) {
			Ok(handle) => handle,
			Err(never) => match never {},
		}
	}

	/// Like [`Self::register`], running `on_register` first while holding the key, so a
	/// concurrent deregister of the last listener sees whatever it set up. Nothing is
	/// registered if it fails.
	pub fn try_register_with<Error>(
		&self,
		key: ResourceKey,
		listener: Arc<dyn Listener<E>>,
		on_register: impl FnOnce() -> Result<(), Error>,
	) -> Result<Arc<ListenerHandle<E>>, Error> {
		let mut handles = self.listeners.entry(key.clone()).or_default();

		if let Err(e) = on_register() {
			drop(handles);
			self.listeners.remove_if(&key, |_, handles| handles.is_empty());
			return Err(e);
		}

		if let Some(handle) = handles.iter().find(|handle| handle.wraps(&listener)) {
			return Ok(Arc::clone(handle));
		}

		let handle = Arc::new(ListenerHandle::new(listener));
		handles.push(Arc::clone(&handle));

		Ok(handle)
	}

	/// Returns whether `key` has no listener left.
	pub fn deregister(&self, key: &ResourceKey, listener: &Arc<dyn Listener<E>>) -> bool {
		self.deregister_and_then(key, listener, || {})
	}

	/// Like [`Self::deregister`], running `on_unsubscribed` while still holding the key when its
	/// last listener goes away, so a concurrent register can't slip in between.
	pub fn deregister_and_then(
		&self,
		key: &ResourceKey,
		listener: &Arc<dyn Listener<E>>,
		on_unsubscribed: impl FnOnce(),
	) -> bool {
		self.listeners
			.remove_if_mut(key, |_, handles| {
				handles.retain(|handle| !handle.wraps(listener));

				if handles.is_empty() {
					on_unsubscribed();
					true
				} else {
					false
				}
			})
			.is_some()
			|| !self.listeners.contains_key(key)
	}

	#[must_use]
	pub fn is_subscribed(&self, key: &ResourceKey) -> bool {
		self.listeners
			.get(key)
			.map_or(false, |handles| !handles.is_empty())
	}

	#[must_use]
	pub fn listener_count(&self, key: &ResourceKey) -> usize {
		self.listeners.get(key).map_or(0, |handles| handles.len())
	}

	/// Calls every listener of `key`; a panicking listener doesn't stop the others.
	pub fn dispatch(&self, key: &ResourceKey, event: &E) {
		let Some(handles) = self
			.listeners
			.get(key)
			.map(|handles| handles.value().clone())
		else {
			return;
		};

		trace!(%key, listeners = handles.len(), "Dispatching change event");

		for handle in handles {
			if catch_unwind(AssertUnwindSafe(|| handle.invoke(event))).is_err() {
				error!(%key, "Listener unexpectedly panicked;");
			}
		}
	}
}
