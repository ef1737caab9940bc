use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use registry_scheduler::Repeat;
use tracing::{debug, error, trace, warn};

use super::{RedoAction, RedoLog, RedoPayload, RedoService};
use crate::remote::RemoteClient;

/// Recurring task replaying divergent redo entries against the server.
#[derive(Debug)]
pub struct Reconciler {
	redo: Arc<RedoService>,
	client: RemoteClient,
}

impl Reconciler {
	#[must_use]
	pub const fn new(redo: Arc<RedoService>, client: RemoteClient) -> Self {
		Self { redo, client }
	}

	/// One pass over every redo log.
	pub async fn reconcile(&self) {
		let online = self.redo.is_connected() && self.client.is_healthy();

		self.reconcile_log(&self.redo.agent_endpoints, online).await;
		self.reconcile_log(&self.redo.mcp_endpoints, online).await;
	}

	async fn reconcile_log<P: RedoPayload>(&self, log: &RedoLog<P>, online: bool) {
		for (name, entry) in log.reconcilable_entries() {
			let Some(action) = entry.action() else {
				continue;
			};

			if action == RedoAction::Remove {
				if log.remove_if_settled(&name) {
					trace!(kind = P::KIND, %name, "Pruned settled redo entry");
				}
				continue;
			}

			if !online {
				continue;
			}

			if AssertUnwindSafe(self.redo_entry(log, &name, action, &entry.desired))
				.catch_unwind()
				.await
				.is_err()
			{
				error!(kind = P::KIND, %name, ?action, "Redo of entry unexpectedly panicked;");
			}
		}
	}

	async fn redo_entry<P: RedoPayload>(
		&self,
		log: &RedoLog<P>,
		name: &str,
		action: RedoAction,
		desired: &P,
	) {
		debug!(kind = P::KIND, %name, ?action, "Redoing registration");

		let session = log.session();

		match action {
			RedoAction::Register => match desired.register(&self.client, name).await {
				Ok(()) => log.mark_pushed(name, desired, session),
				Err(e) => {
					warn!(kind = P::KIND, %name, ?e, "Failed to redo registration;");
				}
			},

			RedoAction::Deregister => match desired.deregister(&self.client, name).await {
				Ok(()) => log.mark_deregistered(name, session),
				Err(e) => {
					warn!(kind = P::KIND, %name, ?e, "Failed to redo deregistration;");
				}
			},

			RedoAction::Remove => {}
		}
	}
}

#[async_trait::async_trait]
impl Repeat for Reconciler {
	async fn run(&self) {
		self.reconcile().await;
	}
}
