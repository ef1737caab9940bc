use std::sync::Arc;

use registry_scheduler::Repeat;
use tracing::{debug, warn};

use super::{ReadCache, ResourceKind};
use crate::{error::Error, key::ResourceKey};

/// Polls the server for one watched key and feeds the result to its cache.
pub struct RefreshTask<K: ResourceKind> {
	cache: Arc<ReadCache<K>>,
	key: ResourceKey,
}

impl<K: ResourceKind> RefreshTask<K> {
	#[must_use]
	pub const fn new(cache: Arc<ReadCache<K>>, key: ResourceKey) -> Self {
		Self { cache, key }
	}
}

#[async_trait::async_trait]
impl<K: ResourceKind> Repeat for RefreshTask<K> {
	async fn run(&self) {
		match K::fetch(&self.cache.client, &self.key).await {
			Ok(record) => self.cache.process_update(record),

			// May simply not exist yet
			Err(Error::NotFound(_)) => {
				debug!(kind = K::KIND, key = %self.key, "Watched resource not found");
			}

			Err(e) => {
				warn!(kind = K::KIND, key = %self.key, ?e, "Failed to refresh watched resource;");
			}
		}
	}
}
