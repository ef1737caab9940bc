use std::fmt;

use serde::{Deserialize, Serialize};

const LATEST: &str = "latest";

/// Identifies a cached or watched record: a resource name plus either a concrete version or the
/// "latest" slot, which mirrors whichever version the server currently marks as latest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
	name: String,
	version: Option<String>,
}

impl ResourceKey {
	/// A blank `version` addresses the latest slot.
	pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
		Self {
			name: name.into(),
			version: version
				.filter(|version| !version.trim().is_empty())
				.map(ToString::to_string),
		}
	}

	pub fn latest(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			version: None,
		}
	}

	pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
		let version = version.into();
		Self::new(name, Some(version.as_str()))
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn version(&self) -> Option<&str> {
		self.version.as_deref()
	}

	#[must_use]
	pub const fn is_latest(&self) -> bool {
		self.version.is_none()
	}

	#[must_use]
	pub fn as_latest(&self) -> Self {
		Self::latest(self.name.clone())
	}
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}::{}",
			self.name,
			self.version.as_deref().unwrap_or(LATEST)
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_version_is_latest() {
		assert!(ResourceKey::new("svc-a", None).is_latest());
		assert!(ResourceKey::new("svc-a", Some("")).is_latest());
		assert!(ResourceKey::new("svc-a", Some("  ")).is_latest());
		assert_eq!(ResourceKey::new("svc-a", Some("")), ResourceKey::latest("svc-a"));
	}

	#[test]
	fn latest_and_versioned_slots_are_distinct() {
		let versioned = ResourceKey::versioned("svc-a", "1.0");

		assert_ne!(versioned, ResourceKey::latest("svc-a"));
		assert_eq!(versioned.as_latest(), ResourceKey::latest("svc-a"));
		assert_eq!(versioned.version(), Some("1.0"));
	}

	#[test]
	fn display() {
		assert_eq!(ResourceKey::versioned("svc-a", "1.0").to_string(), "svc-a::1.0");
		assert_eq!(ResourceKey::latest("svc-a").to_string(), "svc-a::latest");
	}
}
