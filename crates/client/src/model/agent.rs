use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{require, require_port};
use crate::Error;

pub const DEFAULT_TRANSPORT: &str = "JSONRPC";
pub const DEFAULT_REGISTRATION_TYPE: &str = "SERVICE";

fn default_transport() -> String {
	DEFAULT_TRANSPORT.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInterface {
	pub url: String,
	pub transport: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProvider {
	pub organization: String,
	pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
	pub streaming: Option<bool>,
	pub push_notifications: Option<bool>,
	pub state_transition_history: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSkill {
	pub id: String,
	pub name: String,
	pub description: String,
	pub tags: Vec<String>,
	pub examples: Vec<String>,
}

/// Publicly advertised description of an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCard {
	pub protocol_version: String,
	pub name: String,
	pub description: String,
	pub version: String,
	pub icon_url: Option<String>,
	pub url: String,
	pub preferred_transport: Option<String>,
	pub additional_interfaces: Option<Vec<AgentInterface>>,
	pub provider: Option<AgentProvider>,
	pub documentation_url: Option<String>,
	pub capabilities: Option<AgentCapabilities>,
	pub skills: Vec<AgentSkill>,
	pub default_input_modes: Vec<String>,
	pub default_output_modes: Vec<String>,
}

impl AgentCard {
	pub(crate) fn validate(&self) -> Result<(), Error> {
		require("agent name", &self.name)?;
		require("agent version", &self.version)?;
		require("agent protocol version", &self.protocol_version)
	}
}

/// An [`AgentCard`] as stored by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCardDetail {
	#[serde(flatten)]
	pub card: AgentCard,
	pub registration_type: Option<String>,
	/// Absent when the server didn't say, which counts as latest.
	pub latest_version: Option<bool>,
}

impl AgentCardDetail {
	/// Whether connecting to this agent would resolve differently than with `previous`.
	#[must_use]
	pub fn connectivity_changed(&self, previous: Option<&Self>) -> bool {
		let Some(previous) = previous else {
			return true;
		};

		if self.card.version != previous.card.version {
			return true;
		}

		match (
			&self.card.additional_interfaces,
			&previous.card.additional_interfaces,
		) {
			(None, None) => self.card.url != previous.card.url,
			(Some(current), Some(previous)) => !same_elements(current, previous),
			_ => true,
		}
	}
}

/// A network location at which an agent instance serves requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEndpoint {
	#[serde(default = "default_transport")]
	pub transport: String,
	pub address: String,
	pub port: u16,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub support_tls: bool,
	pub version: String,
}

impl AgentEndpoint {
	pub fn new(address: impl Into<String>, port: u16, version: impl Into<String>) -> Self {
		Self {
			transport: default_transport(),
			address: address.into(),
			port,
			path: String::new(),
			support_tls: false,
			version: version.into(),
		}
	}

	#[must_use]
	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = path.into();
		self
	}

	#[must_use]
	pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
		self.transport = transport.into();
		self
	}

	#[must_use]
	pub const fn with_tls(mut self, support_tls: bool) -> Self {
		self.support_tls = support_tls;
		self
	}

	pub(crate) fn validate(&self) -> Result<(), Error> {
		require("endpoint address", &self.address)?;
		require_port(self.port)?;
		require("endpoint version", &self.version)
	}
}

/// What the application wants registered for one agent.
///
/// Single and batch registrations replace each other: whichever came last is the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointPayload {
	Single(AgentEndpoint),
	Batch(Vec<AgentEndpoint>),
}

impl EndpointPayload {
	#[must_use]
	pub fn endpoints(&self) -> &[AgentEndpoint] {
		match self {
			Self::Single(endpoint) => std::slice::from_ref(endpoint),
			Self::Batch(endpoints) => endpoints,
		}
	}

	/// The endpoint used to withdraw this registration; batches are withdrawn as a whole.
	#[must_use]
	pub fn primary(&self) -> Option<&AgentEndpoint> {
		self.endpoints().first()
	}

	#[must_use]
	pub fn version(&self) -> Option<&str> {
		self.primary().map(|endpoint| endpoint.version.as_str())
	}

	pub(crate) fn validate(&self) -> Result<(), Error> {
		let endpoints = self.endpoints();

		let Some(first) = endpoints.first() else {
			return Err(Error::InvalidIntent(
				"batch registration needs at least one endpoint".to_string(),
			));
		};

		for endpoint in endpoints {
			endpoint.validate()?;

			if endpoint.version != first.version {
				return Err(Error::InvalidIntent(format!(
					"batch endpoints must share one version, found '{}' and '{}'",
					first.version, endpoint.version
				)));
			}
		}

		Ok(())
	}
}

pub(crate) fn same_elements<T: Eq + std::hash::Hash>(left: &[T], right: &[T]) -> bool {
	left.iter().collect::<HashSet<_>>() == right.iter().collect::<HashSet<_>>()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn interface(url: &str) -> AgentInterface {
		AgentInterface {
			url: url.to_string(),
			transport: DEFAULT_TRANSPORT.to_string(),
		}
	}

	fn detail(version: &str, url: &str, interfaces: Option<Vec<AgentInterface>>) -> AgentCardDetail {
		AgentCardDetail {
			card: AgentCard {
				name: "agent".to_string(),
				version: version.to_string(),
				protocol_version: "0.3.0".to_string(),
				url: url.to_string(),
				additional_interfaces: interfaces,
				..Default::default()
			},
			registration_type: None,
			latest_version: Some(true),
		}
	}

	#[test]
	fn first_sight_is_a_change() {
		assert!(detail("1.0", "http://a", None).connectivity_changed(None));
	}

	#[test]
	fn same_record_is_not_a_change() {
		let record = detail("1.0", "http://a", Some(vec![interface("http://a")]));
		assert!(!record.connectivity_changed(Some(&record.clone())));
	}

	#[test]
	fn version_change() {
		let old = detail("1.0", "http://a", None);
		assert!(detail("1.1", "http://a", None).connectivity_changed(Some(&old)));
	}

	#[test]
	fn url_only_matters_without_interfaces() {
		let old = detail("1.0", "http://a", None);
		assert!(detail("1.0", "http://b", None).connectivity_changed(Some(&old)));

		let old = detail("1.0", "http://a", Some(vec![interface("http://x")]));
		assert!(!detail("1.0", "http://b", Some(vec![interface("http://x")]))
			.connectivity_changed(Some(&old)));
	}

	#[test]
	fn asymmetric_interfaces_are_a_change() {
		let without = detail("1.0", "http://a", None);
		let with = detail("1.0", "http://a", Some(vec![]));

		assert!(with.connectivity_changed(Some(&without)));
		assert!(without.connectivity_changed(Some(&with)));
	}

	#[test]
	fn interfaces_compare_as_sets() {
		let old = detail(
			"1.0",
			"http://a",
			Some(vec![interface("http://x"), interface("http://y")]),
		);
		let reordered = detail(
			"1.0",
			"http://a",
			Some(vec![
				interface("http://y"),
				interface("http://x"),
				interface("http://y"),
			]),
		);
		let different = detail(
			"1.0",
			"http://a",
			Some(vec![interface("http://x"), interface("http://z")]),
		);

		assert!(!reordered.connectivity_changed(Some(&old)));
		assert!(different.connectivity_changed(Some(&old)));
	}

	#[test]
	fn batch_needs_one_consistent_version() {
		assert!(EndpointPayload::Batch(vec![]).validate().is_err());

		let mixed = EndpointPayload::Batch(vec![
			AgentEndpoint::new("10.0.0.1", 9000, "1.0"),
			AgentEndpoint::new("10.0.0.2", 9000, "1.1"),
		]);
		assert!(matches!(mixed.validate(), Err(Error::InvalidIntent(_))));

		let batch = EndpointPayload::Batch(vec![
			AgentEndpoint::new("10.0.0.1", 9000, "1.0"),
			AgentEndpoint::new("10.0.0.2", 9000, "1.0"),
		]);
		assert!(batch.validate().is_ok());
		assert_eq!(batch.version(), Some("1.0"));
	}

	#[test]
	fn endpoint_validation() {
		assert!(AgentEndpoint::new("", 9000, "1.0").validate().is_err());
		assert!(AgentEndpoint::new("10.0.0.1", 0, "1.0").validate().is_err());
		assert!(AgentEndpoint::new("10.0.0.1", 9000, " ").validate().is_err());
		assert!(AgentEndpoint::new("10.0.0.1", 9000, "1.0").validate().is_ok());
	}

	#[test]
	fn endpoint_defaults_on_deserialize() {
		let endpoint: AgentEndpoint =
			serde_json::from_str(r#"{"address":"10.0.0.1","port":9000,"version":"1.0"}"#)
				.unwrap();

		assert_eq!(endpoint.transport, DEFAULT_TRANSPORT);
		assert_eq!(endpoint.path, "");
		assert!(!endpoint.support_tls);
	}
}
