//!
//! # Registry Client
//!
//! Client-side reliability layer for an agent and MCP server registry.
//!
//! The registry session can drop and come back at any time. Two mechanisms keep the local view
//! consistent with the server regardless:
//!
//! - Endpoint registrations are ephemeral on the server side, so every registration intent is
//!   first recorded in a [`redo`] log. A recurring reconciler replays whatever the server hasn't
//!   confirmed, once the session is back.
//! - Reads go through a [`cache`] per resource kind. Every subscribed key gets its own refresh
//!   task polling the server, and changes that affect how a resource is reached are fanned out
//!   to the key's listeners by a [`ChangeNotifier`].
//!
//! Everything is owned by an [`AiClient`], talking to the server through a [`Transport`].

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
mod error;
mod key;
pub mod model;
pub mod notifier;
pub mod redo;
pub mod remote;
mod service;

pub use config::ClientConfig;
pub use error::{ConfigError, Error, RemoteError, TransportError};
pub use key::ResourceKey;
pub use notifier::{ChangeNotifier, Listener, ListenerHandle};
pub use remote::{Capability, CapabilityStatus, RemoteClient, SessionEvent, Transport};
pub use service::AiClient;
