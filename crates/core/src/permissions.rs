//! Per-origin permission decisions: [`Decision`], [`Capability`], and the
//! engine that reads and writes the persisted table.
//!
//! This core has no prompt UI: [`Decision::Ask`] denies on both the
//! synchronous check path and the asynchronous request path. A prompt
//! layer, if one ever lands, composes on top of [`PermissionEngine::is_granted`]
//! without changing that default.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::state::StateStore;

/// A stored decision for one (origin, capability) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
	Allow,
	Block,
	#[default]
	Ask,
}

impl Decision {
	/// Coerces an externally-supplied decision string; anything outside the
	/// closed set becomes [`Decision::Ask`].
	pub fn coerce(value: &str) -> Self {
		match value {
			"allow" => Self::Allow,
			"block" => Self::Block,
			_ => Self::Ask,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Allow => "allow",
			Self::Block => "block",
			Self::Ask => "ask",
		}
	}
}

/// Canonical capability set. Engine-reported names outside the closed set
/// pass through as [`Capability::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
	Camera,
	Microphone,
	Geolocation,
	Notifications,
	Other(String),
}

impl Capability {
	/// Normalizes an engine-reported capability name onto the canonical set.
	/// The one non-identity mapping is the engine's generic `media` request,
	/// which is treated as a camera request.
	pub fn normalize(name: &str) -> Self {
		match name {
			"media" | "camera" => Self::Camera,
			"microphone" => Self::Microphone,
			"geolocation" => Self::Geolocation,
			"notifications" => Self::Notifications,
			other => Self::Other(other.to_string()),
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			Self::Camera => "camera",
			Self::Microphone => "microphone",
			Self::Geolocation => "geolocation",
			Self::Notifications => "notifications",
			Self::Other(name) => name,
		}
	}
}

/// Normalizes a URL string to its origin (scheme + host + non-default
/// port). Malformed or opaque-origin input yields `None`.
pub fn normalize_origin(input: &str) -> Option<String> {
	let url = Url::parse(input).ok()?;
	let origin = url.origin();
	if !origin.is_tuple() {
		return None;
	}
	Some(origin.ascii_serialization())
}

/// Reads and writes the persisted per-origin decision table.
#[derive(Clone)]
pub struct PermissionEngine {
	store: Arc<StateStore>,
}

impl PermissionEngine {
	pub fn new(store: Arc<StateStore>) -> Self {
		Self { store }
	}

	/// Returns the stored decision, defaulting to [`Decision::Ask`] when the
	/// pair has never been set.
	pub fn get(&self, origin: &str, capability: &Capability) -> Decision {
		self.store
			.snapshot()
			.site_permissions
			.get(origin)
			.and_then(|site| site.get(capability.as_str()))
			.copied()
			.unwrap_or_default()
	}

	/// Stores a decision and persists immediately. Empty origins are
	/// ignored; invalid decision strings were coerced to Ask upstream.
	pub fn set(&self, origin: &str, capability: &Capability, decision: Decision) {
		if origin.is_empty() {
			return;
		}
		debug!(target = "veil", origin, capability = capability.as_str(), decision = decision.as_str(), "permission set");
		self.store.update(|state| {
			state
				.site_permissions
				.entry(origin.to_string())
				.or_default()
				.insert(capability.as_str().to_string(), decision);
		});
	}

	/// The shared consumption contract for capability checks and requests:
	/// only an explicit Allow grants; Block and Ask both deny.
	pub fn is_granted(&self, origin: &str, capability: &Capability) -> bool {
		self.get(origin, capability) == Decision::Allow
	}
}
