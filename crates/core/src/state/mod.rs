//! Versioned application state: [`AppState`], [`Settings`], and schema migration.

mod store;

pub use store::StateStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::partition::sanitize_profile_name;
use crate::permissions::Decision;

/// Schema version stamped into every persisted state document.
pub const SCHEMA_VERSION: u64 = 1;

/// Startup page and default suggestion host.
pub const START_URL: &str = "https://searxng.jessetech.nl";

/// Profile used when a requested profile name sanitizes to nothing.
pub const DEFAULT_PROFILE: &str = "personal";

/// Zoom factor bounds enforced on every settings update.
pub const ZOOM_MIN: f64 = 0.25;
pub const ZOOM_MAX: f64 = 3.0;

/// Per-origin permission table: origin → capability name → decision.
pub type SitePermissions = BTreeMap<String, BTreeMap<String, Decision>>;

/// The single persisted document: settings plus the site permission table.
///
/// Unknown fields written by a future schema survive a load/save round-trip
/// through the flattened passthrough map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
	#[serde(default)]
	pub schema_version: u64,
	#[serde(default)]
	pub settings: Settings,
	#[serde(default)]
	pub site_permissions: SitePermissions,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

impl Default for AppState {
	fn default() -> Self {
		Self {
			schema_version: SCHEMA_VERSION,
			settings: Settings::default(),
			site_permissions: SitePermissions::new(),
			extra: serde_json::Map::new(),
		}
	}
}

/// Global settings snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
	#[serde(default = "default_startup_page")]
	pub startup_page: String,
	#[serde(default = "default_zoom")]
	pub default_zoom: f64,
	#[serde(default = "default_true")]
	pub restore_session: bool,
	#[serde(default = "default_true")]
	pub block_popups: bool,
	#[serde(default)]
	pub clear_data_on_exit: bool,
	#[serde(default)]
	pub block_third_party_cookies: bool,
	#[serde(default)]
	pub block_trackers: bool,
	#[serde(default = "default_profile")]
	pub current_profile: String,
	#[serde(default = "default_profiles")]
	pub profiles: Vec<String>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

fn default_startup_page() -> String {
	START_URL.to_string()
}

fn default_zoom() -> f64 {
	1.0
}

fn default_true() -> bool {
	true
}

fn default_profile() -> String {
	DEFAULT_PROFILE.to_string()
}

fn default_profiles() -> Vec<String> {
	vec![DEFAULT_PROFILE.to_string(), "work".to_string()]
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			startup_page: default_startup_page(),
			default_zoom: default_zoom(),
			restore_session: true,
			block_popups: true,
			clear_data_on_exit: false,
			block_third_party_cookies: false,
			block_trackers: false,
			current_profile: default_profile(),
			profiles: default_profiles(),
			extra: serde_json::Map::new(),
		}
	}
}

impl Settings {
	/// Coerces every field back inside its invariants: zoom clamped to
	/// [[`ZOOM_MIN`], [`ZOOM_MAX`]], startup page non-empty, current profile
	/// sanitized (falling back to [`DEFAULT_PROFILE`]), and the profile list
	/// non-empty with the current profile as its first member when it was
	/// missing.
	pub fn normalize(&mut self) {
		self.default_zoom = clamp_zoom(self.default_zoom);
		if self.startup_page.trim().is_empty() {
			self.startup_page = default_startup_page();
		}
		let current = sanitize_profile_name(&self.current_profile);
		self.current_profile = if current.is_empty() {
			DEFAULT_PROFILE.to_string()
		} else {
			current
		};
		if self.profiles.is_empty() {
			self.profiles = default_profiles();
		}
		if !self.profiles.contains(&self.current_profile) {
			self.profiles.insert(0, self.current_profile.clone());
		}
	}
}

/// Clamps a requested zoom factor into bounds; non-finite input resets to 1.
pub fn clamp_zoom(zoom: f64) -> f64 {
	if !zoom.is_finite() {
		return default_zoom();
	}
	zoom.clamp(ZOOM_MIN, ZOOM_MAX)
}

/// Upgrades a raw persisted document to the current schema.
///
/// A document already at (or past) [`SCHEMA_VERSION`] deserializes as-is;
/// unknown fields land in the passthrough maps, nothing is dropped and
/// nothing is downgraded. Older or unversioned documents are rebuilt by
/// merging stored settings over defaults (stored values win, absent fields
/// fill from defaults via serde) and carrying `sitePermissions` through
/// unchanged, then stamping the current version.
pub fn migrate(raw: Value) -> AppState {
	let version = raw
		.get("schemaVersion")
		.and_then(Value::as_u64)
		.unwrap_or(0);

	let mut state = if version >= SCHEMA_VERSION {
		serde_json::from_value::<AppState>(raw).unwrap_or_default()
	} else {
		let settings = raw
			.get("settings")
			.cloned()
			.and_then(|v| serde_json::from_value::<Settings>(v).ok())
			.unwrap_or_default();
		let site_permissions = raw
			.get("sitePermissions")
			.cloned()
			.and_then(|v| serde_json::from_value::<SitePermissions>(v).ok())
			.unwrap_or_default();
		AppState {
			schema_version: SCHEMA_VERSION,
			settings,
			site_permissions,
			extra: serde_json::Map::new(),
		}
	};

	state.schema_version = state.schema_version.max(SCHEMA_VERSION);
	state.settings.normalize();
	state
}
