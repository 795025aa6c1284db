//! The composition root: one [`Engine`] owns the state store, partition
//! manager, download tracker, and window registry, and exposes the command
//! surface the presentation layer talks to. Constructed once at process
//! start and passed by reference; there is no ambient global state.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diag::FaultLog;
use crate::downloads::{DownloadId, DownloadRecord, DownloadTracker};
use crate::host::Host;
use crate::partition::{PartitionHooks, PartitionKey, PartitionManager, sanitize_profile_name};
use crate::permissions::{Capability, Decision, PermissionEngine, normalize_origin};
use crate::session::{SessionRegistry, WindowId, WindowSession};
use crate::state::{DEFAULT_PROFILE, START_URL, Settings, StateStore, clamp_zoom};
use crate::suggest::Suggester;

const STATE_FILE: &str = "browser-state.json";
const FAULT_LOG_FILE: &str = "crash.log";

/// Effective configuration handed to a window at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
	pub start_url: String,
	pub partition: PartitionKey,
	pub is_private: bool,
	pub profile: String,
	pub settings: Settings,
}

/// Partial settings update; absent fields keep their current values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
	pub startup_page: Option<String>,
	pub default_zoom: Option<f64>,
	pub restore_session: Option<bool>,
	pub block_popups: Option<bool>,
	pub clear_data_on_exit: Option<bool>,
	pub block_third_party_cookies: Option<bool>,
	pub block_trackers: Option<bool>,
	pub current_profile: Option<String>,
	pub profiles: Option<Vec<String>>,
}

/// The four privacy toggles, as read and written by the settings panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyToggles {
	pub block_popups: bool,
	pub clear_data_on_exit: bool,
	pub block_third_party_cookies: bool,
	pub block_trackers: bool,
}

/// Partial privacy update.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyPatch {
	pub block_popups: Option<bool>,
	pub clear_data_on_exit: Option<bool>,
	pub block_third_party_cookies: Option<bool>,
	pub block_trackers: Option<bool>,
}

pub struct Engine {
	store: Arc<StateStore>,
	permissions: PermissionEngine,
	partitions: PartitionManager,
	downloads: Arc<DownloadTracker>,
	windows: SessionRegistry,
	suggester: Suggester,
	faults: FaultLog,
	host: Arc<dyn Host>,
	clear_triggered: AtomicBool,
}

impl Engine {
	/// Builds the engine over `data_dir`, loading (and migrating) any
	/// persisted state found there.
	pub fn new(data_dir: impl AsRef<Path>, host: Arc<dyn Host>) -> Self {
		let data_dir = data_dir.as_ref();
		let store = Arc::new(StateStore::open(data_dir.join(STATE_FILE)));
		let permissions = PermissionEngine::new(Arc::clone(&store));
		let downloads = Arc::new(DownloadTracker::new());
		let partitions = PartitionManager::new(
			Arc::clone(&store),
			permissions.clone(),
			Arc::clone(&downloads),
		);
		info!(target = "veil", data_dir = %data_dir.display(), "engine ready");
		Self {
			store,
			permissions,
			partitions,
			downloads,
			windows: SessionRegistry::new(),
			suggester: Suggester::new(),
			faults: FaultLog::new(data_dir.join(FAULT_LOG_FILE)),
			host,
			clear_triggered: AtomicBool::new(false),
		}
	}

	// ── Windows ─────────────────────────────────────────────────────────

	/// Opens a window: resolves its partition, installs hooks once, records
	/// the binding, and returns the effective configuration to apply.
	pub fn open_window(&self, is_private: bool, profile: Option<&str>) -> (WindowId, WindowConfig) {
		let settings = self.store.settings();
		let requested = profile.unwrap_or(&settings.current_profile);
		let profile = match sanitize_profile_name(requested) {
			name if name.is_empty() => DEFAULT_PROFILE.to_string(),
			name => name,
		};

		let partition = self.partitions.identifier_for(is_private, &profile);
		self.partitions.ensure_configured(&partition, is_private);

		let id = self.windows.insert(WindowSession {
			is_private,
			profile: profile.clone(),
			partition: partition.clone(),
		});
		debug!(target = "veil", window = id, partition = %partition, is_private, "window opened");

		let config = WindowConfig {
			start_url: settings.startup_page.clone(),
			partition,
			is_private,
			profile,
			settings,
		};
		(id, config)
	}

	/// Convenience for the new-private-window command.
	pub fn open_private_window(&self) -> (WindowId, WindowConfig) {
		self.open_window(true, None)
	}

	/// Removes the window binding only. The partition stays configured;
	/// teardown is governed solely by the clear-on-exit policy.
	pub fn close_window(&self, id: WindowId) {
		if self.windows.remove(id).is_some() {
			debug!(target = "veil", window = id, "window closed");
		}
	}

	/// Effective configuration for an already-open window. Unknown windows
	/// fall back to the current profile's persistent partition.
	pub fn window_config(&self, id: WindowId) -> WindowConfig {
		let settings = self.store.settings();
		match self.windows.get(id) {
			Some(session) => WindowConfig {
				start_url: settings.startup_page.clone(),
				partition: session.partition,
				is_private: session.is_private,
				profile: session.profile,
				settings,
			},
			None => WindowConfig {
				start_url: settings.startup_page.clone(),
				partition: self
					.partitions
					.identifier_for(false, &settings.current_profile),
				is_private: false,
				profile: settings.current_profile.clone(),
				settings,
			},
		}
	}

	// ── Partitions ──────────────────────────────────────────────────────

	/// Allocates, marks private, and configures a fresh ephemeral partition.
	pub fn new_private_partition(&self) -> PartitionKey {
		let key = self.partitions.identifier_for(true, "");
		self.partitions.ensure_configured(&key, true);
		key
	}

	/// The hook bundle for a configured partition, for the network layer.
	pub fn partition_hooks(&self, key: &PartitionKey) -> Option<Arc<PartitionHooks>> {
		self.partitions.hooks(key)
	}

	// ── Settings & privacy ──────────────────────────────────────────────

	pub fn settings(&self) -> Settings {
		self.store.settings()
	}

	/// Snapshot of the whole persisted document: version, settings, and the
	/// site permission table.
	pub fn state_document(&self) -> crate::state::AppState {
		self.store.snapshot()
	}

	/// Applies a settings patch with coercion: zoom clamped, profile names
	/// sanitized, profile list kept non-empty and containing the current
	/// profile. Returns the effective settings.
	pub fn update_settings(&self, patch: SettingsPatch) -> Settings {
		self.store.update(|state| {
			let settings = &mut state.settings;
			if let Some(page) = patch.startup_page {
				settings.startup_page = page;
			}
			if let Some(zoom) = patch.default_zoom {
				settings.default_zoom = clamp_zoom(zoom);
			}
			if let Some(v) = patch.restore_session {
				settings.restore_session = v;
			}
			if let Some(v) = patch.block_popups {
				settings.block_popups = v;
			}
			if let Some(v) = patch.clear_data_on_exit {
				settings.clear_data_on_exit = v;
			}
			if let Some(v) = patch.block_third_party_cookies {
				settings.block_third_party_cookies = v;
			}
			if let Some(v) = patch.block_trackers {
				settings.block_trackers = v;
			}
			if let Some(profile) = patch.current_profile {
				settings.current_profile = profile;
			}
			if let Some(profiles) = patch.profiles {
				settings.profiles = profiles
					.iter()
					.map(|p| sanitize_profile_name(p))
					.filter(|p| !p.is_empty())
					.collect();
			}
			settings.normalize();
			settings.clone()
		})
	}

	/// Adds a profile name. Idempotent: names that sanitize to an existing
	/// entry, or to nothing, leave the list unchanged.
	pub fn add_profile(&self, name: &str) -> Vec<String> {
		let normalized = sanitize_profile_name(name);
		self.store.update(|state| {
			if !normalized.is_empty() && !state.settings.profiles.contains(&normalized) {
				state.settings.profiles.push(normalized.clone());
			}
			state.settings.profiles.clone()
		})
	}

	pub fn privacy(&self) -> PrivacyToggles {
		let settings = self.store.settings();
		PrivacyToggles {
			block_popups: settings.block_popups,
			clear_data_on_exit: settings.clear_data_on_exit,
			block_third_party_cookies: settings.block_third_party_cookies,
			block_trackers: settings.block_trackers,
		}
	}

	pub fn update_privacy(&self, patch: PrivacyPatch) -> PrivacyToggles {
		self.update_settings(SettingsPatch {
			block_popups: patch.block_popups,
			clear_data_on_exit: patch.clear_data_on_exit,
			block_third_party_cookies: patch.block_third_party_cookies,
			block_trackers: patch.block_trackers,
			..Default::default()
		});
		self.privacy()
	}

	/// Popup admission for the window-open handler: true when popups are
	/// not blocked.
	pub fn allow_popup(&self) -> bool {
		!self.store.settings().block_popups
	}

	// ── Permissions ─────────────────────────────────────────────────────

	/// Stored decision for a (origin, capability) pair; Ask when unset or
	/// when the origin is malformed.
	pub fn permission(&self, origin_url: &str, capability_name: &str) -> Decision {
		let Some(origin) = normalize_origin(origin_url) else {
			return Decision::Ask;
		};
		self.permissions
			.get(&origin, &Capability::normalize(capability_name))
	}

	/// Sets a decision (invalid values coerce to Ask) and persists
	/// immediately. Malformed origins are a no-op.
	pub fn set_permission(&self, origin_url: &str, capability_name: &str, value: &str) {
		let Some(origin) = normalize_origin(origin_url) else {
			return;
		};
		self.permissions.set(
			&origin,
			&Capability::normalize(capability_name),
			Decision::coerce(value),
		);
	}

	/// All stored decisions for one origin.
	pub fn site_permissions(&self, origin_url: &str) -> std::collections::BTreeMap<String, Decision> {
		let Some(origin) = normalize_origin(origin_url) else {
			return Default::default();
		};
		self.store
			.snapshot()
			.site_permissions
			.get(&origin)
			.cloned()
			.unwrap_or_default()
	}

	// ── Suggestions ─────────────────────────────────────────────────────

	/// Search-term suggestions; empty on any failure, never an error.
	pub async fn suggest(&self, query: &str) -> Vec<String> {
		self.suggester.fetch(START_URL, query).await
	}

	// ── Downloads ───────────────────────────────────────────────────────

	pub fn downloads(&self) -> Vec<DownloadRecord> {
		self.downloads.list()
	}

	pub fn download_tracker(&self) -> &Arc<DownloadTracker> {
		&self.downloads
	}

	/// Reveals a finished download in the file manager. Unknown ids and
	/// records without a save path report `false` without error.
	pub fn open_download(&self, id: DownloadId) -> bool {
		match self.downloads.record(id) {
			Some(record) if !record.save_path.is_empty() => {
				self.host.reveal_in_folder(Path::new(&record.save_path))
			}
			_ => false,
		}
	}

	// ── Process lifecycle ───────────────────────────────────────────────

	pub fn fault_log(&self) -> &FaultLog {
		&self.faults
	}

	/// Relaunch is pure delegation; no engine state changes.
	pub fn relaunch(&self) {
		self.host.relaunch();
	}

	/// Clear-on-exit: with the policy enabled and not yet triggered,
	/// concurrently clears storage for every configured non-private
	/// partition and returns once all clears have settled. Individual
	/// failures are logged and swallowed; shutdown always completes.
	pub async fn shutdown(&self) {
		if !self.store.settings().clear_data_on_exit {
			return;
		}
		if self.clear_triggered.swap(true, Ordering::SeqCst) {
			return;
		}

		let targets = self.partitions.configured_persistent();
		info!(target = "veil", partitions = targets.len(), "clearing partition storage on exit");

		let clears = targets.iter().map(|key| {
			let host = Arc::clone(&self.host);
			async move {
				if let Err(e) = host.clear_partition_storage(key).await {
					warn!(target = "veil", partition = %key, error = %e, "storage clear failed");
				}
			}
		});
		join_all(clears).await;
	}
}
