//! Isolated browsing contexts ("partitions") and their one-time hook setup.
//!
//! Persistent partitions are keyed deterministically by sanitized profile
//! name; private partitions get a fresh unique token that never maps back
//! to a profile. Configuring a partition installs its privacy interceptor,
//! permission gate, and download hook exactly once, however many windows
//! end up sharing it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::downloads::{DownloadId, DownloadTracker};
use crate::permissions::{Capability, PermissionEngine, normalize_origin};
use crate::privacy::{Continuation, PrivacyInterceptor};
use crate::state::{DEFAULT_PROFILE, StateStore};

const PERSISTENT_PREFIX: &str = "persist:profile-";
const PRIVATE_PREFIX: &str = "temp:private-";

/// Opaque partition identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
	pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for PartitionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Lowercases, strips characters outside `[a-z0-9-_]`, and truncates to 32.
/// Callers fall back to [`DEFAULT_PROFILE`] when the result is empty.
pub fn sanitize_profile_name(input: &str) -> String {
	input
		.trim()
		.to_lowercase()
		.chars()
		.filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
		.take(32)
		.collect()
}

/// The hook bundle installed on a configured partition: permission gate,
/// privacy interception, and download intake, all bound to the partition's
/// privacy flag.
pub struct PartitionHooks {
	key: PartitionKey,
	is_private: bool,
	privacy: PrivacyInterceptor,
	permissions: PermissionEngine,
	downloads: Arc<DownloadTracker>,
}

impl PartitionHooks {
	pub fn key(&self) -> &PartitionKey {
		&self.key
	}

	pub fn is_private(&self) -> bool {
		self.is_private
	}

	pub fn privacy(&self) -> &PrivacyInterceptor {
		&self.privacy
	}

	/// Synchronous capability check. Only an explicit Allow grants.
	pub fn check_permission(&self, requesting_url: &str, capability_name: &str) -> bool {
		let capability = Capability::normalize(capability_name);
		let Some(origin) = normalize_origin(requesting_url) else {
			return false;
		};
		self.permissions.is_granted(&origin, &capability)
	}

	/// Asynchronous capability request. Applies the same rule as the check
	/// path and always resolves its continuation.
	pub fn request_permission(
		&self,
		requesting_url: &str,
		capability_name: &str,
		done: Continuation<bool>,
	) {
		done.resolve(self.check_permission(requesting_url, capability_name));
	}

	/// Routes a download begun on this partition into the shared tracker,
	/// tagged with the partition's privacy flag.
	pub fn download_started(
		&self,
		filename: &str,
		url: &str,
		total_bytes: u64,
		save_path: &str,
	) -> DownloadId {
		self.downloads
			.started(filename, url, total_bytes, save_path, self.is_private)
	}
}

/// Allocates partition identifiers and guarantees install-once hook setup.
pub struct PartitionManager {
	store: Arc<StateStore>,
	permissions: PermissionEngine,
	downloads: Arc<DownloadTracker>,
	configured: Mutex<HashMap<PartitionKey, Arc<PartitionHooks>>>,
	private: Mutex<HashSet<PartitionKey>>,
	private_seq: AtomicU64,
}

impl PartitionManager {
	pub fn new(
		store: Arc<StateStore>,
		permissions: PermissionEngine,
		downloads: Arc<DownloadTracker>,
	) -> Self {
		Self {
			store,
			permissions,
			downloads,
			configured: Mutex::new(HashMap::new()),
			private: Mutex::new(HashSet::new()),
			private_seq: AtomicU64::new(1),
		}
	}

	/// Resolves the partition key for a window.
	///
	/// Non-private: a deterministic key derived from the sanitized profile
	/// name (empty sanitization falls back to [`DEFAULT_PROFILE`]).
	/// Private: a freshly generated key that is never reused and carries no
	/// trace of any profile.
	pub fn identifier_for(&self, is_private: bool, profile: &str) -> PartitionKey {
		if is_private {
			let ts = SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.unwrap_or_default()
				.as_millis();
			let seq = self.private_seq.fetch_add(1, Ordering::SeqCst);
			return PartitionKey(format!("{PRIVATE_PREFIX}{ts:x}-{seq:x}"));
		}
		let profile = match sanitize_profile_name(profile) {
			name if name.is_empty() => DEFAULT_PROFILE.to_string(),
			name => name,
		};
		PartitionKey(format!("{PERSISTENT_PREFIX}{profile}"))
	}

	/// Idempotent hook installation: the first call for a key builds and
	/// installs the hook bundle, every later call returns the same bundle.
	pub fn ensure_configured(&self, key: &PartitionKey, is_private: bool) -> Arc<PartitionHooks> {
		if is_private {
			self.private.lock().insert(key.clone());
		}

		let mut configured = self.configured.lock();
		if let Some(hooks) = configured.get(key) {
			return Arc::clone(hooks);
		}

		debug!(target = "veil", partition = %key, is_private, "configuring partition");
		let hooks = Arc::new(PartitionHooks {
			key: key.clone(),
			is_private,
			privacy: PrivacyInterceptor::new(Arc::clone(&self.store)),
			permissions: self.permissions.clone(),
			downloads: Arc::clone(&self.downloads),
		});
		configured.insert(key.clone(), Arc::clone(&hooks));
		hooks
	}

	/// Returns the installed hook bundle for a configured partition.
	pub fn hooks(&self, key: &PartitionKey) -> Option<Arc<PartitionHooks>> {
		self.configured.lock().get(key).map(Arc::clone)
	}

	pub fn is_private(&self, key: &PartitionKey) -> bool {
		self.private.lock().contains(key)
	}

	pub fn configured_count(&self) -> usize {
		self.configured.lock().len()
	}

	/// Configured partitions that are *not* private: the clear-on-exit set.
	pub fn configured_persistent(&self) -> Vec<PartitionKey> {
		let private = self.private.lock();
		self.configured
			.lock()
			.keys()
			.filter(|key| !private.contains(*key))
			.cloned()
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn manager() -> (TempDir, PartitionManager) {
		let tmp = TempDir::new().unwrap();
		let store = Arc::new(StateStore::open(tmp.path().join("state.json")));
		let permissions = PermissionEngine::new(Arc::clone(&store));
		let downloads = Arc::new(DownloadTracker::new());
		(tmp, PartitionManager::new(store, permissions, downloads))
	}

	#[test]
	fn test_sanitize_profile_name() {
		assert_eq!(sanitize_profile_name("My Work!!"), "mywork");
		assert_eq!(sanitize_profile_name("  Personal  "), "personal");
		assert_eq!(sanitize_profile_name("dev_2-main"), "dev_2-main");
		assert_eq!(sanitize_profile_name("!!!"), "");
		assert_eq!(sanitize_profile_name(""), "");
		assert_eq!(sanitize_profile_name(&"x".repeat(50)).len(), 32);
	}

	#[test]
	fn test_persistent_keys_are_deterministic() {
		let (_tmp, manager) = manager();
		let a = manager.identifier_for(false, "My Work!!");
		let b = manager.identifier_for(false, "mywork");
		assert_eq!(a, b);
		assert_eq!(a.as_str(), "persist:profile-mywork");
	}

	#[test]
	fn test_unsanitizable_profile_falls_back_to_default() {
		let (_tmp, manager) = manager();
		let key = manager.identifier_for(false, "!!!");
		assert_eq!(key.as_str(), "persist:profile-personal");
	}

	#[test]
	fn test_private_keys_are_unique_and_profile_free() {
		let (_tmp, manager) = manager();
		let a = manager.identifier_for(true, "work");
		let b = manager.identifier_for(true, "work");
		assert_ne!(a, b);
		assert!(a.as_str().starts_with("temp:private-"));
		assert!(!a.as_str().contains("work"));
	}

	#[test]
	fn test_configure_is_idempotent() {
		let (_tmp, manager) = manager();
		let key = manager.identifier_for(false, "work");

		let first = manager.ensure_configured(&key, false);
		let second = manager.ensure_configured(&key, false);
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(manager.configured_count(), 1);
	}

	#[test]
	fn test_private_set_is_disjoint() {
		let (_tmp, manager) = manager();
		let persistent = manager.identifier_for(false, "work");
		let private = manager.identifier_for(true, "");

		manager.ensure_configured(&persistent, false);
		manager.ensure_configured(&private, true);

		assert!(!manager.is_private(&persistent));
		assert!(manager.is_private(&private));
		assert_eq!(manager.configured_persistent(), vec![persistent]);
	}

	#[test]
	fn test_permission_gate_default_denies() {
		let (_tmp, manager) = manager();
		let key = manager.identifier_for(false, "work");
		let hooks = manager.ensure_configured(&key, false);

		assert!(!hooks.check_permission("https://a.example/page", "camera"));
		assert!(!hooks.check_permission("not a url", "camera"));
	}

	#[tokio::test]
	async fn test_permission_request_resolves() {
		let (_tmp, manager) = manager();
		let key = manager.identifier_for(false, "work");
		let hooks = manager.ensure_configured(&key, false);

		let (done, granted) = Continuation::channel();
		hooks.request_permission("https://a.example/page", "media", done);
		assert!(!granted.await.unwrap());
	}
}
