//! Window-to-partition bindings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::partition::PartitionKey;

pub type WindowId = u64;

/// What the registry knows about one open window. The window does not own
/// its partition; closing the window only removes this binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSession {
	pub is_private: bool,
	pub profile: String,
	pub partition: PartitionKey,
}

/// Tracks open windows. Partition teardown is governed solely by the
/// clear-on-exit policy, never by window lifetime.
#[derive(Default)]
pub struct SessionRegistry {
	windows: Mutex<HashMap<WindowId, WindowSession>>,
	next_id: AtomicU64,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self {
			windows: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Records a new window binding and returns its id.
	pub fn insert(&self, session: WindowSession) -> WindowId {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		self.windows.lock().insert(id, session);
		id
	}

	pub fn get(&self, id: WindowId) -> Option<WindowSession> {
		self.windows.lock().get(&id).cloned()
	}

	/// Removes the binding only; the partition stays configured.
	pub fn remove(&self, id: WindowId) -> Option<WindowSession> {
		self.windows.lock().remove(&id)
	}

	pub fn len(&self) -> usize {
		self.windows.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.windows.lock().is_empty()
	}
}
