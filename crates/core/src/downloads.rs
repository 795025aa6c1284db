//! In-flight download lifecycle tracking and snapshot broadcasting.
//!
//! Each download is a small state machine: started downloads are
//! `Progressing`, update events toggle `Progressing`/`Paused`, and exactly
//! one terminal event (`Completed`/`Cancelled`/`Interrupted`) ends it;
//! later events are ignored. Every transition rebuilds the full snapshot
//! (newest first, capped at 100) and broadcasts it fire-and-forget to all
//! observing windows. Nothing here is persisted across restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Snapshot cap: only the 100 most recently started downloads are kept.
pub const MAX_TRACKED_DOWNLOADS: usize = 100;

pub type DownloadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
	Progressing,
	Paused,
	Completed,
	Cancelled,
	Interrupted,
}

impl DownloadState {
	/// Terminal states absorb: no transition leaves them.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Cancelled | Self::Interrupted)
	}
}

/// How a download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
	Completed,
	Cancelled,
	Interrupted,
}

impl From<DownloadOutcome> for DownloadState {
	fn from(outcome: DownloadOutcome) -> Self {
		match outcome {
			DownloadOutcome::Completed => Self::Completed,
			DownloadOutcome::Cancelled => Self::Cancelled,
			DownloadOutcome::Interrupted => Self::Interrupted,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
	pub id: DownloadId,
	pub filename: String,
	pub url: String,
	pub state: DownloadState,
	pub received_bytes: u64,
	pub total_bytes: u64,
	pub save_path: String,
	/// Unix epoch milliseconds.
	pub started_at: u64,
	pub is_private: bool,
}

/// A progress/pause event from the download engine.
#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
	pub paused: bool,
	pub received_bytes: u64,
	pub total_bytes: u64,
	/// The engine may learn the save path after the download starts.
	pub save_path: Option<String>,
}

/// Tracks every known download and broadcasts snapshots on change.
pub struct DownloadTracker {
	records: Mutex<HashMap<DownloadId, DownloadRecord>>,
	updates: broadcast::Sender<Vec<DownloadRecord>>,
	next_id: AtomicU64,
}

impl Default for DownloadTracker {
	fn default() -> Self {
		Self::new()
	}
}

impl DownloadTracker {
	pub fn new() -> Self {
		let (updates, _) = broadcast::channel(16);
		Self {
			records: Mutex::new(HashMap::new()),
			updates,
			next_id: AtomicU64::new(1),
		}
	}

	/// Subscribes a window to snapshot pushes. Delivery is fire-and-forget
	/// and unordered across windows; a lagging receiver just skips ahead.
	pub fn subscribe(&self) -> broadcast::Receiver<Vec<DownloadRecord>> {
		self.updates.subscribe()
	}

	/// Registers a newly started download and broadcasts.
	pub fn started(
		&self,
		filename: impl Into<String>,
		url: impl Into<String>,
		total_bytes: u64,
		save_path: impl Into<String>,
		is_private: bool,
	) -> DownloadId {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let record = DownloadRecord {
			id,
			filename: filename.into(),
			url: url.into(),
			state: DownloadState::Progressing,
			received_bytes: 0,
			total_bytes,
			save_path: save_path.into(),
			started_at: now_ms(),
			is_private,
		};
		debug!(target = "veil", id, filename = %record.filename, "download started");

		let mut records = self.records.lock();
		records.insert(id, record);
		prune(&mut records);
		let snapshot = build_snapshot(&records);
		drop(records);

		self.publish(snapshot);
		id
	}

	/// Applies a progress/pause event and broadcasts. Events for unknown
	/// or already-terminal downloads are ignored.
	pub fn updated(&self, id: DownloadId, progress: DownloadProgress) {
		let snapshot = {
			let mut records = self.records.lock();
			let Some(record) = records.get_mut(&id) else {
				return;
			};
			if record.state.is_terminal() {
				return;
			}
			record.state = if progress.paused {
				DownloadState::Paused
			} else {
				DownloadState::Progressing
			};
			record.received_bytes = progress.received_bytes;
			record.total_bytes = progress.total_bytes;
			if let Some(path) = progress.save_path {
				record.save_path = path;
			}
			build_snapshot(&records)
		};
		self.publish(snapshot);
	}

	/// Applies the terminal transition and broadcasts. The final byte counts
	/// and save path may only be known at completion, so the terminal event
	/// carries them too. A download that is already terminal stays in its
	/// first terminal state.
	pub fn done(
		&self,
		id: DownloadId,
		outcome: DownloadOutcome,
		received_bytes: u64,
		total_bytes: Option<u64>,
		save_path: Option<String>,
	) {
		let snapshot = {
			let mut records = self.records.lock();
			let Some(record) = records.get_mut(&id) else {
				return;
			};
			if record.state.is_terminal() {
				return;
			}
			record.state = outcome.into();
			record.received_bytes = received_bytes;
			if let Some(total) = total_bytes {
				record.total_bytes = total;
			}
			if let Some(path) = save_path {
				record.save_path = path;
			}
			debug!(target = "veil", id, state = ?record.state, "download finished");
			build_snapshot(&records)
		};
		self.publish(snapshot);
	}

	/// Returns the current snapshot: newest `started_at` first, capped at
	/// [`MAX_TRACKED_DOWNLOADS`].
	pub fn list(&self) -> Vec<DownloadRecord> {
		build_snapshot(&self.records.lock())
	}

	/// Looks up one record.
	pub fn record(&self, id: DownloadId) -> Option<DownloadRecord> {
		self.records.lock().get(&id).cloned()
	}

	fn publish(&self, snapshot: Vec<DownloadRecord>) {
		// No receivers is fine; broadcast is best-effort.
		let _ = self.updates.send(snapshot);
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

fn build_snapshot(records: &HashMap<DownloadId, DownloadRecord>) -> Vec<DownloadRecord> {
	let mut snapshot: Vec<DownloadRecord> = records.values().cloned().collect();
	snapshot.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
	snapshot.truncate(MAX_TRACKED_DOWNLOADS);
	snapshot
}

fn prune(records: &mut HashMap<DownloadId, DownloadRecord>) {
	if records.len() <= MAX_TRACKED_DOWNLOADS {
		return;
	}
	let keep: std::collections::HashSet<DownloadId> =
		build_snapshot(records).into_iter().map(|r| r.id).collect();
	records.retain(|id, _| keep.contains(id));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_state_machine_pause_resume_complete() {
		let tracker = DownloadTracker::new();
		let mut rx = tracker.subscribe();

		let id = tracker.started("report.pdf", "https://a.example/report.pdf", 1000, "", false);
		assert_eq!(rx.try_recv().unwrap()[0].state, DownloadState::Progressing);

		tracker.updated(id, DownloadProgress { paused: true, received_bytes: 100, total_bytes: 1000, save_path: None });
		assert_eq!(rx.try_recv().unwrap()[0].state, DownloadState::Paused);

		tracker.updated(id, DownloadProgress { paused: false, received_bytes: 500, total_bytes: 1000, save_path: Some("/tmp/report.pdf".into()) });
		let snapshot = rx.try_recv().unwrap();
		assert_eq!(snapshot[0].state, DownloadState::Progressing);
		assert_eq!(snapshot[0].save_path, "/tmp/report.pdf");

		tracker.done(id, DownloadOutcome::Completed, 1000, None, None);
		let snapshot = rx.try_recv().unwrap();
		assert_eq!(snapshot[0].state, DownloadState::Completed);
		assert_eq!(snapshot[0].received_bytes, 1000);
	}

	#[test]
	fn test_done_refreshes_save_path_and_totals() {
		let tracker = DownloadTracker::new();
		let id = tracker.started("late.bin", "https://a.example/late.bin", 0, "", false);

		// Save path and true size only learned at completion.
		tracker.done(
			id,
			DownloadOutcome::Completed,
			4096,
			Some(4096),
			Some("/tmp/late.bin".to_string()),
		);

		let record = tracker.record(id).unwrap();
		assert_eq!(record.state, DownloadState::Completed);
		assert_eq!(record.total_bytes, 4096);
		assert_eq!(record.save_path, "/tmp/late.bin");
	}

	#[test]
	fn test_terminal_states_absorb() {
		let tracker = DownloadTracker::new();
		let id = tracker.started("a.bin", "https://a.example/a.bin", 10, "/tmp/a.bin", false);

		tracker.done(id, DownloadOutcome::Cancelled, 3, None, None);
		tracker.updated(id, DownloadProgress { received_bytes: 9, total_bytes: 10, ..Default::default() });
		tracker.done(id, DownloadOutcome::Completed, 10, Some(10), Some("/tmp/b.bin".to_string()));

		let record = tracker.record(id).unwrap();
		assert_eq!(record.state, DownloadState::Cancelled);
		assert_eq!(record.received_bytes, 3);
		assert_eq!(record.save_path, "/tmp/a.bin");
	}

	#[test]
	fn test_unknown_id_is_ignored() {
		let tracker = DownloadTracker::new();
		let mut rx = tracker.subscribe();
		tracker.updated(999, DownloadProgress::default());
		tracker.done(999, DownloadOutcome::Completed, 0, None, None);
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn test_snapshot_newest_first_capped_at_100() {
		let tracker = DownloadTracker::new();
		for i in 0..110 {
			tracker.started(format!("f{i}"), "https://a.example/f", 0, "", false);
		}
		let snapshot = tracker.list();
		assert_eq!(snapshot.len(), MAX_TRACKED_DOWNLOADS);
		// Newest (highest id at equal timestamps) first.
		assert!(snapshot.windows(2).all(|w| {
			(w[0].started_at, w[0].id) >= (w[1].started_at, w[1].id)
		}));
		assert_eq!(snapshot[0].filename, "f109");
		// The oldest ten fell off the table entirely.
		assert!(tracker.record(1).is_none());
		assert!(tracker.record(11).is_some());
	}

	#[test]
	fn test_broadcast_on_every_transition() {
		let tracker = DownloadTracker::new();
		let mut rx = tracker.subscribe();

		let id = tracker.started("a", "https://a.example/a", 0, "", true);
		tracker.updated(id, DownloadProgress { paused: true, ..Default::default() });
		tracker.done(id, DownloadOutcome::Interrupted, 0, None, None);

		assert!(rx.try_recv().is_ok());
		assert!(rx.try_recv().is_ok());
		assert!(rx.try_recv().is_ok());
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn test_private_flag_carried() {
		let tracker = DownloadTracker::new();
		let id = tracker.started("p", "https://a.example/p", 0, "", true);
		assert!(tracker.record(id).unwrap().is_private);
	}
}
