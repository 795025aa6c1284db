//! Disk-backed ownership of the [`AppState`] document.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{AppState, SCHEMA_VERSION, migrate};

/// Owns the one process-wide [`AppState`] and its backing file.
///
/// All mutation flows through [`StateStore::update`], which persists the
/// full document after every change. Persistence failures never reach the
/// caller: a failed read resets to defaults, a failed write is logged and
/// the in-memory state stays authoritative until the next successful save.
pub struct StateStore {
	path: PathBuf,
	state: RwLock<AppState>,
}

impl StateStore {
	/// Opens the store at `path`, loading and migrating any existing
	/// document. Missing or unreadable documents yield defaults.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let state = load(&path);
		Self {
			path,
			state: RwLock::new(state),
		}
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns a snapshot of the current state.
	pub fn snapshot(&self) -> AppState {
		self.state.read().clone()
	}

	/// Returns a snapshot of the current settings.
	pub fn settings(&self) -> super::Settings {
		self.state.read().settings.clone()
	}

	/// Applies `mutate` to the state under the write lock, then persists
	/// the full document. The save runs while the lock is still held, so
	/// documents reach the disk in mutation order and the file never
	/// regresses behind the in-memory state.
	pub fn update<R>(&self, mutate: impl FnOnce(&mut AppState) -> R) -> R {
		let mut state = self.state.write();
		let result = mutate(&mut state);
		state.schema_version = state.schema_version.max(SCHEMA_VERSION);
		self.save(&state);
		result
	}

	/// Writes `state` as one atomic document (temp file + rename).
	/// Failure is logged and swallowed.
	fn save(&self, state: &AppState) {
		if let Err(e) = write_atomic(&self.path, state) {
			warn!(target = "veil", path = %self.path.display(), error = %e, "state save failed; in-memory state stays authoritative");
		}
	}
}

fn load(path: &Path) -> AppState {
	match fs::read_to_string(path) {
		Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
			Ok(value) => migrate(value),
			Err(e) => {
				warn!(target = "veil", path = %path.display(), error = %e, "state file unparsable; resetting to defaults");
				AppState::default()
			}
		},
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			debug!(target = "veil", path = %path.display(), "no state file; starting from defaults");
			AppState::default()
		}
		Err(e) => {
			warn!(target = "veil", path = %path.display(), error = %e, "state file unreadable; resetting to defaults");
			AppState::default()
		}
	}
}

fn write_atomic(path: &Path, state: &AppState) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let tmp = path.with_extension("json.tmp");
	let body = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;
	fs::write(&tmp, body)?;
	fs::rename(&tmp, path)
}
