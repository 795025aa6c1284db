//! Append-only fault log for unrecoverable runtime events.
//!
//! Each entry is one JSON line: `{"ts": <unix seconds>, "type": ..., ...}`.
//! Appending never fails the caller; a broken log file must not take the
//! process down with it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{Value, json};

pub struct FaultLog {
	path: PathBuf,
	file: Mutex<()>,
}

impl FaultLog {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			file: Mutex::new(()),
		}
	}

	/// Appends one fault entry with a timestamp, fault type, and context.
	/// Failures are swallowed to avoid recursive logging.
	pub fn append(&self, kind: &str, context: Value) {
		let ts = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_secs();
		let mut entry = json!({ "ts": ts, "type": kind });
		if let (Some(entry_map), Value::Object(context)) = (entry.as_object_mut(), context) {
			for (key, value) in context {
				entry_map.entry(key).or_insert(value);
			}
		}

		let _guard = self.file.lock();
		let result = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.and_then(|mut file| writeln!(file, "{entry}"));
		drop(result);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_appends_json_lines() {
		let tmp = TempDir::new().unwrap();
		let log = FaultLog::new(tmp.path().join("crash.log"));

		log.append("renderProcessGone", json!({ "reason": "crashed", "exitCode": 11 }));
		log.append("uncaught", json!({ "message": "boom" }));

		let raw = std::fs::read_to_string(tmp.path().join("crash.log")).unwrap();
		let lines: Vec<Value> = raw
			.lines()
			.map(|line| serde_json::from_str(line).unwrap())
			.collect();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0]["type"], "renderProcessGone");
		assert_eq!(lines[0]["reason"], "crashed");
		assert!(lines[0]["ts"].as_u64().is_some());
		assert_eq!(lines[1]["message"], "boom");
	}

	#[test]
	fn test_append_failure_is_swallowed() {
		let tmp = TempDir::new().unwrap();
		// A directory at the log path makes the open fail.
		let path = tmp.path().join("crash.log");
		std::fs::create_dir_all(&path).unwrap();

		let log = FaultLog::new(&path);
		log.append("uncaught", json!({}));
	}
}
