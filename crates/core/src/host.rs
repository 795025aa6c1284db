//! The narrow boundary to host capabilities this core consumes but does
//! not implement: storage clearing, file reveal, and process relaunch.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::partition::PartitionKey;

/// External capabilities supplied by the hosting shell.
#[async_trait]
pub trait Host: Send + Sync {
	/// Clears all stored browsing data for one partition.
	async fn clear_partition_storage(&self, partition: &PartitionKey) -> Result<()>;

	/// Reveals a downloaded file in the platform file manager. Returns
	/// `false` when the platform declined; never errors.
	fn reveal_in_folder(&self, path: &Path) -> bool;

	/// Re-executes the process. No state change on our side.
	fn relaunch(&self);
}

/// Host that accepts everything and does nothing. Used in tests and as a
/// placeholder until the shell wires in real capabilities.
#[derive(Debug, Default)]
pub struct NullHost;

#[async_trait]
impl Host for NullHost {
	async fn clear_partition_storage(&self, _partition: &PartitionKey) -> Result<()> {
		Ok(())
	}

	fn reveal_in_folder(&self, _path: &Path) -> bool {
		true
	}

	fn relaunch(&self) {}
}
