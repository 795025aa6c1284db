//! veil-core: session-isolation and privacy-policy core of the veil
//! browsing shell.
//!
//! The crate allocates isolated browsing partitions (persistent per
//! profile, ephemeral for private windows), enforces network privacy
//! policy per partition (third-party cookie stripping, tracker blocking),
//! keeps a persistent per-origin permission table, tracks download
//! lifecycles, and persists versioned application state across restarts.
//!
//! Everything hangs off one explicitly-constructed [`Engine`]; the
//! presentation layer is external and consumes the engine through its
//! command surface and the [`host::Host`] capability boundary.

pub mod diag;
pub mod downloads;
pub mod engine;
pub mod error;
pub mod host;
pub mod partition;
pub mod permissions;
pub mod privacy;
pub mod session;
pub mod state;
pub mod suggest;

pub use downloads::{DownloadId, DownloadOutcome, DownloadRecord, DownloadState, DownloadTracker};
pub use engine::{Engine, PrivacyPatch, PrivacyToggles, SettingsPatch, WindowConfig};
pub use error::{CoreError, Result};
pub use host::{Host, NullHost};
pub use partition::{PartitionKey, PartitionManager, sanitize_profile_name};
pub use permissions::{Capability, Decision, PermissionEngine};
pub use privacy::{AdmitVerdict, Continuation, PrivacyInterceptor, RequestInfo};
pub use session::{WindowId, WindowSession};
pub use state::{AppState, SCHEMA_VERSION, Settings, StateStore};
