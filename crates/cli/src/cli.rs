//! Command-line surface for inspecting and editing the durable policy
//! state: settings, privacy toggles, site permissions, and profiles.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "veil", version, about = "veil browsing-shell policy core")]
pub struct Cli {
	/// Increase log verbosity (-v info, -vv debug).
	#[arg(short, long, action = ArgAction::Count, global = true)]
	pub verbose: u8,

	/// Override the data directory holding browser-state.json.
	#[arg(long, global = true)]
	pub data_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Read or update global settings.
	Settings {
		#[command(subcommand)]
		action: SettingsAction,
	},
	/// Read or update the privacy toggles.
	Privacy {
		#[command(subcommand)]
		action: PrivacyAction,
	},
	/// Read or set per-origin permission decisions.
	Permissions {
		#[command(subcommand)]
		action: PermissionsAction,
	},
	/// Manage profile names.
	Profiles {
		#[command(subcommand)]
		action: ProfilesAction,
	},
	/// Fetch search-term suggestions for a query.
	Suggest { query: String },
	/// Inspect the persisted state document.
	State {
		#[command(subcommand)]
		action: StateAction,
	},
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
	Get,
	Set {
		#[arg(long)]
		startup_page: Option<String>,
		#[arg(long)]
		zoom: Option<f64>,
		#[arg(long)]
		restore_session: Option<bool>,
		#[arg(long)]
		current_profile: Option<String>,
	},
}

#[derive(Debug, Subcommand)]
pub enum PrivacyAction {
	Get,
	Set {
		#[arg(long)]
		block_popups: Option<bool>,
		#[arg(long)]
		clear_data_on_exit: Option<bool>,
		#[arg(long)]
		block_third_party_cookies: Option<bool>,
		#[arg(long)]
		block_trackers: Option<bool>,
	},
}

#[derive(Debug, Subcommand)]
pub enum PermissionsAction {
	/// Show the stored decision for an (origin, capability) pair.
	Get { origin: String, capability: String },
	/// Store a decision (allow | block | ask) for an (origin, capability) pair.
	Set {
		origin: String,
		capability: String,
		decision: String,
	},
	/// List all decisions stored for one origin.
	List { origin: String },
}

#[derive(Debug, Subcommand)]
pub enum ProfilesAction {
	List,
	Add { name: String },
}

#[derive(Debug, Subcommand)]
pub enum StateAction {
	/// Print the state file path.
	Path,
	/// Dump the full state document.
	Show,
}
