//! Command dispatch over an [`Engine`] built at the resolved data dir.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use veil::{Engine, NullHost, PrivacyPatch, SettingsPatch};

use crate::cli::{
	Cli, Command, PermissionsAction, PrivacyAction, ProfilesAction, SettingsAction, StateAction,
};

/// Resolves the data directory: explicit flag, then the platform data dir,
/// then the working directory.
fn data_dir(cli: &Cli) -> PathBuf {
	cli.data_dir.clone().unwrap_or_else(|| {
		dirs::data_local_dir()
			.map(|dir| dir.join("veil"))
			.unwrap_or_else(|| PathBuf::from("."))
	})
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let engine = Engine::new(data_dir(&cli), Arc::new(NullHost));

	match cli.command {
		Command::Settings { action } => match action {
			SettingsAction::Get => print_json(&engine.settings())?,
			SettingsAction::Set {
				startup_page,
				zoom,
				restore_session,
				current_profile,
			} => {
				let settings = engine.update_settings(SettingsPatch {
					startup_page,
					default_zoom: zoom,
					restore_session,
					current_profile,
					..Default::default()
				});
				print_json(&settings)?;
			}
		},
		Command::Privacy { action } => match action {
			PrivacyAction::Get => print_json(&engine.privacy())?,
			PrivacyAction::Set {
				block_popups,
				clear_data_on_exit,
				block_third_party_cookies,
				block_trackers,
			} => {
				let toggles = engine.update_privacy(PrivacyPatch {
					block_popups,
					clear_data_on_exit,
					block_third_party_cookies,
					block_trackers,
				});
				print_json(&toggles)?;
			}
		},
		Command::Permissions { action } => match action {
			PermissionsAction::Get { origin, capability } => {
				print_json(&engine.permission(&origin, &capability))?;
			}
			PermissionsAction::Set {
				origin,
				capability,
				decision,
			} => {
				engine.set_permission(&origin, &capability, &decision);
				print_json(&engine.site_permissions(&origin))?;
			}
			PermissionsAction::List { origin } => {
				print_json(&engine.site_permissions(&origin))?;
			}
		},
		Command::Profiles { action } => match action {
			ProfilesAction::List => print_json(&engine.settings().profiles)?,
			ProfilesAction::Add { name } => print_json(&engine.add_profile(&name))?,
		},
		Command::Suggest { query } => {
			print_json(&engine.suggest(&query).await)?;
		}
		Command::State { ref action } => match action {
			StateAction::Path => {
				println!("{}", data_dir(&cli).join("browser-state.json").display());
			}
			StateAction::Show => {
				// Read through the engine so migration has already run.
				print_json(&engine.state_document())?;
			}
		},
	}
	Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[test]
	fn test_data_dir_flag_overrides() {
		let cli = Cli::parse_from(["veil", "--data-dir", "/tmp/veil-test", "settings", "get"]);
		assert_eq!(data_dir(&cli), PathBuf::from("/tmp/veil-test"));
	}

	#[tokio::test]
	async fn test_state_show_covers_permission_table() {
		let tmp = tempfile::TempDir::new().unwrap();
		let dir = tmp.path().to_str().unwrap();

		let set = Cli::parse_from([
			"veil", "--data-dir", dir, "permissions", "set",
			"https://a.example", "camera", "allow",
		]);
		dispatch(set).await.unwrap();

		// The dumped document carries the permission table alongside settings.
		let engine = Engine::new(tmp.path(), Arc::new(NullHost));
		let doc = serde_json::to_value(engine.state_document()).unwrap();
		assert_eq!(
			doc["sitePermissions"]["https://a.example"]["camera"],
			serde_json::json!("allow")
		);
		assert!(doc["settings"].is_object());
	}

	#[tokio::test]
	async fn test_settings_round_trip_through_dispatch() {
		let tmp = tempfile::TempDir::new().unwrap();
		let dir = tmp.path().to_str().unwrap();

		let set = Cli::parse_from([
			"veil", "--data-dir", dir, "settings", "set", "--zoom", "9.0",
		]);
		dispatch(set).await.unwrap();

		// The clamped value landed in the persisted document.
		let raw = std::fs::read_to_string(tmp.path().join("browser-state.json")).unwrap();
		let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(doc["settings"]["defaultZoom"], serde_json::json!(3.0));
	}
}
