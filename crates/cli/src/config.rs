//! On-disk configuration, merged with command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use meetbot::pool::DEFAULT_WORKERS;
use meetbot::{DiagnosticsConfig, JoinPolicy, MaintenanceConfig, Participant};
use meetbot_protocol::TargetCatalog;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};

pub const DEFAULT_CDP_ENDPOINT: &str = "http://127.0.0.1:9222";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingConfig {
	pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
	pub participant: Participant,
	pub diagnostics: DiagnosticsConfig,
	pub join: JoinPolicy,
	pub maintenance: MaintenanceConfig,
	pub messaging: MessagingConfig,
	pub workers: usize,
	pub cdp_endpoint: String,
	pub app_pid: Option<u32>,
	/// Replaces the built-in browser catalog.
	pub targets: Option<TargetCatalog>,
}

impl Default for BotConfig {
	fn default() -> Self {
		Self {
			participant: Participant::default(),
			diagnostics: DiagnosticsConfig::default(),
			join: JoinPolicy::default(),
			maintenance: MaintenanceConfig::default(),
			messaging: MessagingConfig::default(),
			workers: DEFAULT_WORKERS,
			cdp_endpoint: DEFAULT_CDP_ENDPOINT.to_string(),
			app_pid: None,
			targets: None,
		}
	}
}

/// `<config dir>/meetbot/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("meetbot").join("config.json"))
}

impl BotConfig {
	/// Loads `explicit` (which must exist), or the default location if present.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		match explicit {
			Some(path) => Self::read(path),
			None => match default_config_path() {
				Some(path) if path.is_file() => Self::read(&path),
				_ => Ok(Self::default()),
			},
		}
	}

	fn read(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|e| CliError::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		let config = serde_json::from_str(&content).map_err(|e| CliError::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		debug!(target = "meetbot.session", path = %path.display(), "loaded configuration");
		Ok(config)
	}

	/// Applies `run` flags on top of file values.
	pub fn apply(&mut self, args: &RunArgs) {
		if let Some(endpoint) = &args.cdp_endpoint {
			self.cdp_endpoint = endpoint.clone();
		}
		if let Some(name) = &args.name {
			self.participant.display_name = name.clone();
		}
		if let Some(email) = &args.email {
			self.participant.email = Some(email.clone());
		}
		if let Some(welcome) = &args.welcome {
			self.messaging.welcome_message = Some(welcome.clone());
		}
		if let Some(pid) = args.app_pid {
			self.app_pid = Some(pid);
		}
		if args.no_normalize_view {
			self.maintenance.normalize_view = false;
		}
		if args.keep_toolbars_visible {
			self.maintenance.keep_toolbars_visible = true;
		}
		if let Some(tick_ms) = args.tick_ms {
			self.maintenance.tick_interval_ms = tick_ms;
		}
	}

	pub fn catalog(&self) -> TargetCatalog {
		self.targets.clone().unwrap_or_else(TargetCatalog::web)
	}
}
