use std::path::Path;

use meetbot_protocol::TargetCatalog;

use crate::config::BotConfig;

/// The catalog `run` would use, or the native-client one for `desktop`.
pub fn execute(config: &BotConfig, desktop: Option<&Path>) -> TargetCatalog {
	match desktop {
		Some(dir) => TargetCatalog::desktop(dir),
		None => config.catalog(),
	}
}
