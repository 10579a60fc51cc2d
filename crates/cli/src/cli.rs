use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "meetbot")]
#[command(about = "Join a web video meeting as an automated participant and keep it there")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (defaults to <config dir>/meetbot/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Attach to a running browser, join the meeting and keep the session alive
	Run(RunArgs),

	/// Print the meeting reference parsed from an invitation URL
	Parse { url: String },

	/// Print the target catalog the engine would use
	Targets {
		/// Use the native-client catalog with reference images from DIR
		#[arg(long, value_name = "DIR")]
		desktop: Option<PathBuf>,
	},
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
	/// Meeting invitation URL
	pub url: String,

	/// Remote debugging endpoint (http://host:port or a page ws:// URL)
	#[arg(long, value_name = "URL")]
	pub cdp_endpoint: Option<String>,

	/// Display name shown to other participants
	#[arg(long)]
	pub name: Option<String>,

	/// Account email; determines the session id
	#[arg(long)]
	pub email: Option<String>,

	/// Leave after this many seconds
	#[arg(long, value_name = "SECS")]
	pub duration: Option<u64>,

	/// Chat message posted once after joining
	#[arg(long, value_name = "TEXT")]
	pub welcome: Option<String>,

	/// PID of the browser or app process; its exit ends the session
	#[arg(long, value_name = "PID")]
	pub app_pid: Option<u32>,

	/// Leave the meeting layout as the client chose it
	#[arg(long)]
	pub no_normalize_view: bool,

	/// Sweep the pointer every tick so toolbars stay visible
	#[arg(long)]
	pub keep_toolbars_visible: bool,

	/// Maintenance tick interval in milliseconds
	#[arg(long, value_name = "MS")]
	pub tick_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn run_flags_parse() {
		let cli = Cli::try_parse_from([
			"meetbot",
			"-vv",
			"run",
			"https://us02web.zoom.us/j/123?pwd=abc",
			"--name",
			"Recorder",
			"--duration",
			"180",
			"--no-normalize-view",
			"--tick-ms",
			"1000",
		])
		.unwrap();
		assert_eq!(cli.verbose, 2);
		let Commands::Run(args) = cli.command else {
			panic!("expected run");
		};
		assert_eq!(args.name.as_deref(), Some("Recorder"));
		assert_eq!(args.duration, Some(180));
		assert!(args.no_normalize_view);
		assert!(!args.keep_toolbars_visible);
		assert_eq!(args.tick_ms, Some(1000));
	}

	#[test]
	fn config_flag_is_global() {
		let cli = Cli::try_parse_from(["meetbot", "parse", "https://example.com/j/1", "--config", "/tmp/meetbot.json"]).unwrap();
		assert_eq!(cli.config, Some(PathBuf::from("/tmp/meetbot.json")));
	}
}
