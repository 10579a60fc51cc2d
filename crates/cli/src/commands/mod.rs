mod parse;
mod run;
mod targets;

use serde::Serialize;
use tracing::error;

use crate::cli::{Cli, Commands};
use crate::config::BotConfig;
use crate::error::Result;
use crate::output::{ResultBuilder, print_result};

pub use run::RunSummary;

/// Runs the command, prints its envelope and reports success.
pub async fn dispatch(cli: Cli) -> bool {
	match cli.command {
		Commands::Parse { url } => emit("parse", Ok(parse::execute(&url))),
		Commands::Targets { desktop } => {
			let result = BotConfig::load(cli.config.as_deref()).map(|config| targets::execute(&config, desktop.as_deref()));
			emit("targets", result)
		}
		Commands::Run(args) => {
			let result = match BotConfig::load(cli.config.as_deref()) {
				Ok(config) => run::execute(args, config).await,
				Err(err) => Err(err),
			};
			emit("run", result)
		}
	}
}

fn emit<T: Serialize>(command: &str, result: Result<T>) -> bool {
	let builder = ResultBuilder::new(command);
	let (builder, ok) = match result {
		Ok(data) => (builder.data(data), true),
		Err(err) => {
			error!(target = "meetbot", command, error = %err, "command failed");
			(builder.error(&err), false)
		}
	};
	print_result(&builder.build());
	ok
}
