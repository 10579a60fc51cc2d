//! `meetbot run`: attach, join, maintain until told to stop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use meetbot::{Delivery, DomLocator, ElementLocator, MaintenanceLoop, Messenger, Session, SessionOptions, StepRecord, join};
use meetbot_protocol::MeetingRef;
use meetbot_runtime::AppProcess;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::BotConfig;
use crate::error::Result;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
	pub session_id: String,
	pub meeting: MeetingRef,
	pub steps: Vec<StepRecord>,
	pub ticks: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub welcome: Option<Delivery>,
}

pub async fn execute(args: RunArgs, mut config: BotConfig) -> Result<RunSummary> {
	config.apply(&args);
	let meeting = MeetingRef::parse(&args.url);
	let catalog = Arc::new(config.catalog());

	info!(target = "meetbot", endpoint = %config.cdp_endpoint, "attaching to browser");
	let locator: Arc<dyn ElementLocator> = Arc::new(DomLocator::attach(&config.cdp_endpoint).await?);
	let session = Arc::new(Session::new(
		locator,
		SessionOptions {
			participant: config.participant.clone(),
			diagnostics: config.diagnostics.clone(),
			workers: config.workers,
			app: config.app_pid.map(AppProcess::new),
		},
	)?);

	let cancel = CancellationToken::new();
	spawn_stop_signals(&cancel, args.duration);

	let report = match join(&session, &catalog, &config.join, &meeting, &cancel).await {
		Ok(report) => report,
		Err(err) => {
			if let Err(close_err) = session.close().await {
				warn!(target = "meetbot", error = %close_err, "failed to close session");
			}
			return Err(err.into());
		}
	};

	let maintenance = {
		let maintenance = MaintenanceLoop::new(Arc::clone(&session), Arc::clone(&catalog), config.maintenance.clone());
		let cancel = cancel.clone();
		tokio::spawn(async move { maintenance.run(&cancel).await })
	};

	let welcome = match &config.messaging.welcome_message {
		Some(text) => {
			let messenger = Messenger::new(Arc::clone(&session), Arc::clone(&catalog));
			match messenger.send_welcome_message(text, &cancel).await {
				Ok(delivery) => Some(delivery),
				Err(err) if err.is_terminal() => None,
				Err(err) => {
					warn!(target = "meetbot.messaging", error = %err, "welcome message failed");
					None
				}
			}
		}
		None => None,
	};

	let ticks = maintenance.await.context("maintenance task failed")??;
	session.close().await?;

	Ok(RunSummary {
		session_id: session.id().to_string(),
		meeting,
		steps: report.steps,
		ticks,
		welcome,
	})
}

/// Cancels on Ctrl-C, and after `duration_secs` when given.
fn spawn_stop_signals(cancel: &CancellationToken, duration_secs: Option<u64>) {
	let on_signal = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!(target = "meetbot", "interrupt received; leaving");
			on_signal.cancel();
		}
	});

	if let Some(secs) = duration_secs {
		let on_deadline = cancel.clone();
		tokio::spawn(async move {
			tokio::select! {
				_ = on_deadline.cancelled() => {}
				_ = tokio::time::sleep(Duration::from_secs(secs)) => {
					info!(target = "meetbot", secs, "duration elapsed; leaving");
					on_deadline.cancel();
				}
			}
		});
	}
}
