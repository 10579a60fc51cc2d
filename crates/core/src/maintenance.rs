//! Post-join maintenance: keeps the meeting UI in the state the bot needs.
//!
//! Every tick runs a fixed sequence of idempotent actions while holding the
//! screen lock. Actions are independent; one failing never skips the rest.

use std::sync::Arc;
use std::time::Duration;

use meetbot_protocol::{Target, TargetCatalog};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BotError, Result};
use crate::locator::{Activation, Lookup};
use crate::retry::sleep_or_cancel;
use crate::session::{Screen, ScreenFlag, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaintenanceConfig {
	/// Switch to the preferred gallery layout.
	pub normalize_view: bool,
	/// Pick the layout again every tick, even after it was applied once.
	pub reapply_view: bool,
	/// Click the middle of the surface around the view menu, dismissing
	/// popovers left open over the meeting.
	pub click_centre: bool,
	/// Sweep the pointer each tick so auto-hiding toolbars stay visible.
	pub keep_toolbars_visible: bool,
	pub tick_interval_ms: u64,
}

impl Default for MaintenanceConfig {
	fn default() -> Self {
		Self {
			normalize_view: true,
			reapply_view: false,
			click_centre: false,
			keep_toolbars_visible: false,
			tick_interval_ms: 30_000,
		}
	}
}

impl MaintenanceConfig {
	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_interval_ms)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickAction {
	DismissBanner,
	Fullscreen,
	ClickCentre,
	NormalizeView,
	DisableIncomingVideo,
	SweepPointer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
	Applied,
	/// One-time action already done earlier in the session.
	AlreadyApplied,
	NotFound,
	/// A menu was opened but its option never appeared; the menu was closed again.
	Reverted,
	/// Disabled by configuration or not supported by the catalog.
	Skipped,
	Failed(String),
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickRecord {
	pub tick: u64,
	pub actions: Vec<(TickAction, ActionOutcome)>,
}

impl TickRecord {
	pub fn outcome(&self, action: TickAction) -> Option<&ActionOutcome> {
		self.actions.iter().find(|(a, _)| *a == action).map(|(_, o)| o)
	}
}

pub struct MaintenanceLoop {
	session: Arc<Session>,
	catalog: Arc<TargetCatalog>,
	config: MaintenanceConfig,
}

impl MaintenanceLoop {
	pub fn new(session: Arc<Session>, catalog: Arc<TargetCatalog>, config: MaintenanceConfig) -> Self {
		Self { session, catalog, config }
	}

	/// Ticks until cancelled. Returns the number of completed ticks.
	///
	/// Ends early only when the surface is lost.
	pub async fn run(&self, cancel: &CancellationToken) -> Result<u64> {
		self.run_with(cancel, |_| {}).await
	}

	/// Like [`run`](Self::run), handing each finished tick to `on_tick`.
	pub async fn run_with(&self, cancel: &CancellationToken, mut on_tick: impl FnMut(&TickRecord)) -> Result<u64> {
		self.session.mark_ready();
		info!(
			target = "meetbot.maintenance",
			session = %self.session.id(),
			interval_ms = self.config.tick_interval_ms,
			normalize_view = self.config.normalize_view,
			reapply_view = self.config.reapply_view,
			click_centre = self.config.click_centre,
			keep_toolbars_visible = self.config.keep_toolbars_visible,
			"maintenance started"
		);

		let mut ticks = 0;
		loop {
			if cancel.is_cancelled() {
				break;
			}
			match self.tick(ticks + 1, cancel).await {
				Ok(record) => {
					ticks = record.tick;
					on_tick(&record);
				}
				Err(BotError::Cancelled) => break,
				Err(err) => {
					warn!(target = "meetbot.maintenance", error = %err, ticks, "maintenance stopped");
					return Err(err);
				}
			}
			if sleep_or_cancel(self.config.tick_interval(), cancel).await.is_err() {
				break;
			}
		}

		info!(target = "meetbot.maintenance", ticks, "maintenance cancelled");
		Ok(ticks)
	}

	/// Runs one tick under the screen lock.
	///
	/// Only cancellation and surface loss are returned as errors; everything
	/// else is recorded in the [`TickRecord`].
	pub async fn tick(&self, tick: u64, cancel: &CancellationToken) -> Result<TickRecord> {
		let mut screen = self.session.lock_screen().await;
		let mut record = TickRecord { tick, actions: Vec::with_capacity(7) };

		let outcome = absorb(TickAction::DismissBanner, self.dismiss_banner(&screen).await)?;
		record.actions.push((TickAction::DismissBanner, outcome));

		let outcome = absorb(TickAction::Fullscreen, self.fullscreen(&mut screen).await)?;
		record.actions.push((TickAction::Fullscreen, outcome));

		let outcome = absorb(TickAction::ClickCentre, self.click_centre(&screen).await)?;
		record.actions.push((TickAction::ClickCentre, outcome));

		let outcome = absorb(TickAction::NormalizeView, self.normalize_view(&mut screen, cancel).await)?;
		record.actions.push((TickAction::NormalizeView, outcome));

		let outcome = absorb(TickAction::ClickCentre, self.click_centre(&screen).await)?;
		record.actions.push((TickAction::ClickCentre, outcome));

		let outcome = absorb(TickAction::DisableIncomingVideo, self.disable_incoming_video(&mut screen, cancel).await)?;
		record.actions.push((TickAction::DisableIncomingVideo, outcome));

		let outcome = absorb(TickAction::SweepPointer, self.sweep_pointer(&screen).await)?;
		record.actions.push((TickAction::SweepPointer, outcome));

		debug!(target = "meetbot.maintenance", tick, actions = ?record.actions, "tick finished");
		Ok(record)
	}

	async fn dismiss_banner(&self, screen: &Screen<'_>) -> Result<ActionOutcome> {
		Ok(match screen.dismiss_first(&self.catalog.banners).await? {
			Some(banner) => {
				info!(target = "meetbot.maintenance", %banner, "dismissed banner");
				ActionOutcome::Applied
			}
			None => ActionOutcome::NotFound,
		})
	}

	async fn fullscreen(&self, screen: &mut Screen<'_>) -> Result<ActionOutcome> {
		if screen.is_set(ScreenFlag::Fullscreen) {
			return Ok(ActionOutcome::AlreadyApplied);
		}
		screen.enter_fullscreen().await?;
		screen.mark(ScreenFlag::Fullscreen);
		info!(target = "meetbot.maintenance", "entered fullscreen");
		Ok(ActionOutcome::Applied)
	}

	async fn normalize_view(&self, screen: &mut Screen<'_>, cancel: &CancellationToken) -> Result<ActionOutcome> {
		if !self.config.normalize_view {
			return Ok(ActionOutcome::Skipped);
		}
		if screen.is_set(ScreenFlag::ViewNormalized) && !self.config.reapply_view {
			return Ok(ActionOutcome::AlreadyApplied);
		}
		let outcome = open_menu_and_pick(screen, &self.catalog.view_menu, &self.catalog.view_options, cancel).await?;
		if outcome == ActionOutcome::Applied {
			screen.mark(ScreenFlag::ViewNormalized);
		}
		Ok(outcome)
	}

	async fn disable_incoming_video(&self, screen: &mut Screen<'_>, cancel: &CancellationToken) -> Result<ActionOutcome> {
		let (Some(menu), Some(option)) = (&self.catalog.more_controls, &self.catalog.stop_incoming_video) else {
			return Ok(ActionOutcome::Skipped);
		};
		if screen.is_set(ScreenFlag::IncomingVideoDisabled) {
			return Ok(ActionOutcome::AlreadyApplied);
		}
		let outcome = open_menu_and_pick(screen, menu, std::slice::from_ref(option), cancel).await?;
		if outcome == ActionOutcome::Applied {
			screen.mark(ScreenFlag::IncomingVideoDisabled);
			info!(target = "meetbot.maintenance", "incoming video disabled");
		}
		Ok(outcome)
	}

	async fn click_centre(&self, screen: &Screen<'_>) -> Result<ActionOutcome> {
		if !self.config.click_centre {
			return Ok(ActionOutcome::Skipped);
		}
		screen.click_centre().await?;
		Ok(ActionOutcome::Applied)
	}

	async fn sweep_pointer(&self, screen: &Screen<'_>) -> Result<ActionOutcome> {
		if !self.config.keep_toolbars_visible {
			return Ok(ActionOutcome::Skipped);
		}
		screen.sweep_pointer().await?;
		Ok(ActionOutcome::Applied)
	}
}

/// Opens `menu`, waits briefly for the first available option and activates it.
/// Closes the menu again when no option could be activated.
async fn open_menu_and_pick(screen: &Screen<'_>, menu: &Target, options: &[Target], cancel: &CancellationToken) -> Result<ActionOutcome> {
	let Lookup::Found(handle) = screen.find(menu).await? else {
		return Ok(ActionOutcome::NotFound);
	};
	if screen.activate(&handle).await? == Activation::Stale {
		return Ok(ActionOutcome::NotFound);
	}

	let picked = match screen.wait_for_any(options, cancel).await {
		Ok(option) => screen.activate(&option).await.map(|a| a == Activation::Activated),
		Err(err) => Err(err),
	};

	match picked {
		Ok(true) => Ok(ActionOutcome::Applied),
		Ok(false) => {
			close_menu(screen, menu).await;
			Ok(ActionOutcome::Reverted)
		}
		Err(err) if err.is_fatal() => Err(err),
		Err(err) => {
			close_menu(screen, menu).await;
			if matches!(err, BotError::Cancelled) {
				return Err(err);
			}
			debug!(target = "meetbot.maintenance", menu = %menu.name, error = %err, "menu option not available");
			Ok(ActionOutcome::Reverted)
		}
	}
}

async fn close_menu(screen: &Screen<'_>, menu: &Target) {
	if let Err(err) = screen.try_activate(menu).await {
		debug!(target = "meetbot.maintenance", menu = %menu.name, error = %err, "failed to close menu");
	}
}

fn absorb(action: TickAction, result: Result<ActionOutcome>) -> Result<ActionOutcome> {
	match result {
		Ok(outcome) => Ok(outcome),
		Err(err) if err.is_terminal() => Err(err),
		Err(err) => {
			debug!(target = "meetbot.maintenance", ?action, error = %err, "action failed");
			Ok(ActionOutcome::Failed(err.to_string()))
		}
	}
}
