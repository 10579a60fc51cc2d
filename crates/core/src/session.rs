//! Session identity, the screen lock, and the ready gate.
//!
//! Every UI interaction goes through a [`Screen`], which can only be obtained
//! by locking the session. Join steps, maintenance ticks and message sends
//! therefore never interleave on the surface. The lock also guards the
//! one-time [`ScreenFlags`], so a flag can only change while its owner holds
//! the screen.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use meetbot_protocol::Target;
use meetbot_runtime::AppProcess;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics::{Capture, Diagnostics, DiagnosticsConfig};
use crate::error::{BotError, Result};
use crate::locator::{Activation, ElementHandle, ElementLocator, Lookup};
use crate::pool::{DEFAULT_WORKERS, WorkerPool};
use crate::retry::{RetryPolicy, poll_until};

/// Who the bot appears as in the meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Participant {
	pub display_name: String,
	/// Account identity; used to derive the session id when present.
	pub email: Option<String>,
}

impl Default for Participant {
	fn default() -> Self {
		Self {
			display_name: "Meeting Bot".to_string(),
			email: None,
		}
	}
}

impl Participant {
	/// Stable, path-safe session id: URL-safe base64 of the email, or of the display name.
	pub fn session_id(&self) -> String {
		let identity = self.email.as_deref().filter(|e| !e.is_empty()).unwrap_or(&self.display_name);
		URL_SAFE.encode(identity)
	}
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
	pub participant: Participant,
	pub diagnostics: DiagnosticsConfig,
	pub workers: usize,
	/// Process behind the surface, when a supervisor reported it.
	pub app: Option<AppProcess>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			participant: Participant::default(),
			diagnostics: DiagnosticsConfig::default(),
			workers: DEFAULT_WORKERS,
			app: None,
		}
	}
}

/// UI adjustments that must be applied at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenFlag {
	ViewNormalized,
	Fullscreen,
	IncomingVideoDisabled,
	MicrophoneMuted,
}

/// One-way flags: once set they stay set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenFlags {
	view_normalized: bool,
	fullscreen: bool,
	incoming_video_disabled: bool,
	microphone_muted: bool,
}

impl ScreenFlags {
	pub fn is_set(&self, flag: ScreenFlag) -> bool {
		match flag {
			ScreenFlag::ViewNormalized => self.view_normalized,
			ScreenFlag::Fullscreen => self.fullscreen,
			ScreenFlag::IncomingVideoDisabled => self.incoming_video_disabled,
			ScreenFlag::MicrophoneMuted => self.microphone_muted,
		}
	}

	fn set(&mut self, flag: ScreenFlag) {
		match flag {
			ScreenFlag::ViewNormalized => self.view_normalized = true,
			ScreenFlag::Fullscreen => self.fullscreen = true,
			ScreenFlag::IncomingVideoDisabled => self.incoming_video_disabled = true,
			ScreenFlag::MicrophoneMuted => self.microphone_muted = true,
		}
	}
}

/// One bot's presence in one meeting.
pub struct Session {
	id: String,
	participant: Participant,
	diagnostics: Diagnostics,
	locator: Arc<dyn ElementLocator>,
	pool: WorkerPool,
	screen: Mutex<ScreenFlags>,
	ready: watch::Sender<bool>,
	app: Option<AppProcess>,
	lost: AtomicBool,
}

impl Session {
	pub fn new(locator: Arc<dyn ElementLocator>, options: SessionOptions) -> Result<Self> {
		let id = options.participant.session_id();
		let diagnostics = Diagnostics::create(&options.diagnostics, &id)?;
		let (ready, _) = watch::channel(false);

		info!(
			target = "meetbot.session",
			session = %id,
			backend = locator.backend(),
			workers = options.workers,
			diagnostics = %diagnostics.dir().display(),
			"session created"
		);

		Ok(Self {
			id,
			participant: options.participant,
			diagnostics,
			locator,
			pool: WorkerPool::new(options.workers),
			screen: Mutex::new(ScreenFlags::default()),
			ready,
			app: options.app,
			lost: AtomicBool::new(false),
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn display_name(&self) -> &str {
		&self.participant.display_name
	}

	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diagnostics
	}

	/// Waits for exclusive use of the surface.
	pub async fn lock_screen(&self) -> Screen<'_> {
		Screen {
			session: self,
			flags: self.screen.lock().await,
		}
	}

	/// Current one-time flags. Waits for the screen lock.
	pub async fn flags(&self) -> ScreenFlags {
		*self.screen.lock().await
	}

	/// Opens the ready gate. Idempotent.
	pub fn mark_ready(&self) {
		self.ready.send_if_modified(|ready| {
			if *ready {
				false
			} else {
				info!(target = "meetbot.session", session = %self.id, "session ready");
				*ready = true;
				true
			}
		});
	}

	pub fn is_ready(&self) -> bool {
		*self.ready.borrow()
	}

	/// Resolves once the session is ready, or fails with [`BotError::Cancelled`].
	pub async fn wait_ready(&self, cancel: &CancellationToken) -> Result<()> {
		let mut rx = self.ready.subscribe();
		let opened = async move { rx.wait_for(|ready| *ready).await.is_ok() };
		tokio::select! {
			_ = cancel.cancelled() => Err(BotError::Cancelled),
			true = opened => Ok(()),
			else => Err(BotError::Cancelled),
		}
	}

	/// Whether the surface has been observed gone.
	pub fn is_lost(&self) -> bool {
		self.lost.load(Ordering::SeqCst)
	}

	fn ensure_alive(&self) -> Result<()> {
		if self.is_lost() {
			return Err(BotError::SurfaceLost("surface already lost".into()));
		}
		if let Some(app) = &self.app {
			if !app.is_alive() {
				return Err(self.surface_lost(format!("application process {} exited", app.pid())));
			}
		}
		Ok(())
	}

	fn surface_lost(&self, reason: String) -> BotError {
		if !self.lost.swap(true, Ordering::SeqCst) {
			warn!(target = "meetbot.session", session = %self.id, %reason, "UI surface lost");
		}
		BotError::SurfaceLost(reason)
	}

	/// Releases the surface. Waits for any in-progress interaction first.
	pub async fn close(&self) -> Result<()> {
		let screen = self.lock_screen().await;
		let result = screen.dispatch(|locator| async move { locator.close().await }).await;
		info!(target = "meetbot.session", session = %self.id, "session closed");
		match result {
			Err(BotError::SurfaceLost(_)) => Ok(()),
			other => other,
		}
	}
}

/// Exclusive access to the surface; held for the duration of one logical action.
pub struct Screen<'a> {
	session: &'a Session,
	flags: MutexGuard<'a, ScreenFlags>,
}

impl Screen<'_> {
	pub fn session(&self) -> &Session {
		self.session
	}

	pub fn is_set(&self, flag: ScreenFlag) -> bool {
		self.flags.is_set(flag)
	}

	/// Records a one-time adjustment as done.
	pub fn mark(&mut self, flag: ScreenFlag) {
		if !self.flags.is_set(flag) {
			debug!(target = "meetbot.session", session = %self.session.id, ?flag, "flag set");
			self.flags.set(flag);
		}
	}

	async fn dispatch<T, F, Fut>(&self, op: F) -> Result<T>
	where
		F: FnOnce(Arc<dyn ElementLocator>) -> Fut,
		Fut: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		self.session.ensure_alive()?;
		let locator = Arc::clone(&self.session.locator);
		match self.session.pool.run(op(locator)).await {
			Err(BotError::SurfaceLost(reason)) => Err(self.session.surface_lost(reason)),
			Err(err) if !err.is_soft() && !matches!(err, BotError::Cancelled) => {
				self.session.ensure_alive()?;
				Err(err)
			}
			other => other,
		}
	}

	pub async fn open(&self, url: &str) -> Result<()> {
		let url = url.to_string();
		self.dispatch(move |locator| async move { locator.open(&url).await }).await
	}

	/// Single lookup.
	pub async fn find(&self, target: &Target) -> Result<Lookup> {
		let target = target.clone();
		self.dispatch(move |locator| async move { locator.find(&target).await }).await
	}

	pub async fn activate(&self, handle: &ElementHandle) -> Result<Activation> {
		let handle = handle.clone();
		self.dispatch(move |locator| async move { locator.activate(&handle).await }).await
	}

	pub async fn type_text(&self, handle: &ElementHandle, text: &str) -> Result<()> {
		let handle = handle.clone();
		let text = text.to_string();
		self.dispatch(move |locator| async move { locator.type_text(&handle, &text).await }).await
	}

	pub async fn press_key(&self, key: &str) -> Result<()> {
		let key = key.to_string();
		self.dispatch(move |locator| async move { locator.press_key(&key).await }).await
	}

	pub async fn enter_fullscreen(&self) -> Result<()> {
		self.dispatch(|locator| async move { locator.enter_fullscreen().await }).await
	}

	pub async fn sweep_pointer(&self) -> Result<()> {
		self.dispatch(|locator| async move { locator.sweep_pointer().await }).await
	}

	pub async fn click_centre(&self) -> Result<()> {
		self.dispatch(|locator| async move { locator.click_centre().await }).await
	}

	/// Polls for `target` within its own attempt budget.
	pub async fn wait_for(&self, target: &Target, cancel: &CancellationToken) -> Result<ElementHandle> {
		self.wait_for_within(target, RetryPolicy::for_target(target), cancel).await
	}

	pub async fn wait_for_within(&self, target: &Target, policy: RetryPolicy, cancel: &CancellationToken) -> Result<ElementHandle> {
		poll_until(&target.name, policy, cancel, || async move {
			Ok(match self.find(target).await? {
				Lookup::Found(handle) => Some(handle),
				Lookup::NotFound => None,
			})
		})
		.await
	}

	/// Polls `targets` in order on each attempt and returns the first one found.
	///
	/// The budget is the largest attempt count among the targets, paced by
	/// the first target's interval.
	pub async fn wait_for_any(&self, targets: &[Target], cancel: &CancellationToken) -> Result<ElementHandle> {
		let Some(first) = targets.first() else {
			return Err(BotError::NotFound {
				target: "<none configured>".into(),
			});
		};
		let attempts = targets.iter().map(|t| t.attempts).max().unwrap_or(1);
		let names = targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join("|");
		poll_until(&names, RetryPolicy::new(attempts, first.interval()), cancel, || async move {
			for target in targets {
				if let Lookup::Found(handle) = self.find(target).await? {
					return Ok(Some(handle));
				}
			}
			Ok(None)
		})
		.await
	}

	/// Polls until `target` is found and successfully activated.
	///
	/// A handle that goes stale between lookup and activation counts as a
	/// miss, and the next attempt looks the element up again.
	pub async fn find_and_activate(&self, target: &Target, cancel: &CancellationToken) -> Result<ElementHandle> {
		self.find_and_activate_within(target, RetryPolicy::for_target(target), cancel).await
	}

	pub async fn find_and_activate_within(&self, target: &Target, policy: RetryPolicy, cancel: &CancellationToken) -> Result<ElementHandle> {
		poll_until(&target.name, policy, cancel, || async move {
			let Lookup::Found(handle) = self.find(target).await? else {
				return Ok(None);
			};
			match self.activate(&handle).await? {
				Activation::Activated => Ok(Some(handle)),
				Activation::Stale => {
					debug!(target = "meetbot.session", target_name = %target.name, "handle went stale; looking up again");
					Ok(None)
				}
			}
		})
		.await
	}

	/// One lookup and, if found, one activation. Returns whether it clicked.
	pub async fn try_activate(&self, target: &Target) -> Result<bool> {
		match self.find(target).await? {
			Lookup::Found(handle) => Ok(self.activate(&handle).await? == Activation::Activated),
			Lookup::NotFound => Ok(false),
		}
	}

	/// Activates the first visible target in `targets`, returning its name.
	pub async fn dismiss_first(&self, targets: &[Target]) -> Result<Option<String>> {
		for target in targets {
			if self.try_activate(target).await? {
				return Ok(Some(target.name.clone()));
			}
		}
		Ok(None)
	}

	/// Snapshots the surface into the diagnostics directory as `<step>.*`.
	///
	/// Best effort: failures are logged and yield `None`.
	pub async fn capture(&self, step: &str) -> Option<Capture> {
		let snapshot = match self.dispatch(|locator| async move { locator.snapshot().await }).await {
			Ok(snapshot) => snapshot,
			Err(err) => {
				warn!(target = "meetbot.session", step, error = %err, "snapshot failed");
				return None;
			}
		};
		match self.session.diagnostics.write_snapshot(step, &snapshot) {
			Ok(capture) => Some(capture),
			Err(err) => {
				warn!(target = "meetbot.session", step, error = %err, "failed to write snapshot");
				None
			}
		}
	}
}
