//! Join workflow: drives the surface from the join page into the meeting.
//!
//! Steps run in a fixed order, each under the screen lock for its own
//! duration only. Optional steps absorb absence; mandatory steps turn it into
//! a [`JoinFailure`] after capturing diagnostics. Admission is awaited without
//! a deadline: only cancellation or loss of the surface ends that wait.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use meetbot_protocol::{MeetingRef, Target, TargetCatalog};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BotError, Result};
use crate::locator::Lookup;
use crate::retry::sleep_or_cancel;
use crate::session::{Screen, ScreenFlag, Session};

/// Tunables for the join workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinPolicy {
	/// Pause between admission polls.
	pub admission_poll_ms: u64,
	/// Pause after selecting audio before the session is marked ready.
	pub settle_ms: u64,
	/// Mute the microphone once joined.
	pub mute_on_join: bool,
}

impl Default for JoinPolicy {
	fn default() -> Self {
		Self {
			admission_poll_ms: 3000,
			settle_ms: 5000,
			mute_on_join: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStep {
	Open,
	OpenJoinForm,
	EnterMeetingId,
	AcceptCookies,
	AgreeToTerms,
	SetDisplayName,
	RequestAdmission,
	EnterAccessSecret,
	AwaitAdmission,
	SelectAudioMode,
	MuteMicrophone,
}

impl JoinStep {
	pub const ORDER: [JoinStep; 11] = [
		JoinStep::Open,
		JoinStep::OpenJoinForm,
		JoinStep::EnterMeetingId,
		JoinStep::AcceptCookies,
		JoinStep::AgreeToTerms,
		JoinStep::SetDisplayName,
		JoinStep::RequestAdmission,
		JoinStep::EnterAccessSecret,
		JoinStep::AwaitAdmission,
		JoinStep::SelectAudioMode,
		JoinStep::MuteMicrophone,
	];

	pub fn name(self) -> &'static str {
		match self {
			JoinStep::Open => "open",
			JoinStep::OpenJoinForm => "open_join_form",
			JoinStep::EnterMeetingId => "enter_meeting_id",
			JoinStep::AcceptCookies => "accept_cookies",
			JoinStep::AgreeToTerms => "agree_to_terms",
			JoinStep::SetDisplayName => "set_display_name",
			JoinStep::RequestAdmission => "request_admission",
			JoinStep::EnterAccessSecret => "enter_access_secret",
			JoinStep::AwaitAdmission => "await_admission",
			JoinStep::SelectAudioMode => "select_audio_mode",
			JoinStep::MuteMicrophone => "mute_microphone",
		}
	}

	/// Steps the join cannot proceed without.
	pub fn is_mandatory(self) -> bool {
		matches!(self, JoinStep::SetDisplayName | JoinStep::RequestAdmission | JoinStep::SelectAudioMode)
	}
}

impl fmt::Display for JoinStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
	Completed,
	/// Attempted, but its target never showed up.
	Absent,
	/// Not applicable to this meeting or catalog.
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
	pub step: JoinStep,
	pub outcome: StepOutcome,
}

/// Steps attempted during a successful join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinReport {
	pub meeting: MeetingRef,
	pub steps: Vec<StepRecord>,
}

impl JoinReport {
	pub fn outcome(&self, step: JoinStep) -> Option<StepOutcome> {
		self.steps.iter().find(|r| r.step == step).map(|r| r.outcome)
	}

	/// Whether the step was actually tried (completed or found absent).
	pub fn attempted(&self, step: JoinStep) -> bool {
		matches!(self.outcome(step), Some(StepOutcome::Completed | StepOutcome::Absent))
	}
}

/// A mandatory step ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinFailure {
	pub step: JoinStep,
	pub diagnostics_dir: PathBuf,
	pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
	#[error("join failed at {}: {}", .0.step, .0.reason)]
	Failed(JoinFailure),

	#[error("join cancelled during {0}")]
	Cancelled(JoinStep),

	#[error("UI surface lost during {step}: {reason}")]
	SurfaceLost { step: JoinStep, reason: String },
}

enum AdmissionPoll {
	Admitted,
	Waiting,
	/// A banner was clicked and is gone; poll again straight away.
	Dismissed(String),
	/// A banner was clicked but is still on screen.
	Stuck(String),
	Nothing,
}

/// Runs the join steps for one session.
pub struct JoinWorkflow<'a> {
	session: &'a Session,
	catalog: &'a TargetCatalog,
	policy: &'a JoinPolicy,
	cancel: &'a CancellationToken,
}

impl<'a> JoinWorkflow<'a> {
	pub fn new(session: &'a Session, catalog: &'a TargetCatalog, policy: &'a JoinPolicy, cancel: &'a CancellationToken) -> Self {
		Self {
			session,
			catalog,
			policy,
			cancel,
		}
	}

	/// Joins `meeting` and opens the session's ready gate on success.
	pub async fn run(&self, meeting: &MeetingRef) -> std::result::Result<JoinReport, JoinError> {
		info!(
			target = "meetbot.join",
			session = %self.session.id(),
			meeting_id = %meeting.meeting_id,
			has_secret = meeting.has_secret(),
			"joining meeting"
		);

		let mut report = JoinReport {
			meeting: meeting.clone(),
			steps: Vec::with_capacity(JoinStep::ORDER.len()),
		};

		for step in JoinStep::ORDER {
			let result = self.execute(step, meeting).await;
			let outcome = self.resolve(step, result).await?;
			debug!(target = "meetbot.join", %step, ?outcome, "step finished");
			report.steps.push(StepRecord { step, outcome });

			if step == JoinStep::SelectAudioMode {
				sleep_or_cancel(Duration::from_millis(self.policy.settle_ms), self.cancel)
					.await
					.map_err(|_| JoinError::Cancelled(step))?;
				self.session.mark_ready();
			}
		}

		info!(target = "meetbot.join", session = %self.session.id(), meeting_id = %meeting.meeting_id, "joined meeting");
		Ok(report)
	}

	async fn execute(&self, step: JoinStep, meeting: &MeetingRef) -> Result<StepOutcome> {
		match step {
			JoinStep::Open => self.open(&meeting.join_url).await,
			JoinStep::OpenJoinForm => self.click(self.catalog.open_join_form.as_ref()).await,
			JoinStep::EnterMeetingId => self.enter_meeting_id(&meeting.meeting_id).await,
			JoinStep::AcceptCookies => self.click(self.catalog.accept_cookies.as_ref()).await,
			JoinStep::AgreeToTerms => self.click(self.catalog.agree_terms.as_ref()).await,
			JoinStep::SetDisplayName => self.set_display_name().await,
			JoinStep::RequestAdmission => self.click(Some(&self.catalog.join_button)).await,
			JoinStep::EnterAccessSecret => self.enter_access_secret(meeting.access_secret.as_deref()).await,
			JoinStep::AwaitAdmission => self.await_admission().await,
			JoinStep::SelectAudioMode => self.click(Some(&self.catalog.join_audio)).await,
			JoinStep::MuteMicrophone => self.mute_microphone().await,
		}
	}

	/// Maps a step result onto the workflow: absorb, fail, or abort.
	async fn resolve(&self, step: JoinStep, result: Result<StepOutcome>) -> std::result::Result<StepOutcome, JoinError> {
		let err = match result {
			Ok(outcome) => return Ok(outcome),
			Err(BotError::Cancelled) => {
				info!(target = "meetbot.join", %step, "join cancelled");
				return Err(JoinError::Cancelled(step));
			}
			Err(BotError::SurfaceLost(reason)) => return Err(JoinError::SurfaceLost { step, reason }),
			Err(err) => err,
		};

		let capture = self.session.lock_screen().await.capture(step.name()).await;

		if !step.is_mandatory() {
			warn!(
				target = "meetbot.join",
				%step,
				error = %err,
				snapshot = capture.is_some(),
				"optional step did not complete; continuing"
			);
			return Ok(StepOutcome::Absent);
		}

		warn!(target = "meetbot.join", %step, error = %err, "mandatory step failed");
		if let Err(archive_err) = self.session.diagnostics().archive_working_state() {
			warn!(target = "meetbot.join", error = %archive_err, "failed to archive working state");
		}
		Err(JoinError::Failed(JoinFailure {
			step,
			diagnostics_dir: self.session.diagnostics().dir().to_path_buf(),
			reason: err.to_string(),
		}))
	}

	async fn open(&self, url: &str) -> Result<StepOutcome> {
		self.session.lock_screen().await.open(url).await?;
		Ok(StepOutcome::Completed)
	}

	async fn click(&self, target: Option<&Target>) -> Result<StepOutcome> {
		let Some(target) = target else {
			return Ok(StepOutcome::Skipped);
		};
		let screen = self.session.lock_screen().await;
		screen.find_and_activate(target, self.cancel).await?;
		Ok(StepOutcome::Completed)
	}

	async fn enter_meeting_id(&self, meeting_id: &str) -> Result<StepOutcome> {
		let Some(target) = self.catalog.meeting_id_input.as_ref() else {
			return Ok(StepOutcome::Skipped);
		};
		if meeting_id.is_empty() {
			return Ok(StepOutcome::Skipped);
		}
		let screen = self.session.lock_screen().await;
		let field = screen.find_and_activate(target, self.cancel).await?;
		screen.type_text(&field, meeting_id).await?;
		screen.press_key("Enter").await?;
		Ok(StepOutcome::Completed)
	}

	async fn set_display_name(&self) -> Result<StepOutcome> {
		let screen = self.session.lock_screen().await;
		let field = screen.find_and_activate(&self.catalog.name_input, self.cancel).await?;
		screen.type_text(&field, self.session.display_name()).await?;
		Ok(StepOutcome::Completed)
	}

	async fn enter_access_secret(&self, secret: Option<&str>) -> Result<StepOutcome> {
		let Some(secret) = secret else {
			return Ok(StepOutcome::Skipped);
		};
		let screen = self.session.lock_screen().await;
		let field = screen.find_and_activate(&self.catalog.secret_input, self.cancel).await?;
		screen.type_text(&field, secret).await?;

		let submitted = match self.catalog.secret_submit.as_ref() {
			Some(submit) => match screen.find_and_activate(submit, self.cancel).await {
				Ok(_) => true,
				Err(err) if err.is_soft() => false,
				Err(err) => return Err(err),
			},
			None => false,
		};
		if !submitted {
			screen.press_key("Enter").await?;
		}
		Ok(StepOutcome::Completed)
	}

	async fn await_admission(&self) -> Result<StepOutcome> {
		let interval = Duration::from_millis(self.policy.admission_poll_ms);
		let mut polls: u64 = 0;

		loop {
			if self.cancel.is_cancelled() {
				return Err(BotError::Cancelled);
			}
			polls += 1;

			match self.poll_admission().await? {
				AdmissionPoll::Admitted => {
					info!(target = "meetbot.join", polls, "admitted to meeting");
					return Ok(StepOutcome::Completed);
				}
				AdmissionPoll::Dismissed(banner) => {
					debug!(target = "meetbot.join", %banner, polls, "dismissed banner while awaiting admission");
					continue;
				}
				AdmissionPoll::Stuck(banner) => {
					debug!(target = "meetbot.join", %banner, polls, "banner still visible after click");
				}
				AdmissionPoll::Waiting => {
					if polls == 1 || polls % 20 == 0 {
						info!(target = "meetbot.join", polls, "in waiting room");
					}
				}
				AdmissionPoll::Nothing => debug!(target = "meetbot.join", polls, "admission not yet visible"),
			}

			sleep_or_cancel(interval, self.cancel).await?;
		}
	}

	/// One look at the surface, in priority order. Backend hiccups read as "nothing yet".
	async fn poll_admission(&self) -> Result<AdmissionPoll> {
		let screen = self.session.lock_screen().await;
		match self.poll_once(&screen).await {
			Err(err) if !err.is_terminal() => {
				debug!(target = "meetbot.join", error = %err, "admission poll failed");
				Ok(AdmissionPoll::Nothing)
			}
			other => other,
		}
	}

	async fn poll_once(&self, screen: &Screen<'_>) -> Result<AdmissionPoll> {
		if let Lookup::Found(_) = screen.find(&self.catalog.join_audio).await? {
			return Ok(AdmissionPoll::Admitted);
		}
		if let Lookup::Found(_) = screen.find(&self.catalog.waiting_room).await? {
			return Ok(AdmissionPoll::Waiting);
		}
		for banner in &self.catalog.banners {
			if !screen.try_activate(banner).await? {
				continue;
			}
			return Ok(match screen.find(banner).await? {
				Lookup::NotFound => AdmissionPoll::Dismissed(banner.name.clone()),
				Lookup::Found(_) => AdmissionPoll::Stuck(banner.name.clone()),
			});
		}
		Ok(AdmissionPoll::Nothing)
	}

	async fn mute_microphone(&self) -> Result<StepOutcome> {
		let Some(target) = self.catalog.mute_microphone.as_ref() else {
			return Ok(StepOutcome::Skipped);
		};
		if !self.policy.mute_on_join {
			return Ok(StepOutcome::Skipped);
		}
		let mut screen = self.session.lock_screen().await;
		if screen.is_set(ScreenFlag::MicrophoneMuted) {
			return Ok(StepOutcome::Skipped);
		}
		screen.find_and_activate(target, self.cancel).await?;
		screen.mark(ScreenFlag::MicrophoneMuted);
		Ok(StepOutcome::Completed)
	}
}

/// Convenience wrapper around [`JoinWorkflow::run`].
pub async fn join(
	session: &Session,
	catalog: &TargetCatalog,
	policy: &JoinPolicy,
	meeting: &MeetingRef,
	cancel: &CancellationToken,
) -> std::result::Result<JoinReport, JoinError> {
	JoinWorkflow::new(session, catalog, policy, cancel).run(meeting).await
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use tokio::time::Instant;

	use super::*;
	use crate::diagnostics::DiagnosticsConfig;
	use crate::locator::{ElementLocator, FakeCall, FakeEffect, FakeSurface};
	use crate::session::{Participant, SessionOptions};

	fn session(fake: &Arc<FakeSurface>, root: &std::path::Path) -> Session {
		let locator: Arc<dyn ElementLocator> = fake.clone();
		Session::new(
			locator,
			SessionOptions {
				participant: Participant {
					display_name: "Recorder".into(),
					email: None,
				},
				diagnostics: DiagnosticsConfig {
					root: root.to_path_buf(),
					..DiagnosticsConfig::default()
				},
				..SessionOptions::default()
			},
		)
		.unwrap()
	}

	fn catalog() -> TargetCatalog {
		let mut catalog = TargetCatalog::web();
		catalog.accept_cookies = None;
		catalog.agree_terms = None;
		catalog.mute_microphone = None;
		catalog
	}

	fn policy() -> JoinPolicy {
		JoinPolicy {
			admission_poll_ms: 3000,
			settle_ms: 0,
			mute_on_join: false,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn banner_waiting_room_then_audio_polls_three_times_with_one_sleep() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(
			FakeSurface::new()
				.with_frames("join_audio", vec![vec!["banner_ok"], vec!["waiting_room"], vec!["join_audio"]])
				.on_activate("banner_ok", FakeEffect::Hide(vec!["banner_ok".into()])),
		);
		let session = session(&fake, tmp.path());
		let catalog = catalog();
		let policy = policy();
		let cancel = CancellationToken::new();
		let workflow = JoinWorkflow::new(&session, &catalog, &policy, &cancel);

		let started = Instant::now();
		assert_eq!(workflow.await_admission().await.unwrap(), StepOutcome::Completed);
		assert_eq!(started.elapsed(), Duration::from_millis(3000));
		assert_eq!(fake.finds("join_audio"), 3);
		assert_eq!(fake.activations("banner_ok"), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn banner_that_survives_its_click_is_retried_at_poll_pace() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(FakeSurface::new().with_visible(["banner_ok"]));
		let session = session(&fake, tmp.path());
		let catalog = catalog();
		let policy = policy();
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(9_500)).await;
			trigger.cancel();
		});

		let workflow = JoinWorkflow::new(&session, &catalog, &policy, &cancel);
		let err = workflow.await_admission().await.unwrap_err();
		assert!(matches!(err, BotError::Cancelled));
		// Polls at 0, 3000, 6000 and 9000ms.
		assert_eq!(fake.activations("banner_ok"), 4);
		assert_eq!(fake.finds("join_audio"), 4);
		assert_eq!(fake.activations("banner_allow"), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn waiting_room_forever_only_ends_on_cancel() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(FakeSurface::new().with_visible(["waiting_room"]));
		let session = session(&fake, tmp.path());
		let catalog = catalog();
		let policy = policy();
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(3_601_500)).await;
			trigger.cancel();
		});

		let workflow = JoinWorkflow::new(&session, &catalog, &policy, &cancel);
		let err = workflow.await_admission().await.unwrap_err();
		assert!(matches!(err, BotError::Cancelled));
		assert_eq!(fake.finds("waiting_room"), 1201);
	}

	#[tokio::test(start_paused = true)]
	async fn missing_name_field_fails_with_step_and_diagnostics() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(FakeSurface::new());
		let session = session(&fake, tmp.path());
		let catalog = catalog();
		let policy = policy();
		let cancel = CancellationToken::new();
		let meeting = MeetingRef::parse("https://example.com/j/987654321");

		let err = join(&session, &catalog, &policy, &meeting, &cancel).await.unwrap_err();
		let JoinError::Failed(failure) = err else {
			panic!("expected a join failure, got {err:?}");
		};
		assert_eq!(failure.step, JoinStep::SetDisplayName);
		assert_eq!(failure.diagnostics_dir, session.diagnostics().dir());
		assert!(failure.diagnostics_dir.join("set_display_name.png").exists());
		assert_eq!(fake.finds("name_input"), 30);
		assert!(!session.is_ready());
	}

	#[tokio::test(start_paused = true)]
	async fn secret_is_typed_and_submitted() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(FakeSurface::new().with_visible(["secret_input", "secret_submit"]));
		let session = session(&fake, tmp.path());
		let catalog = catalog();
		let policy = policy();
		let cancel = CancellationToken::new();
		let workflow = JoinWorkflow::new(&session, &catalog, &policy, &cancel);

		assert_eq!(workflow.enter_access_secret(Some("abc")).await.unwrap(), StepOutcome::Completed);
		assert!(fake.calls().contains(&FakeCall::Type {
			target: "secret_input".into(),
			text: "abc".into(),
		}));
		assert_eq!(fake.activations("secret_submit"), 1);
		assert_eq!(fake.count(&FakeCall::Key("Enter".into())), 0);

		assert_eq!(workflow.enter_access_secret(None).await.unwrap(), StepOutcome::Skipped);
	}

	#[tokio::test(start_paused = true)]
	async fn mute_sets_flag_once() {
		let tmp = tempfile::tempdir().unwrap();
		let fake = Arc::new(FakeSurface::new().with_visible(["mute_microphone"]));
		let session = session(&fake, tmp.path());
		let mut catalog = catalog();
		catalog.mute_microphone = Some(Target::selector("mute_microphone", "button.mute"));
		let policy = JoinPolicy {
			mute_on_join: true,
			..policy()
		};
		let cancel = CancellationToken::new();
		let workflow = JoinWorkflow::new(&session, &catalog, &policy, &cancel);

		assert_eq!(workflow.mute_microphone().await.unwrap(), StepOutcome::Completed);
		assert_eq!(workflow.mute_microphone().await.unwrap(), StepOutcome::Skipped);
		assert_eq!(fake.activations("mute_microphone"), 1);
		assert!(session.flags().await.is_set(ScreenFlag::MicrophoneMuted));
	}

	#[test]
	fn only_three_steps_are_mandatory() {
		let mandatory: Vec<_> = JoinStep::ORDER.into_iter().filter(|s| s.is_mandatory()).collect();
		assert_eq!(
			mandatory,
			vec![JoinStep::SetDisplayName, JoinStep::RequestAdmission, JoinStep::SelectAudioMode]
		);
	}
}
