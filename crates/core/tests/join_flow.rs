//! Join workflow against a scripted surface.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use meetbot::locator::FakeCall;
use meetbot::{
	DiagnosticsConfig, ElementLocator, FakeSurface, JoinError, JoinPolicy, JoinStep, Participant, Session, SessionOptions, StepOutcome, join,
};
use meetbot_protocol::{MeetingRef, TargetCatalog};
use meetbot_runtime::AppProcess;
use tokio_util::sync::CancellationToken;

const IN_LOBBY: [&str; 5] = ["name_input", "join_button", "secret_input", "secret_submit", "join_audio"];

fn session(fake: &Arc<FakeSurface>, diagnostics: DiagnosticsConfig) -> Session {
	let locator: Arc<dyn ElementLocator> = fake.clone();
	Session::new(
		locator,
		SessionOptions {
			participant: Participant {
				display_name: "Recorder".into(),
				email: Some("recorder@example.com".into()),
			},
			diagnostics,
			..SessionOptions::default()
		},
	)
	.expect("session")
}

fn diagnostics_in(root: &Path) -> DiagnosticsConfig {
	DiagnosticsConfig {
		root: root.join("diagnostics"),
		..DiagnosticsConfig::default()
	}
}

fn quick_policy() -> JoinPolicy {
	JoinPolicy {
		admission_poll_ms: 3000,
		settle_ms: 5000,
		mute_on_join: true,
	}
}

#[tokio::test(start_paused = true)]
async fn url_with_secret_enters_it_and_becomes_ready() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let fake = Arc::new(FakeSurface::new().with_visible(IN_LOBBY));
	let session = session(&fake, diagnostics_in(tmp.path()));
	let meeting = MeetingRef::parse("https://us02web.zoom.us/j/123456789?pwd=abc");
	assert_eq!(meeting.meeting_id, "123456789");

	let report = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect("join succeeds");

	assert_eq!(report.outcome(JoinStep::EnterAccessSecret), Some(StepOutcome::Completed));
	assert_eq!(report.outcome(JoinStep::AcceptCookies), Some(StepOutcome::Absent));
	assert_eq!(report.outcome(JoinStep::AgreeToTerms), Some(StepOutcome::Absent));
	assert_eq!(report.outcome(JoinStep::MuteMicrophone), Some(StepOutcome::Absent));
	assert_eq!(report.outcome(JoinStep::OpenJoinForm), Some(StepOutcome::Skipped));
	assert!(session.is_ready());

	let calls = fake.calls();
	assert_eq!(calls[0], FakeCall::Open("https://zoom.us/wc/join/123456789?pwd=abc".into()));
	assert!(calls.contains(&FakeCall::Type {
		target: "name_input".into(),
		text: "Recorder".into(),
	}));
	assert!(calls.contains(&FakeCall::Type {
		target: "secret_input".into(),
		text: "abc".into(),
	}));
	assert!(session.diagnostics().dir().join("accept_cookies.png").exists());
}

#[tokio::test(start_paused = true)]
async fn url_without_secret_skips_secret_entry() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let fake = Arc::new(FakeSurface::new().with_visible(IN_LOBBY));
	let session = session(&fake, diagnostics_in(tmp.path()));
	let meeting = MeetingRef::parse("https://example.com/j/987654321");
	assert!(meeting.access_secret.is_none());

	let report = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect("join succeeds");

	assert_eq!(report.outcome(JoinStep::EnterAccessSecret), Some(StepOutcome::Skipped));
	assert!(!report.attempted(JoinStep::EnterAccessSecret));
	assert_eq!(fake.finds("secret_input"), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_join_button_fails_request_admission() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let fake = Arc::new(FakeSurface::new().with_visible(["name_input"]));
	let session = session(&fake, diagnostics_in(tmp.path()));
	let meeting = MeetingRef::parse("https://example.com/j/987654321");

	let err = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect_err("join must fail");

	match err {
		JoinError::Failed(failure) => {
			assert_eq!(failure.step, JoinStep::RequestAdmission);
			assert!(failure.diagnostics_dir.join("request_admission.png").exists());
			assert!(failure.reason.contains("join_button"));
		}
		other => panic!("unexpected error: {other:?}"),
	}
	assert!(!session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn audio_control_that_never_activates_fails_and_archives_working_state() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let state = tmp.path().join("profile");
	std::fs::create_dir_all(&state).expect("state dir");
	std::fs::write(state.join("Preferences"), "{}").expect("state file");
	let recovery = tmp.path().join("recovery");

	let fake = Arc::new(FakeSurface::new().with_visible(IN_LOBBY).stale_times("join_audio", 30));
	let session = session(
		&fake,
		DiagnosticsConfig {
			root: tmp.path().join("diagnostics"),
			working_state_dir: Some(state),
			recovery_dir: Some(recovery.clone()),
		},
	);
	let meeting = MeetingRef::parse("https://example.com/j/987654321");

	let err = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect_err("join must fail");

	let JoinError::Failed(failure) = err else {
		panic!("unexpected error: {err:?}");
	};
	assert_eq!(failure.step, JoinStep::SelectAudioMode);
	assert_eq!(fake.activations("join_audio"), 30);
	assert_eq!(std::fs::read_to_string(recovery.join("Preferences")).expect("archived"), "{}");
}

#[tokio::test(start_paused = true)]
async fn cancelling_in_the_waiting_room_reports_the_step() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let fake = Arc::new(FakeSurface::new().with_visible(["name_input", "join_button", "waiting_room"]));
	let session = session(&fake, diagnostics_in(tmp.path()));
	let meeting = MeetingRef::parse("https://example.com/j/987654321");
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_secs(600)).await;
		trigger.cancel();
	});

	let err = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &cancel)
		.await
		.expect_err("join must not finish");
	assert!(matches!(err, JoinError::Cancelled(JoinStep::AwaitAdmission)), "{err:?}");
	assert!(!session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn surface_loss_in_the_waiting_room_is_not_absence() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let fake = Arc::new(FakeSurface::new().with_visible(["name_input", "join_button", "waiting_room"]));
	let session = session(&fake, diagnostics_in(tmp.path()));
	let meeting = MeetingRef::parse("https://example.com/j/987654321");
	{
		let fake = Arc::clone(&fake);
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(120)).await;
			fake.lose_surface();
		});
	}

	let err = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect_err("join must not finish");
	assert!(
		matches!(err, JoinError::SurfaceLost { step: JoinStep::AwaitAdmission, .. }),
		"{err:?}"
	);
}

#[cfg(unix)]
#[tokio::test]
async fn exited_application_is_surface_loss_before_any_interaction() {
	let tmp = tempfile::tempdir().expect("tempdir");
	let mut child = std::process::Command::new("true").spawn().expect("spawn true");
	let pid = child.id();
	child.wait().expect("child exits");

	let fake = Arc::new(FakeSurface::new().with_visible(IN_LOBBY));
	let locator: Arc<dyn ElementLocator> = fake.clone();
	let session = Session::new(
		locator,
		SessionOptions {
			diagnostics: diagnostics_in(tmp.path()),
			app: Some(AppProcess::new(pid)),
			..SessionOptions::default()
		},
	)
	.expect("session");
	let meeting = MeetingRef::parse("https://us02web.zoom.us/j/123456789?pwd=abc");

	let err = join(&session, &TargetCatalog::web(), &quick_policy(), &meeting, &CancellationToken::new())
		.await
		.expect_err("dead application cannot join");
	assert!(matches!(err, JoinError::SurfaceLost { step: JoinStep::Open, .. }), "{err:?}");
	assert!(fake.calls().is_empty(), "{:?}", fake.calls());
	assert!(session.is_lost());
	assert!(!session.is_ready());
}
