//! Maintenance and messaging sharing one session.

use std::sync::Arc;
use std::time::Duration;

use meetbot::locator::{FakeCall, FakeEffect};
use meetbot::{DiagnosticsConfig, Delivery, ElementLocator, FakeSurface, MaintenanceConfig, MaintenanceLoop, Messenger, Session, SessionOptions};
use meetbot_protocol::TargetCatalog;
use tokio_util::sync::CancellationToken;

fn shared_session(fake: &Arc<FakeSurface>, root: &std::path::Path) -> Arc<Session> {
	let locator: Arc<dyn ElementLocator> = fake.clone();
	let session = Session::new(
		locator,
		SessionOptions {
			diagnostics: DiagnosticsConfig {
				root: root.to_path_buf(),
				..DiagnosticsConfig::default()
			},
			workers: 4,
			..SessionOptions::default()
		},
	)
	.expect("session");
	Arc::new(session)
}

fn message_block(text: &str) -> Vec<FakeCall> {
	vec![
		FakeCall::Find("chat_button".into()),
		FakeCall::Activate("chat_button".into()),
		FakeCall::Find("chat_input".into()),
		FakeCall::Activate("chat_input".into()),
		FakeCall::Type {
			target: "chat_input".into(),
			text: text.into(),
		},
		FakeCall::Key("Enter".into()),
		FakeCall::Find("chat_button".into()),
		FakeCall::Activate("chat_button".into()),
	]
}

#[tokio::test(start_paused = true)]
async fn messages_and_ticks_never_interleave() -> anyhow::Result<()> {
	let tmp = tempfile::tempdir()?;
	let fake = Arc::new(
		FakeSurface::new()
			.with_visible(["chat_button", "view_menu"])
			.on_activate("chat_button", FakeEffect::Toggle(vec!["chat_input".into()]))
			.on_activate("view_menu", FakeEffect::Show(vec!["gallery_view".into()]))
			.with_delay(Duration::from_millis(50)),
	);
	let session = shared_session(&fake, tmp.path());
	let catalog = Arc::new(TargetCatalog::web());
	let cancel = CancellationToken::new();

	let maintenance = {
		let maintenance = MaintenanceLoop::new(
			Arc::clone(&session),
			Arc::clone(&catalog),
			MaintenanceConfig {
				normalize_view: true,
				reapply_view: true,
				keep_toolbars_visible: true,
				tick_interval_ms: 400,
				..MaintenanceConfig::default()
			},
		);
		let cancel = cancel.clone();
		tokio::spawn(async move { maintenance.run(&cancel).await })
	};

	let messenger = Arc::new(Messenger::new(Arc::clone(&session), Arc::clone(&catalog)));
	let sends: Vec<_> = (1..=3)
		.map(|i| {
			let messenger = Arc::clone(&messenger);
			let cancel = cancel.clone();
			tokio::spawn(async move { messenger.send_message(&format!("message {i}"), &cancel).await })
		})
		.collect();

	for send in sends {
		assert_eq!(send.await??, Delivery::Sent);
	}
	tokio::time::sleep(Duration::from_secs(2)).await;
	cancel.cancel();
	let ticks = maintenance.await??;
	assert!(ticks >= 2, "expected several ticks, got {ticks}");

	assert_eq!(fake.max_concurrency(), 1);

	let calls = fake.calls();
	for i in 1..=3 {
		let block = message_block(&format!("message {i}"));
		let found = calls.windows(block.len()).filter(|w| *w == block.as_slice()).count();
		assert_eq!(found, 1, "message {i} was not one contiguous block: {calls:?}");
	}
	assert_eq!(fake.count(&FakeCall::Fullscreen), 1);
	assert_eq!(fake.activations("gallery_view"), ticks as usize);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn message_sent_mid_tick_waits_for_the_tick() -> anyhow::Result<()> {
	let tmp = tempfile::tempdir()?;
	let fake = Arc::new(
		FakeSurface::new()
			.with_visible(["chat_button", "chat_input"])
			.with_delay(Duration::from_millis(100)),
	);
	let session = shared_session(&fake, tmp.path());
	session.mark_ready();
	let catalog = Arc::new(TargetCatalog::web());
	let cancel = CancellationToken::new();

	let maintenance = MaintenanceLoop::new(
		Arc::clone(&session),
		Arc::clone(&catalog),
		MaintenanceConfig {
			normalize_view: false,
			keep_toolbars_visible: true,
			tick_interval_ms: 60_000,
			..MaintenanceConfig::default()
		},
	);
	let tick = {
		let cancel = cancel.clone();
		tokio::spawn(async move { maintenance.tick(1, &cancel).await })
	};
	tokio::time::sleep(Duration::from_millis(150)).await;

	let messenger = Messenger::new(Arc::clone(&session), catalog);
	assert_eq!(messenger.send_message("hello", &cancel).await?, Delivery::Sent);
	tick.await??;

	let calls = fake.calls();
	let sweep = calls.iter().position(|c| *c == FakeCall::Sweep).expect("tick swept the pointer");
	let typed = calls
		.iter()
		.position(|c| matches!(c, FakeCall::Type { .. }))
		.expect("message was typed");
	assert!(sweep < typed, "message ran inside the tick: {calls:?}");
	Ok(())
}
