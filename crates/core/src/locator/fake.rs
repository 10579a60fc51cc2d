//! Scripted in-memory surface for exercising the engine without a browser.
//!
//! Targets are identified by name. A target is found when its name is in the
//! visible set; activating a handle whose target is no longer visible reports
//! [`Activation::Stale`]. Frames let a test model a UI that changes over time:
//! each lookup of the configured *advance* target replaces the visible set
//! with the next frame.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use meetbot_protocol::Target;
use parking_lot::Mutex;

use super::{Activation, ElementHandle, ElementLocator, HandleToken, Lookup, Snapshot};
use crate::error::{BotError, Result};

/// One recorded locator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
	Open(String),
	Find(String),
	Activate(String),
	Type { target: String, text: String },
	Key(String),
	Snapshot,
	Fullscreen,
	Sweep,
	CentreClick,
	Close,
}

/// Visibility change applied when a target is activated.
#[derive(Debug, Clone)]
pub enum FakeEffect {
	Show(Vec<String>),
	Hide(Vec<String>),
	Toggle(Vec<String>),
}

#[derive(Default)]
struct FakeState {
	visible: HashSet<String>,
	frames: VecDeque<HashSet<String>>,
	advance_on: Option<String>,
	effects: HashMap<String, Vec<FakeEffect>>,
	stale: HashMap<String, u32>,
	lost: bool,
	fail_fullscreen: bool,
	calls: Vec<FakeCall>,
}

/// Scripted [`ElementLocator`].
#[derive(Default)]
pub struct FakeSurface {
	state: Mutex<FakeState>,
	next_handle: AtomicU64,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	delay: Duration,
}

struct InFlight<'a>(&'a FakeSurface);

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

impl FakeSurface {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts with `names` visible.
	pub fn with_visible<'a>(self, names: impl IntoIterator<Item = &'a str>) -> Self {
		self.state.lock().visible.extend(names.into_iter().map(str::to_string));
		self
	}

	/// Replaces the visible set with the next frame on every lookup of `advance_on`.
	pub fn with_frames(self, advance_on: &str, frames: Vec<Vec<&str>>) -> Self {
		{
			let mut state = self.state.lock();
			state.advance_on = Some(advance_on.to_string());
			state.frames = frames
				.into_iter()
				.map(|frame| frame.into_iter().map(str::to_string).collect())
				.collect();
		}
		self
	}

	pub fn on_activate(self, name: &str, effect: FakeEffect) -> Self {
		self.state.lock().effects.entry(name.to_string()).or_default().push(effect);
		self
	}

	/// The next `times` activations of `name` report stale.
	pub fn stale_times(self, name: &str, times: u32) -> Self {
		self.state.lock().stale.insert(name.to_string(), times);
		self
	}

	/// Each locator call takes `delay` to complete.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	/// Fullscreen requests fail with a backend error.
	pub fn failing_fullscreen(self) -> Self {
		self.state.lock().fail_fullscreen = true;
		self
	}

	pub fn show(&self, name: &str) {
		self.state.lock().visible.insert(name.to_string());
	}

	pub fn hide(&self, name: &str) {
		self.state.lock().visible.remove(name);
	}

	pub fn is_visible(&self, name: &str) -> bool {
		self.state.lock().visible.contains(name)
	}

	/// Every subsequent call fails as if the window closed.
	pub fn lose_surface(&self) {
		self.state.lock().lost = true;
	}

	pub fn calls(&self) -> Vec<FakeCall> {
		self.state.lock().calls.clone()
	}

	pub fn count(&self, call: &FakeCall) -> usize {
		self.state.lock().calls.iter().filter(|c| *c == call).count()
	}

	pub fn activations(&self, name: &str) -> usize {
		self.count(&FakeCall::Activate(name.to_string()))
	}

	pub fn finds(&self, name: &str) -> usize {
		self.count(&FakeCall::Find(name.to_string()))
	}

	/// Highest number of calls that were ever in progress at once.
	pub fn max_concurrency(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	async fn enter(&self, call: FakeCall) -> Result<InFlight<'_>> {
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now, Ordering::SeqCst);
		let guard = InFlight(self);
		{
			let mut state = self.state.lock();
			state.calls.push(call);
			if state.lost {
				return Err(BotError::SurfaceLost("fake surface closed".into()));
			}
		}
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		Ok(guard)
	}

	fn apply_effects(state: &mut FakeState, name: &str) {
		let Some(effects) = state.effects.get(name).cloned() else {
			return;
		};
		for effect in effects {
			match effect {
				FakeEffect::Show(names) => state.visible.extend(names),
				FakeEffect::Hide(names) => {
					for name in names {
						state.visible.remove(&name);
					}
				}
				FakeEffect::Toggle(names) => {
					for name in names {
						if !state.visible.remove(&name) {
							state.visible.insert(name);
						}
					}
				}
			}
		}
	}
}

#[async_trait]
impl ElementLocator for FakeSurface {
	fn backend(&self) -> &'static str {
		"fake"
	}

	async fn open(&self, url: &str) -> Result<()> {
		let _call = self.enter(FakeCall::Open(url.to_string())).await?;
		Ok(())
	}

	async fn find(&self, target: &Target) -> Result<Lookup> {
		let _call = self.enter(FakeCall::Find(target.name.clone())).await?;
		let mut state = self.state.lock();
		if state.advance_on.as_deref() == Some(target.name.as_str()) {
			if let Some(frame) = state.frames.pop_front() {
				state.visible = frame;
			}
		}
		if !state.visible.contains(&target.name) {
			return Ok(Lookup::NotFound);
		}
		let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(Lookup::Found(ElementHandle {
			target: target.name.clone(),
			token: HandleToken::Node(id),
		}))
	}

	async fn activate(&self, handle: &ElementHandle) -> Result<Activation> {
		let _call = self.enter(FakeCall::Activate(handle.target.clone())).await?;
		let mut state = self.state.lock();
		if let Some(remaining) = state.stale.get_mut(&handle.target) {
			if *remaining > 0 {
				*remaining -= 1;
				return Ok(Activation::Stale);
			}
		}
		if !state.visible.contains(&handle.target) {
			return Ok(Activation::Stale);
		}
		Self::apply_effects(&mut state, &handle.target);
		Ok(Activation::Activated)
	}

	async fn type_text(&self, handle: &ElementHandle, text: &str) -> Result<()> {
		let _call = self
			.enter(FakeCall::Type {
				target: handle.target.clone(),
				text: text.to_string(),
			})
			.await?;
		Ok(())
	}

	async fn press_key(&self, key: &str) -> Result<()> {
		let _call = self.enter(FakeCall::Key(key.to_string())).await?;
		Ok(())
	}

	async fn snapshot(&self) -> Result<Snapshot> {
		let _call = self.enter(FakeCall::Snapshot).await?;
		let state = self.state.lock();
		let mut visible: Vec<_> = state.visible.iter().cloned().collect();
		visible.sort();
		Ok(Snapshot {
			image: Some(b"\x89PNG\r\n\x1a\n".to_vec()),
			html: Some(format!("<body data-visible=\"{}\"></body>", visible.join(","))),
		})
	}

	async fn enter_fullscreen(&self) -> Result<()> {
		let _call = self.enter(FakeCall::Fullscreen).await?;
		if self.state.lock().fail_fullscreen {
			return Err(BotError::Backend("fullscreen request denied".into()));
		}
		Ok(())
	}

	async fn sweep_pointer(&self) -> Result<()> {
		let _call = self.enter(FakeCall::Sweep).await?;
		Ok(())
	}

	async fn click_centre(&self) -> Result<()> {
		let _call = self.enter(FakeCall::CentreClick).await?;
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		self.state.lock().calls.push(FakeCall::Close);
		Ok(())
	}
}
