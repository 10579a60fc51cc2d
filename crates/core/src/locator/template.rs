//! Reference-image backend for the native desktop client.
//!
//! Pixel matching and input synthesis belong to a [`ScreenDriver`] supplied
//! by the embedder. The driver is synchronous; every call runs on tokio's
//! blocking pool.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meetbot_protocol::{Locate, Target};
use tracing::debug;

use super::{Activation, ElementHandle, ElementLocator, HandleToken, Lookup, Snapshot};
use crate::error::{BotError, Result};

/// Confidence a template must reach again right before it is clicked.
pub const ACTIVATION_CONFIDENCE: f32 = 0.9;

/// Synchronous screen access: template matching plus keyboard and mouse.
///
/// Return [`io::ErrorKind::NotConnected`] when the display itself is gone;
/// the engine treats that as loss of the surface.
pub trait ScreenDriver: Send + Sync + 'static {
	/// Centre of the best match for `image` at or above `confidence`.
	fn locate_center(&self, image: &Path, confidence: f32) -> io::Result<Option<(i32, i32)>>;

	fn click(&self, x: i32, y: i32) -> io::Result<()>;

	/// Types `text`, pausing `interval` between characters.
	fn write(&self, text: &str, interval: Duration) -> io::Result<()>;

	fn press(&self, key: &str) -> io::Result<()>;

	fn hotkey(&self, keys: &[&str]) -> io::Result<()>;

	fn move_to(&self, x: i32, y: i32, duration: Duration) -> io::Result<()>;

	fn screen_size(&self) -> io::Result<(i32, i32)>;

	fn screenshot_png(&self) -> io::Result<Vec<u8>>;
}

pub struct TemplateLocator<D> {
	driver: Arc<D>,
	activation_confidence: f32,
	type_interval: Duration,
	sweep_duration: Duration,
}

impl<D: ScreenDriver> TemplateLocator<D> {
	pub fn new(driver: D) -> Self {
		Self {
			driver: Arc::new(driver),
			activation_confidence: ACTIVATION_CONFIDENCE,
			type_interval: Duration::from_millis(25),
			sweep_duration: Duration::from_millis(500),
		}
	}

	pub fn with_activation_confidence(mut self, confidence: f32) -> Self {
		self.activation_confidence = confidence;
		self
	}

	pub fn with_type_interval(mut self, interval: Duration) -> Self {
		self.type_interval = interval;
		self
	}

	async fn blocking<T, F>(&self, op: F) -> Result<T>
	where
		F: FnOnce(&D) -> io::Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let driver = Arc::clone(&self.driver);
		let result = tokio::task::spawn_blocking(move || op(&driver))
			.await
			.map_err(|e| BotError::Backend(format!("screen driver task failed: {e}")))?;
		result.map_err(driver_error)
	}
}

fn driver_error(err: io::Error) -> BotError {
	match err.kind() {
		io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => BotError::SurfaceLost(err.to_string()),
		_ => BotError::Backend(err.to_string()),
	}
}

fn template_image(target: &Target) -> Result<PathBuf> {
	match &target.locate {
		Locate::Template { image } => Ok(image.clone()),
		other => Err(BotError::Backend(format!("template backend cannot resolve {} ({other})", target.name))),
	}
}

#[async_trait]
impl<D: ScreenDriver> ElementLocator for TemplateLocator<D> {
	fn backend(&self) -> &'static str {
		"template"
	}

	async fn open(&self, url: &str) -> Result<()> {
		debug!(target = "meetbot.session", %url, "template backend has no navigation; open ignored");
		Ok(())
	}

	async fn find(&self, target: &Target) -> Result<Lookup> {
		let image = template_image(target)?;
		let confidence = target.confidence;
		let lookup_image = image.clone();
		let center = self.blocking(move |d| d.locate_center(&lookup_image, confidence)).await?;
		Ok(match center {
			Some((x, y)) => Lookup::Found(ElementHandle {
				target: target.name.clone(),
				token: HandleToken::Point { x, y, image },
			}),
			None => Lookup::NotFound,
		})
	}

	async fn activate(&self, handle: &ElementHandle) -> Result<Activation> {
		let HandleToken::Point { image, .. } = &handle.token else {
			return Err(BotError::Backend(format!("handle for {} did not come from the template backend", handle.target)));
		};
		let image = image.clone();
		let confidence = self.activation_confidence;
		self.blocking(move |d| {
			Ok(match d.locate_center(&image, confidence)? {
				Some((x, y)) => {
					d.click(x, y)?;
					Activation::Activated
				}
				None => Activation::Stale,
			})
		})
		.await
	}

	async fn type_text(&self, _handle: &ElementHandle, text: &str) -> Result<()> {
		let text = text.to_string();
		let interval = self.type_interval;
		self.blocking(move |d| d.write(&text, interval)).await
	}

	async fn press_key(&self, key: &str) -> Result<()> {
		let key = key.to_lowercase();
		self.blocking(move |d| d.press(&key)).await
	}

	async fn snapshot(&self) -> Result<Snapshot> {
		let image = self.blocking(|d| d.screenshot_png()).await?;
		Ok(Snapshot {
			image: Some(image),
			html: None,
		})
	}

	async fn enter_fullscreen(&self) -> Result<()> {
		self.blocking(|d| d.hotkey(&["alt", "f11"])).await
	}

	async fn sweep_pointer(&self) -> Result<()> {
		let duration = self.sweep_duration;
		self.blocking(move |d| {
			let (width, height) = d.screen_size()?;
			let y = height / 2;
			d.move_to(0, y, duration)?;
			d.move_to((width - 1).max(0), y, duration)
		})
		.await
	}

	async fn click_centre(&self) -> Result<()> {
		self.blocking(|d| {
			let (width, height) = d.screen_size()?;
			d.click(width / 2, height / 2)
		})
		.await
	}

	async fn close(&self) -> Result<()> {
		Ok(())
	}
}
