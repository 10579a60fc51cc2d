//! The element-lookup capability every higher layer is built on.
//!
//! A locator resolves a [`Target`] against the live UI surface. Absence is an
//! ordinary [`Lookup::NotFound`], and an element that vanished between lookup
//! and action is an ordinary [`Activation::Stale`]; only a broken backend
//! returns `Err`.
//!
//! Backends:
//! - [`dom::DomLocator`]: structural queries against a Chromium page over DevTools
//! - [`template::TemplateLocator`]: reference-image matching through a [`template::ScreenDriver`]
//! - [`fake::FakeSurface`]: scripted in-memory surface for tests

use std::path::PathBuf;

use async_trait::async_trait;
use meetbot_protocol::Target;

use crate::error::Result;

pub mod dom;
pub mod fake;
pub mod template;

pub use dom::DomLocator;
pub use fake::{FakeCall, FakeEffect, FakeSurface};
pub use template::{ScreenDriver, TemplateLocator};

/// Backend-specific reference to a located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleToken {
	/// Slot in the page-side handle registry.
	Node(u64),
	/// Screen position of a template match.
	Point { x: i32, y: i32, image: PathBuf },
}

/// A located element, valid until the UI moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
	/// Name of the target this handle was resolved from.
	pub target: String,
	pub token: HandleToken,
}

/// Result of a single lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
	Found(ElementHandle),
	NotFound,
}

/// Result of activating a previously found element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
	Activated,
	/// The element is no longer there; look it up again.
	Stale,
}

/// Diagnostic capture of the surface.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
	/// PNG image of the surface.
	pub image: Option<Vec<u8>>,
	/// Structural dump, when the backend has one.
	pub html: Option<String>,
}

/// Uniform element-lookup capability over one UI surface.
///
/// Implementations are shared across tasks and every call is dispatched
/// through the session's worker pool, so they must be `Send + Sync + 'static`.
#[async_trait]
pub trait ElementLocator: Send + Sync + 'static {
	/// Short backend name for logs.
	fn backend(&self) -> &'static str;

	/// Points the surface at `url`. Backends without navigation ignore it.
	async fn open(&self, url: &str) -> Result<()>;

	async fn find(&self, target: &Target) -> Result<Lookup>;

	async fn activate(&self, handle: &ElementHandle) -> Result<Activation>;

	/// Types into the element, which must already have focus from [`activate`](Self::activate).
	async fn type_text(&self, handle: &ElementHandle, text: &str) -> Result<()>;

	async fn press_key(&self, key: &str) -> Result<()>;

	async fn snapshot(&self) -> Result<Snapshot>;

	async fn enter_fullscreen(&self) -> Result<()>;

	/// Moves the pointer across the surface so auto-hiding toolbars show.
	async fn sweep_pointer(&self) -> Result<()>;

	/// Clicks the middle of the surface, closing stray popovers.
	async fn click_centre(&self) -> Result<()>;

	async fn close(&self) -> Result<()>;
}
