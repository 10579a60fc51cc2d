//! UI target descriptors.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default template-match confidence for lookups.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Default number of lookups a bounded wait performs.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default pause between lookups, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// How a backend recognizes a target on the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Locate {
	/// CSS selector evaluated against the page DOM.
	Selector { selector: String },
	/// Visible text, optionally restricted to a tag name.
	///
	/// Unless `exact`, an element whose text merely contains `text` matches
	/// when no element's text equals it.
	Text {
		text: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tag: Option<String>,
		#[serde(default, skip_serializing_if = "std::ops::Not::not")]
		exact: bool,
	},
	/// Reference image matched against the screen.
	Template { image: PathBuf },
}

impl std::fmt::Display for Locate {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Locate::Selector { selector } => write!(f, "css={selector}"),
			Locate::Text { text, tag, exact } => {
				let op = if *exact { "==" } else { "=" };
				match tag {
					Some(tag) => write!(f, "text{op}{text} ({tag})"),
					None => write!(f, "text{op}{text}"),
				}
			}
			Locate::Template { image } => write!(f, "template={}", image.display()),
		}
	}
}

/// A named, immutable UI element descriptor plus its lookup budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
	pub name: String,
	#[serde(flatten)]
	pub locate: Locate,
	#[serde(default = "default_confidence")]
	pub confidence: f32,
	#[serde(default = "default_attempts")]
	pub attempts: u32,
	#[serde(default = "default_interval_ms")]
	pub interval_ms: u64,
}

impl Target {
	pub fn selector(name: impl Into<String>, selector: impl Into<String>) -> Self {
		Self::new(name, Locate::Selector { selector: selector.into() })
	}

	pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
		Self::new(
			name,
			Locate::Text {
				text: text.into(),
				tag: None,
				exact: false,
			},
		)
	}

	pub fn text_in(name: impl Into<String>, text: impl Into<String>, tag: impl Into<String>) -> Self {
		Self::new(
			name,
			Locate::Text {
				text: text.into(),
				tag: Some(tag.into()),
				exact: false,
			},
		)
	}

	pub fn template(name: impl Into<String>, image: impl Into<PathBuf>) -> Self {
		Self::new(name, Locate::Template { image: image.into() })
	}

	fn new(name: impl Into<String>, locate: Locate) -> Self {
		Self {
			name: name.into(),
			locate,
			confidence: DEFAULT_CONFIDENCE,
			attempts: DEFAULT_ATTEMPTS,
			interval_ms: DEFAULT_INTERVAL_MS,
		}
	}

	pub fn with_attempts(mut self, attempts: u32) -> Self {
		self.attempts = attempts;
		self
	}

	pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
		self.interval_ms = interval_ms;
		self
	}

	/// Text targets match whole labels only. No effect on other kinds.
	pub fn exact(mut self) -> Self {
		if let Locate::Text { exact, .. } = &mut self.locate {
			*exact = true;
		}
		self
	}

	pub fn with_confidence(mut self, confidence: f32) -> Self {
		self.confidence = confidence;
		self
	}

	/// Pause between lookups.
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

impl std::fmt::Display for Target {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} [{}]", self.name, self.locate)
	}
}

fn default_confidence() -> f32 {
	DEFAULT_CONFIDENCE
}

fn default_attempts() -> u32 {
	DEFAULT_ATTEMPTS
}

fn default_interval_ms() -> u64 {
	DEFAULT_INTERVAL_MS
}
