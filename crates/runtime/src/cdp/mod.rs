//! Chrome DevTools Protocol plumbing.
//!
//! The browser is started by an external supervisor with
//! `--remote-debugging-port`; this module only attaches to it:
//!
//! 1. [`discovery`] resolves an HTTP debugging endpoint to a page target
//! 2. [`connection`] correlates JSON-RPC requests and responses over the page websocket
//! 3. [`page`] wraps the handful of domain methods the engine drives

pub mod connection;
pub mod discovery;
pub mod page;

pub use connection::CdpConnection;
pub use discovery::{PageTarget, list_page_targets, resolve_page_target};
pub use page::CdpPage;

/// Errors raised while talking to the browser.
#[derive(Debug, thiserror::Error)]
pub enum CdpError {
	/// The websocket closed; the page or the browser is gone.
	#[error("DevTools connection closed")]
	ConnectionClosed,

	#[error("{method} failed ({code}): {message}")]
	Protocol { method: String, code: i64, message: String },

	/// A page-side script threw.
	#[error("evaluation failed: {0}")]
	Evaluation(String),

	#[error("navigation to {url} failed: {reason}")]
	Navigation { url: String, reason: String },

	#[error("DevTools endpoint discovery failed: {0}")]
	Discovery(String),

	#[error("websocket transport error: {0}")]
	Transport(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl CdpError {
	/// Returns `true` when no further call on this connection can succeed.
	pub fn is_fatal(&self) -> bool {
		matches!(self, CdpError::ConnectionClosed | CdpError::Transport(_))
	}
}

pub type Result<T> = std::result::Result<T, CdpError>;
