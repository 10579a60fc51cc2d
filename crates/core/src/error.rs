//! Engine error taxonomy.

use meetbot_runtime::CdpError;

/// Errors produced by locator calls and the components built on them.
///
/// `NotFound`, `TimedOut` and `ActivationFailed` are *soft*: they describe
/// the remote UI, not a malfunction, and drive branching in the join
/// workflow and maintenance loop. `Cancelled` is always propagated and never
/// retried. `SurfaceLost` is fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
	#[error("target {target} not found")]
	NotFound { target: String },

	#[error("target {target} not found after {attempts} attempt(s)")]
	TimedOut { target: String, attempts: u32 },

	#[error("target {target} went stale before it could be activated")]
	ActivationFailed { target: String },

	#[error("operation cancelled")]
	Cancelled,

	#[error("UI surface lost: {0}")]
	SurfaceLost(String),

	#[error("locator backend error: {0}")]
	Backend(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl BotError {
	/// Absence, exhaustion or staleness of a target.
	pub fn is_soft(&self) -> bool {
		matches!(
			self,
			BotError::NotFound { .. } | BotError::TimedOut { .. } | BotError::ActivationFailed { .. }
		)
	}

	/// The surface is gone; nothing further can succeed.
	pub fn is_fatal(&self) -> bool {
		matches!(self, BotError::SurfaceLost(_))
	}

	/// Errors that must end the current workflow or loop regardless of step.
	pub fn is_terminal(&self) -> bool {
		matches!(self, BotError::SurfaceLost(_) | BotError::Cancelled)
	}
}

impl From<CdpError> for BotError {
	fn from(err: CdpError) -> Self {
		if err.is_fatal() {
			BotError::SurfaceLost(err.to_string())
		} else {
			BotError::Backend(err.to_string())
		}
	}
}

pub type Result<T> = std::result::Result<T, BotError>;
