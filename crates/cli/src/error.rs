use std::path::PathBuf;

use meetbot::{BotError, JoinError};
use serde_json::Value;

use crate::output::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
	#[error("invalid configuration {}: {reason}", .path.display())]
	Config { path: PathBuf, reason: String },

	#[error(transparent)]
	Bot(#[from] BotError),

	#[error(transparent)]
	Join(#[from] JoinError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Config { .. } => ErrorCode::ConfigError,
			CliError::Join(JoinError::Failed(_)) => ErrorCode::JoinFailed,
			CliError::Join(JoinError::Cancelled(_)) | CliError::Bot(BotError::Cancelled) => ErrorCode::Cancelled,
			CliError::Join(JoinError::SurfaceLost { .. }) | CliError::Bot(BotError::SurfaceLost(_)) => ErrorCode::SurfaceLost,
			CliError::Bot(BotError::Io(_)) | CliError::Io(_) => ErrorCode::IoError,
			CliError::Bot(_) => ErrorCode::BackendError,
			CliError::Json(_) | CliError::Anyhow(_) => ErrorCode::InternalError,
		}
	}

	/// Structured context for the error envelope.
	pub fn details(&self) -> Option<Value> {
		match self {
			CliError::Join(JoinError::Failed(failure)) => serde_json::to_value(failure).ok(),
			CliError::Join(JoinError::Cancelled(step)) | CliError::Join(JoinError::SurfaceLost { step, .. }) => {
				Some(serde_json::json!({ "step": step }))
			}
			_ => None,
		}
	}
}

pub type Result<T> = std::result::Result<T, CliError>;
