//! Per-session diagnostics directory: step snapshots and working-state archives.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::locator::Snapshot;

/// Where diagnostics go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
	/// Parent of the per-session directories.
	pub root: PathBuf,
	/// Client working state copied out when a mandatory join step fails.
	pub working_state_dir: Option<PathBuf>,
	/// Fixed destination for that copy.
	pub recovery_dir: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
	fn default() -> Self {
		Self {
			root: std::env::temp_dir().join("meetbot"),
			working_state_dir: None,
			recovery_dir: None,
		}
	}
}

/// Files written for one capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
	pub image: Option<PathBuf>,
	pub html: Option<PathBuf>,
	/// Milliseconds since the Unix epoch.
	pub taken_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
	dir: PathBuf,
	working_state_dir: Option<PathBuf>,
	recovery_dir: Option<PathBuf>,
}

impl Diagnostics {
	/// Creates `<root>/<session_id>`.
	pub fn create(config: &DiagnosticsConfig, session_id: &str) -> io::Result<Self> {
		let dir = config.root.join(session_id);
		fs::create_dir_all(&dir)?;
		Ok(Self {
			dir,
			working_state_dir: config.working_state_dir.clone(),
			recovery_dir: config.recovery_dir.clone(),
		})
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Writes `<dir>/<step>.png` and `<dir>/<step>.html` for whichever parts the snapshot has.
	pub fn write_snapshot(&self, step: &str, snapshot: &Snapshot) -> io::Result<Capture> {
		let stem = file_stem(step);
		let mut capture = Capture {
			taken_at_ms: now_ms(),
			..Capture::default()
		};

		if let Some(image) = &snapshot.image {
			let path = self.dir.join(format!("{stem}.png"));
			fs::write(&path, image)?;
			capture.image = Some(path);
		}
		if let Some(html) = &snapshot.html {
			let path = self.dir.join(format!("{stem}.html"));
			fs::write(&path, html)?;
			capture.html = Some(path);
		}

		info!(
			target = "meetbot.session",
			step,
			taken_at_ms = capture.taken_at_ms,
			dir = %self.dir.display(),
			"captured snapshot"
		);
		Ok(capture)
	}

	/// Copies the working-state directory to the recovery directory.
	///
	/// Returns `Ok(None)` when either path is unset or the working state does
	/// not exist.
	pub fn archive_working_state(&self) -> io::Result<Option<PathBuf>> {
		let (Some(source), Some(dest)) = (&self.working_state_dir, &self.recovery_dir) else {
			return Ok(None);
		};
		if !source.is_dir() {
			warn!(target = "meetbot.session", source = %source.display(), "working state directory missing; nothing archived");
			return Ok(None);
		}

		copy_dir_recursive(source, dest)?;
		info!(target = "meetbot.session", source = %source.display(), dest = %dest.display(), "archived working state");
		Ok(Some(dest.clone()))
	}
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
	fs::create_dir_all(dest)?;
	for entry in fs::read_dir(source)? {
		let entry = entry?;
		let path = entry.path();
		let target = dest.join(entry.file_name());
		if entry.file_type()?.is_dir() {
			copy_dir_recursive(&path, &target)?;
		} else {
			fs::copy(&path, &target)?;
		}
	}
	Ok(())
}

fn file_stem(step: &str) -> String {
	let stem: String = step
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect();
	if stem.is_empty() { "snapshot".to_string() } else { stem }
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}
