//! Liveness probing for the conferencing application's process.
//!
//! The engine never starts or stops the application; a supervisor does. It
//! only needs to tell "the element is not there" apart from "nothing is
//! there any more", and a dead process is the unambiguous form of the latter.

use std::path::PathBuf;

/// The application process backing a UI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppProcess {
	pid: u32,
}

impl AppProcess {
	pub fn new(pid: u32) -> Self {
		Self { pid }
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	/// Returns `true` while the process is still running.
	pub fn is_alive(&self) -> bool {
		pid_is_alive(self.pid)
	}
}

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		let proc_dir = PathBuf::from("/proc");
		if proc_dir.exists() {
			return proc_dir.join(pid.to_string()).exists() && !is_zombie(&proc_dir, pid);
		}

		std::process::Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		if let Ok(output) = std::process::Command::new("tasklist").args(["/FI", &filter, "/FO", "CSV", "/NH"]).output() {
			if output.status.success() {
				let stdout = String::from_utf8_lossy(&output.stdout);
				return tasklist_has_pid(stdout.as_ref(), pid);
			}
		}

		pid == std::process::id()
	}

	#[cfg(not(any(unix, windows)))]
	{
		pid == std::process::id()
	}
}

// An exited child that nobody reaped still has a /proc entry.
#[cfg(unix)]
fn is_zombie(proc_dir: &std::path::Path, pid: u32) -> bool {
	std::fs::read_to_string(proc_dir.join(pid.to_string()).join("stat"))
		.ok()
		.and_then(|stat| stat_state(&stat))
		.is_some_and(|state| state == 'Z' || state == 'X')
}

#[cfg(any(test, unix))]
fn stat_state(stat: &str) -> Option<char> {
	// The command name is parenthesised and may itself contain spaces or parens.
	let (_, rest) = stat.rsplit_once(')')?;
	rest.trim_start().chars().next()
}

#[cfg(any(test, windows))]
fn tasklist_has_pid(output: &str, pid: u32) -> bool {
	let pid_str = pid.to_string();
	output.lines().any(|line| {
		let line = line.trim();
		if !line.starts_with('"') {
			return false;
		}

		line.trim_matches('"')
			.split("\",\"")
			.nth(1)
			.is_some_and(|field| field.trim() == pid_str.as_str())
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tasklist_parser_matches_csv_line() {
		let output = "\"zoom.exe\",\"1234\",\"Console\",\"1\",\"250,000 K\"\r\n";
		assert!(tasklist_has_pid(output, 1234));
		assert!(!tasklist_has_pid(output, 9999));
	}

	#[test]
	fn tasklist_parser_ignores_non_csv_lines() {
		let output = "INFO: No tasks are running which match the specified criteria.\r\n";
		assert!(!tasklist_has_pid(output, 1234));
	}

	#[test]
	fn stat_state_survives_odd_command_names() {
		assert_eq!(stat_state("4242 (zoom) S 1 4242"), Some('S'));
		assert_eq!(stat_state("4242 (we (ird) name) Z 1 4242"), Some('Z'));
		assert_eq!(stat_state("garbage"), None);
	}

	#[cfg(unix)]
	#[test]
	fn current_process_is_alive() {
		assert!(AppProcess::new(std::process::id()).is_alive());
	}

	#[cfg(unix)]
	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[cfg(unix)]
	#[test]
	fn reaped_child_is_reported_dead() {
		let mut child = std::process::Command::new("true").spawn().unwrap();
		let pid = child.id();
		child.wait().unwrap();
		assert!(!AppProcess::new(pid).is_alive());
	}
}
