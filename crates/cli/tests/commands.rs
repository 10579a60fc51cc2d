use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn meetbot_binary() -> PathBuf {
	let mut path = std::env::current_exe().expect("current_exe should resolve");
	path.pop();
	path.pop();
	path.push("meetbot");
	path
}

fn run_meetbot(home: &Path, args: &[&str]) -> (bool, Value, String) {
	let output = Command::new(meetbot_binary())
		.current_dir(home)
		.env("HOME", home)
		.env("XDG_CONFIG_HOME", home.join(".config"))
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute meetbot");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let json = serde_json::from_str::<Value>(&stdout).unwrap_or_else(|_| serde_json::json!({ "raw": stdout }));
	(output.status.success(), json, stderr)
}

#[test]
fn parse_extracts_id_and_secret() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, stderr) = run_meetbot(tmp.path(), &["parse", "https://us02web.zoom.us/j/123456789?pwd=abc"]);
	assert!(success, "parse failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "parse");
	assert_eq!(json["data"]["meetingId"], "123456789");
	assert_eq!(json["data"]["accessSecret"], "abc");
	assert_eq!(json["data"]["sourceUrl"], "https://us02web.zoom.us/j/123456789?pwd=abc");
	assert!(json["durationMs"].is_u64());
}

#[test]
fn parse_without_secret_omits_it() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, stderr) = run_meetbot(tmp.path(), &["parse", "https://example.com/j/987654321"]);
	assert!(success, "parse failed: {stderr}");
	assert_eq!(json["data"]["meetingId"], "987654321");
	assert!(json["data"].get("accessSecret").is_none());
}

#[test]
fn targets_defaults_to_web_catalog() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, stderr) = run_meetbot(tmp.path(), &["targets"]);
	assert!(success, "targets failed: {stderr}");
	assert_eq!(json["data"]["nameInput"]["kind"], "selector");
	assert_eq!(json["data"]["nameInput"]["name"], "name_input");
	assert!(json["data"]["banners"].as_array().is_some_and(|b| !b.is_empty()));
}

#[test]
fn targets_desktop_uses_reference_images() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let images = tmp.path().join("elements");

	let (success, json, stderr) = run_meetbot(tmp.path(), &["targets", "--desktop", images.to_str().unwrap()]);
	assert!(success, "targets failed: {stderr}");
	assert_eq!(json["data"]["nameInput"]["kind"], "template");
	let image = json["data"]["nameInput"]["image"].as_str().unwrap_or_default();
	assert!(image.ends_with("name_input.png"), "unexpected image path {image}");
}

#[test]
fn targets_come_from_config_file() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let (_, defaults, _) = run_meetbot(tmp.path(), &["targets"]);
	let mut catalog = defaults["data"].clone();
	catalog["chatButton"]["selector"] = Value::from("button#chat");

	let config = tmp.path().join("bot.json");
	std::fs::write(&config, serde_json::json!({ "targets": catalog }).to_string()).expect("config should be written");

	let (success, json, stderr) = run_meetbot(tmp.path(), &["--config", config.to_str().unwrap(), "targets"]);
	assert!(success, "targets failed: {stderr}");
	assert_eq!(json["data"]["chatButton"]["selector"], "button#chat");
}

#[test]
fn missing_config_file_is_a_config_error() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let missing = tmp.path().join("nope.json");

	let (success, json, _) = run_meetbot(tmp.path(), &["--config", missing.to_str().unwrap(), "targets"]);
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn malformed_config_file_is_a_config_error() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("bot.json");
	std::fs::write(&config, "{ not json").expect("config should be written");

	let (success, json, _) = run_meetbot(
		tmp.path(),
		&["--config", config.to_str().unwrap(), "run", "https://example.com/j/987654321"],
	);
	assert!(!success);
	assert_eq!(json["command"], "run");
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn run_against_unreachable_browser_fails_cleanly() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, _) = run_meetbot(
		tmp.path(),
		&["run", "https://example.com/j/987654321", "--cdp-endpoint", "http://127.0.0.1:9", "--duration", "5"],
	);
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["command"], "run");
	assert_eq!(json["error"]["code"], "BACKEND_ERROR");
}
