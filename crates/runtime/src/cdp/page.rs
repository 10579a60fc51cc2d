//! Page-level DevTools operations.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::debug;

use super::connection::CdpConnection;
use super::discovery::resolve_page_target;
use super::{CdpError, Result};

/// A single browser tab driven over DevTools.
#[derive(Clone)]
pub struct CdpPage {
	conn: Arc<CdpConnection>,
}

impl CdpPage {
	/// Attaches to a page on `endpoint` (HTTP debugging endpoint or page websocket URL).
	pub async fn attach(endpoint: &str) -> Result<Self> {
		let ws_url = resolve_page_target(endpoint).await?;
		let conn = CdpConnection::connect(&ws_url).await?;
		let page = Self { conn: Arc::new(conn) };
		page.conn.send("Page.enable", json!({})).await?;
		page.conn.send("Runtime.enable", json!({})).await?;
		Ok(page)
	}

	pub fn from_connection(conn: Arc<CdpConnection>) -> Self {
		Self { conn }
	}

	pub fn is_closed(&self) -> bool {
		self.conn.is_closed()
	}

	/// Navigates and returns once the navigation has committed.
	pub async fn navigate(&self, url: &str) -> Result<()> {
		debug!(target = "meetbot.cdp", %url, "navigate");
		let result = self.conn.send("Page.navigate", json!({ "url": url })).await?;
		match result.get("errorText").and_then(Value::as_str) {
			Some(reason) if !reason.is_empty() => Err(CdpError::Navigation {
				url: url.to_string(),
				reason: reason.to_string(),
			}),
			_ => Ok(()),
		}
	}

	/// Evaluates `expression` in the page and returns its JSON value.
	///
	/// Promises are awaited and the call counts as a user gesture, which
	/// pages require for fullscreen and media permission requests.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result = self
			.conn
			.send(
				"Runtime.evaluate",
				json!({
					"expression": expression,
					"returnByValue": true,
					"awaitPromise": true,
					"userGesture": true,
				}),
			)
			.await?;

		if let Some(details) = result.get("exceptionDetails") {
			let message = details
				.pointer("/exception/description")
				.or_else(|| details.get("text"))
				.and_then(Value::as_str)
				.unwrap_or("unknown exception");
			return Err(CdpError::Evaluation(message.to_string()));
		}

		Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
	}

	/// Captures the viewport as PNG bytes.
	pub async fn screenshot_png(&self) -> Result<Vec<u8>> {
		let result = self.conn.send("Page.captureScreenshot", json!({ "format": "png" })).await?;
		let data = result.get("data").and_then(Value::as_str).unwrap_or_default();
		STANDARD
			.decode(data)
			.map_err(|e| CdpError::Evaluation(format!("screenshot payload is not base64: {e}")))
	}

	/// Inserts text at the focused element as if typed.
	pub async fn insert_text(&self, text: &str) -> Result<()> {
		self.conn.send("Input.insertText", json!({ "text": text })).await.map(|_| ())
	}

	/// Presses and releases a named key (`Enter`, `Tab`, `Escape`, ...).
	pub async fn press_key(&self, key: &str) -> Result<()> {
		let (code, text) = key_definition(key);
		let mut down = json!({ "type": "keyDown", "key": key, "code": key, "windowsVirtualKeyCode": code });
		if let Some(text) = text {
			down["text"] = json!(text);
		}
		self.conn.send("Input.dispatchKeyEvent", down).await?;
		self.conn
			.send(
				"Input.dispatchKeyEvent",
				json!({ "type": "keyUp", "key": key, "code": key, "windowsVirtualKeyCode": code }),
			)
			.await
			.map(|_| ())
	}

	/// Moves the mouse pointer to viewport coordinates.
	pub async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
		self.conn
			.send("Input.dispatchMouseEvent", json!({ "type": "mouseMoved", "x": x, "y": y }))
			.await
			.map(|_| ())
	}

	/// Left-clicks at viewport coordinates.
	pub async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
		for kind in ["mousePressed", "mouseReleased"] {
			self.conn
				.send(
					"Input.dispatchMouseEvent",
					json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
				)
				.await?;
		}
		Ok(())
	}

	/// Returns the viewport size in CSS pixels.
	pub async fn viewport(&self) -> Result<(f64, f64)> {
		let value = self.evaluate("[window.innerWidth, window.innerHeight]").await?;
		let width = value.get(0).and_then(Value::as_f64).unwrap_or(0.0);
		let height = value.get(1).and_then(Value::as_f64).unwrap_or(0.0);
		Ok((width, height))
	}

	/// Closes the tab.
	pub async fn close(&self) -> Result<()> {
		match self.conn.send("Page.close", json!({})).await {
			Ok(_) | Err(CdpError::ConnectionClosed) => Ok(()),
			Err(err) => Err(err),
		}
	}
}

fn key_definition(key: &str) -> (u32, Option<&'static str>) {
	match key {
		"Enter" => (13, Some("\r")),
		"Tab" => (9, None),
		"Escape" => (27, None),
		"Backspace" => (8, None),
		"Space" | " " => (32, Some(" ")),
		"F11" => (122, None),
		_ => (0, None),
	}
}
