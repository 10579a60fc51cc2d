//! DOM backend: structural queries against a Chromium page over DevTools.
//!
//! Located elements are parked in a page-side registry keyed by a numeric id,
//! so a handle survives between calls without holding a remote object. A
//! navigation wipes the registry, which makes old handles read as stale.

use std::time::Duration;

use async_trait::async_trait;
use meetbot_protocol::{Locate, Target};
use meetbot_runtime::CdpPage;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Activation, ElementHandle, ElementLocator, HandleToken, Lookup, Snapshot};
use crate::error::{BotError, Result};

const REGISTRY: &str = "(window.__meetbot || (window.__meetbot = { next: 1, nodes: new Map() }))";

const LOAD_POLLS: u32 = 60;
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);
const SWEEP_STEPS: u32 = 12;

pub struct DomLocator {
	page: CdpPage,
}

impl DomLocator {
	pub fn new(page: CdpPage) -> Self {
		Self { page }
	}

	/// Attaches to the first page of the browser behind `endpoint`.
	pub async fn attach(endpoint: &str) -> Result<Self> {
		Ok(Self::new(CdpPage::attach(endpoint).await?))
	}

	async fn eval(&self, script: &str) -> Result<Value> {
		Ok(self.page.evaluate(script).await?)
	}

	async fn wait_for_load(&self) {
		for _ in 0..LOAD_POLLS {
			match self.page.evaluate("document.readyState").await {
				Ok(Value::String(state)) if state == "complete" => return,
				Err(err) if err.is_fatal() => return,
				_ => tokio::time::sleep(LOAD_POLL_INTERVAL).await,
			}
		}
		debug!(target = "meetbot.cdp", "page still loading; continuing");
	}
}

fn js_string(value: &str) -> Result<String> {
	Ok(serde_json::to_string(value)?)
}

/// Expression yielding the candidate elements for `locate`, best first.
fn candidates_expr(locate: &Locate) -> Result<Option<String>> {
	Ok(match locate {
		Locate::Selector { selector } => Some(format!("Array.from(document.querySelectorAll({}))", js_string(selector)?)),
		Locate::Text { text, tag, exact } => {
			let tag = js_string(tag.as_deref().unwrap_or("*"))?;
			let text = js_string(text)?;
			let fallback = if *exact {
				"return [];"
			} else {
				"return nodes.filter((n) => label(n).includes(want)).sort((a, b) => label(a).length - label(b).length);"
			};
			Some(format!(
				"(() => {{
					const want = {text};
					const label = (n) => (n.innerText || n.value || '').trim();
					const nodes = Array.from(document.querySelectorAll({tag}));
					const exact = nodes.filter((n) => label(n) === want);
					if (exact.length) return exact.filter((n) => !exact.some((m) => m !== n && n.contains(m)));
					{fallback}
				}})()"
			))
		}
		Locate::Template { .. } => None,
	})
}

fn find_script(locate: &Locate) -> Result<Option<String>> {
	let Some(candidates) = candidates_expr(locate)? else {
		return Ok(None);
	};
	Ok(Some(format!(
		"(() => {{
			const reg = {REGISTRY};
			const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
			const el = {candidates}.find(visible);
			if (!el) return 0;
			if (reg.nodes.size > 256) reg.nodes.clear();
			const id = reg.next++;
			reg.nodes.set(id, el);
			return id;
		}})()"
	)))
}

fn node_script(id: u64, body: &str) -> String {
	format!(
		"(() => {{
			const reg = window.__meetbot;
			const el = reg && reg.nodes.get({id});
			if (!el || !el.isConnected) return false;
			{body}
			return true;
		}})()"
	)
}

fn node_id(handle: &ElementHandle) -> Result<u64> {
	match handle.token {
		HandleToken::Node(id) => Ok(id),
		_ => Err(BotError::Backend(format!("handle for {} did not come from the DOM backend", handle.target))),
	}
}

#[async_trait]
impl ElementLocator for DomLocator {
	fn backend(&self) -> &'static str {
		"dom"
	}

	async fn open(&self, url: &str) -> Result<()> {
		self.page.navigate(url).await?;
		self.wait_for_load().await;
		Ok(())
	}

	async fn find(&self, target: &Target) -> Result<Lookup> {
		let Some(script) = find_script(&target.locate)? else {
			return Err(BotError::Backend(format!("DOM backend cannot resolve {target}")));
		};
		let id = self.eval(&script).await?.as_u64().unwrap_or(0);
		if id == 0 {
			return Ok(Lookup::NotFound);
		}
		Ok(Lookup::Found(ElementHandle {
			target: target.name.clone(),
			token: HandleToken::Node(id),
		}))
	}

	async fn activate(&self, handle: &ElementHandle) -> Result<Activation> {
		let script = node_script(
			node_id(handle)?,
			"el.scrollIntoView({ block: 'center', inline: 'center' });
			if (typeof el.focus === 'function') el.focus();
			el.click();",
		);
		Ok(match self.eval(&script).await? {
			Value::Bool(true) => Activation::Activated,
			_ => Activation::Stale,
		})
	}

	async fn type_text(&self, handle: &ElementHandle, text: &str) -> Result<()> {
		let script = node_script(node_id(handle)?, "if (typeof el.focus === 'function') el.focus();");
		if self.eval(&script).await? != Value::Bool(true) {
			return Err(BotError::ActivationFailed {
				target: handle.target.clone(),
			});
		}
		Ok(self.page.insert_text(text).await?)
	}

	async fn press_key(&self, key: &str) -> Result<()> {
		Ok(self.page.press_key(key).await?)
	}

	async fn snapshot(&self) -> Result<Snapshot> {
		let image = match self.page.screenshot_png().await {
			Ok(image) => Some(image),
			Err(err) if err.is_fatal() => return Err(err.into()),
			Err(err) => {
				warn!(target = "meetbot.cdp", error = %err, "screenshot failed");
				None
			}
		};
		let html = match self.page.evaluate("document.documentElement.outerHTML").await {
			Ok(Value::String(html)) => Some(html),
			Ok(_) => None,
			Err(err) if err.is_fatal() => return Err(err.into()),
			Err(err) => {
				warn!(target = "meetbot.cdp", error = %err, "DOM dump failed");
				None
			}
		};
		Ok(Snapshot { image, html })
	}

	async fn enter_fullscreen(&self) -> Result<()> {
		self.eval(
			"(async () => {
				if (!document.fullscreenElement) await document.documentElement.requestFullscreen();
				return true;
			})()",
		)
		.await
		.map(|_| ())
	}

	async fn sweep_pointer(&self) -> Result<()> {
		let (width, height) = self.page.viewport().await?;
		let y = height / 2.0;
		for step in 0..=SWEEP_STEPS {
			let x = (width - 1.0).max(0.0) * f64::from(step) / f64::from(SWEEP_STEPS);
			self.page.mouse_move(x, y).await?;
		}
		Ok(())
	}

	async fn click_centre(&self) -> Result<()> {
		let (width, height) = self.page.viewport().await?;
		Ok(self.page.mouse_click(width / 2.0, height / 2.0).await?)
	}

	async fn close(&self) -> Result<()> {
		Ok(self.page.close().await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn selector_is_embedded_as_a_js_string_literal() {
		let script = find_script(&Locate::Selector {
			selector: "a[aria-label^='Gallery View']".into(),
		})
		.unwrap()
		.unwrap();
		assert!(script.contains(r#"document.querySelectorAll("a[aria-label^='Gallery View']")"#));
		assert!(script.contains("reg.nodes.set(id, el)"));
	}

	#[test]
	fn text_lookup_escapes_quotes_and_defaults_to_any_tag() {
		let script = find_script(&Locate::Text {
			text: r#"Say "hi""#.into(),
			tag: None,
			exact: false,
		})
		.unwrap()
		.unwrap();
		assert!(script.contains(r#"const want = "Say \"hi\"";"#));
		assert!(script.contains(r#"querySelectorAll("*")"#));
		assert!(script.contains("label(n).includes(want)"));
	}

	#[test]
	fn exact_text_lookup_never_falls_back_to_substrings() {
		let script = find_script(&Locate::Text {
			text: "OK".into(),
			tag: Some("button".into()),
			exact: true,
		})
		.unwrap()
		.unwrap();
		assert!(script.contains(r#"querySelectorAll("button")"#));
		assert!(script.contains("label(n) === want"));
		assert!(!script.contains("includes"));
	}

	#[test]
	fn templates_have_no_dom_query() {
		assert!(find_script(&Locate::Template { image: "/x.png".into() }).unwrap().is_none());
	}

	#[test]
	fn node_scripts_report_disconnected_elements() {
		let script = node_script(42, "el.click();");
		assert!(script.contains("reg.nodes.get(42)"));
		assert!(script.contains("!el.isConnected) return false"));
	}

	#[test]
	fn foreign_handles_are_rejected() {
		let handle = ElementHandle {
			target: "ok".into(),
			token: HandleToken::Point {
				x: 1,
				y: 2,
				image: "/ok.png".into(),
			},
		};
		assert!(node_id(&handle).is_err());
	}
}
