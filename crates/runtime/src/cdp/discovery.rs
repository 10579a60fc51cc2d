//! Page-target discovery on a remote-debugging HTTP endpoint.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{CdpError, Result};

/// `/json/list` entry subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTarget {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}

impl PageTarget {
	fn is_attachable_page(&self) -> bool {
		self.kind == "page" && self.web_socket_debugger_url.is_some() && !self.url.starts_with("devtools://")
	}
}

fn http_client() -> Result<reqwest::Client> {
	reqwest::Client::builder()
		.timeout(Duration::from_secs(2))
		.build()
		.map_err(|e| CdpError::Discovery(format!("failed to create HTTP client: {e}")))
}

fn endpoint_url(endpoint: &str, path: &str) -> Result<Url> {
	let base = Url::parse(endpoint).map_err(|e| CdpError::Discovery(format!("invalid endpoint {endpoint}: {e}")))?;
	base.join(path)
		.map_err(|e| CdpError::Discovery(format!("invalid endpoint {endpoint}: {e}")))
}

/// Lists attachable page targets on an `http://host:port` debugging endpoint.
pub async fn list_page_targets(endpoint: &str) -> Result<Vec<PageTarget>> {
	let url = endpoint_url(endpoint, "/json/list")?;
	let response = http_client()?
		.get(url.clone())
		.send()
		.await
		.map_err(|e| CdpError::Discovery(format!("GET {url}: {e}")))?;

	if !response.status().is_success() {
		return Err(CdpError::Discovery(format!("GET {url}: unexpected status {}", response.status())));
	}

	let targets: Vec<PageTarget> = response
		.json()
		.await
		.map_err(|e| CdpError::Discovery(format!("failed to parse {url}: {e}")))?;
	Ok(targets.into_iter().filter(PageTarget::is_attachable_page).collect())
}

async fn open_page_target(endpoint: &str) -> Result<PageTarget> {
	let url = endpoint_url(endpoint, "/json/new?about:blank")?;
	// Recent Chromium builds reject GET on /json/new.
	let response = http_client()?
		.put(url.clone())
		.send()
		.await
		.map_err(|e| CdpError::Discovery(format!("PUT {url}: {e}")))?;

	if !response.status().is_success() {
		return Err(CdpError::Discovery(format!("PUT {url}: unexpected status {}", response.status())));
	}

	response
		.json()
		.await
		.map_err(|e| CdpError::Discovery(format!("failed to parse {url}: {e}")))
}

/// Resolves an endpoint to a page websocket URL.
///
/// A `ws://`/`wss://` endpoint is taken as a page socket as-is. An HTTP
/// endpoint reuses the first open page, or opens a blank one.
pub async fn resolve_page_target(endpoint: &str) -> Result<String> {
	if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
		return Ok(endpoint.to_string());
	}

	let existing = list_page_targets(endpoint).await?;
	let target = match existing.into_iter().next() {
		Some(target) => target,
		None => open_page_target(endpoint).await?,
	};

	debug!(target = "meetbot.cdp", id = %target.id, url = %target.url, "attaching to page target");
	target
		.web_socket_debugger_url
		.ok_or_else(|| CdpError::Discovery(format!("page target {} has no websocket URL", target.id)))
}
