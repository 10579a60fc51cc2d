//! Meeting reference parsing.

use serde::{Deserialize, Serialize};
use url::Url;

/// Host serving the browser-based join page.
pub const WEB_CLIENT_HOST: &str = "zoom.us";

/// Query parameter carrying the meeting access secret.
pub const SECRET_QUERY_KEY: &str = "pwd";

/// A meeting reference resolved from a user-supplied invitation URL.
///
/// Parsing is total: every input produces a value. A URL without a path
/// segment yields an empty `meeting_id`, and a missing or blank secret is
/// `None` (never `Some("")`), which tells the join workflow to skip the
/// secret-entry step entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRef {
	/// The URL exactly as supplied.
	pub source_url: String,
	/// Browser join page derived from the source URL.
	pub join_url: String,
	/// Last path segment of the source URL.
	pub meeting_id: String,
	/// First non-empty `pwd` query value.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_secret: Option<String>,
}

impl MeetingRef {
	/// Parses an invitation URL.
	pub fn parse(input: &str) -> Self {
		let trimmed = input.trim();
		match Url::parse(trimmed) {
			Ok(url) => Self::from_url(trimmed, &url),
			Err(_) => Self::from_raw(trimmed),
		}
	}

	/// Returns `true` when the reference carries an access secret.
	pub fn has_secret(&self) -> bool {
		self.access_secret.is_some()
	}

	fn from_url(source: &str, url: &Url) -> Self {
		let meeting_id = last_segment(url.path()).to_string();
		let access_secret = url
			.query_pairs()
			.filter(|(key, _)| key == SECRET_QUERY_KEY)
			.map(|(_, value)| value.into_owned())
			.find(|value| !value.is_empty());

		let mut join = url.clone();
		join.set_fragment(None);
		join.set_path(&format!("/wc/join/{meeting_id}"));
		let join_url = match join.set_host(Some(WEB_CLIENT_HOST)) {
			Ok(()) => join.to_string(),
			Err(_) => web_join_url("https", &meeting_id, url.query()),
		};

		Self {
			source_url: source.to_string(),
			join_url,
			meeting_id,
			access_secret,
		}
	}

	fn from_raw(source: &str) -> Self {
		let without_fragment = source.split('#').next().unwrap_or_default();
		let path = without_fragment.split('?').next().unwrap_or_default();
		let meeting_id = last_segment(path).to_string();

		Self {
			source_url: source.to_string(),
			join_url: web_join_url("https", &meeting_id, None),
			meeting_id,
			access_secret: None,
		}
	}
}

impl std::fmt::Display for MeetingRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.access_secret {
			Some(_) => write!(f, "{} (secret: present)", self.meeting_id),
			None => write!(f, "{} (secret: absent)", self.meeting_id),
		}
	}
}

fn last_segment(path: &str) -> &str {
	path.rsplit('/').next().unwrap_or_default()
}

fn web_join_url(scheme: &str, meeting_id: &str, query: Option<&str>) -> String {
	match query {
		Some(query) => format!("{scheme}://{WEB_CLIENT_HOST}/wc/join/{meeting_id}?{query}"),
		None => format!("{scheme}://{WEB_CLIENT_HOST}/wc/join/{meeting_id}"),
	}
}
