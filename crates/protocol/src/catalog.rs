//! Target catalogs: every element the engine looks for, grouped by role.
//!
//! Two defaults ship with the crate: [`TargetCatalog::web`] for the browser
//! client (CSS selectors and visible text) and [`TargetCatalog::desktop`] for
//! the native client (reference images). Both are plain data and can be
//! replaced through configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::target::Target;

/// Attempt budget for steps the join cannot proceed without.
pub const MANDATORY_ATTEMPTS: u32 = 30;

/// Attempt budget for optional prompts that may never appear.
pub const OPTIONAL_ATTEMPTS: u32 = 5;

/// Attempt budget for menu entries that should appear right after the menu opens.
pub const MENU_ATTEMPTS: u32 = 3;

/// Role-indexed set of UI targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCatalog {
	/// Entry point that reveals the join form (native client only).
	#[serde(default)]
	pub open_join_form: Option<Target>,
	/// Field receiving the meeting identifier (native client only).
	#[serde(default)]
	pub meeting_id_input: Option<Target>,
	#[serde(default)]
	pub accept_cookies: Option<Target>,
	#[serde(default)]
	pub agree_terms: Option<Target>,
	pub name_input: Target,
	pub join_button: Target,
	pub secret_input: Target,
	#[serde(default)]
	pub secret_submit: Option<Target>,
	pub join_audio: Target,
	pub waiting_room: Target,
	/// Dismiss buttons, tried in order.
	#[serde(default)]
	pub banners: Vec<Target>,
	pub view_menu: Target,
	/// Preferred layouts, tried in order.
	#[serde(default)]
	pub view_options: Vec<Target>,
	#[serde(default)]
	pub more_controls: Option<Target>,
	#[serde(default)]
	pub stop_incoming_video: Option<Target>,
	#[serde(default)]
	pub mute_microphone: Option<Target>,
	pub chat_button: Target,
	pub chat_input: Target,
}

impl TargetCatalog {
	/// Selectors for the browser-based client.
	pub fn web() -> Self {
		Self {
			open_join_form: None,
			meeting_id_input: None,
			accept_cookies: Some(Target::selector("accept_cookies", "button#onetrust-accept-btn-handler").with_attempts(OPTIONAL_ATTEMPTS)),
			agree_terms: Some(Target::selector("agree_terms", "button#wc_agree1").with_attempts(OPTIONAL_ATTEMPTS)),
			name_input: Target::selector("name_input", "input#input-for-name").with_attempts(MANDATORY_ATTEMPTS),
			join_button: Target::selector("join_button", "button.preview-join-button").with_attempts(MANDATORY_ATTEMPTS),
			secret_input: Target::selector("secret_input", "input#input-for-pwd").with_attempts(OPTIONAL_ATTEMPTS),
			secret_submit: Some(Target::selector("secret_submit", "button.preview-join-button").with_attempts(OPTIONAL_ATTEMPTS)),
			join_audio: Target::text_in("join_audio", "Join Audio by Computer", "button").with_attempts(MANDATORY_ATTEMPTS),
			waiting_room: Target::text("waiting_room", "Please wait, the meeting host will let you in soon.").with_attempts(1),
			banners: vec![
				Target::text_in("banner_ok", "OK", "button").exact().with_attempts(1),
				Target::text_in("banner_allow", "Allow", "button").exact().with_attempts(1),
				Target::text_in("banner_got_it", "Got it", "button").exact().with_attempts(1),
			],
			view_menu: Target::selector("view_menu", "button[aria-label^='View']").with_attempts(1),
			view_options: vec![
				Target::selector("gallery_view", "a[aria-label^='Gallery View']").with_attempts(MENU_ATTEMPTS),
				Target::selector("side_by_side_gallery", "a[aria-label^='Side-by-side: Gallery']").with_attempts(MENU_ATTEMPTS),
			],
			more_controls: Some(Target::selector("more_controls", "button[aria-label^='More meeting control']").with_attempts(1)),
			stop_incoming_video: Some(Target::selector("stop_incoming_video", "a[aria-label^='Stop Incoming Video']").with_attempts(MENU_ATTEMPTS)),
			mute_microphone: Some(Target::selector("mute_microphone", "button[aria-label^='mute my microphone']").with_attempts(OPTIONAL_ATTEMPTS)),
			chat_button: Target::selector("chat_button", "button[aria-label^='open the chat panel']").with_attempts(1),
			chat_input: Target::selector("chat_input", "div[contenteditable='true']").with_attempts(MENU_ATTEMPTS),
		}
	}

	/// Reference images for the native client, resolved as `<dir>/<name>.png`.
	pub fn desktop(images: &Path) -> Self {
		let image = |name: &str| Target::template(name, images.join(format!("{name}.png")));

		Self {
			open_join_form: Some(image("join_meeting").with_attempts(MANDATORY_ATTEMPTS)),
			meeting_id_input: Some(image("join_meeting_form").with_attempts(MANDATORY_ATTEMPTS)),
			accept_cookies: None,
			agree_terms: Some(image("i_agree").with_attempts(MANDATORY_ATTEMPTS)),
			name_input: image("name_input").with_attempts(MANDATORY_ATTEMPTS),
			join_button: image("join").with_attempts(MANDATORY_ATTEMPTS),
			secret_input: image("password_form").with_attempts(MANDATORY_ATTEMPTS),
			secret_submit: Some(image("join").with_attempts(OPTIONAL_ATTEMPTS)),
			join_audio: image("join_with_computer_audio").with_attempts(MANDATORY_ATTEMPTS),
			waiting_room: image("wait_room").with_attempts(1),
			banners: vec![
				image("ok").with_attempts(1),
				image("got_it").with_attempts(1),
				image("i_agree").with_attempts(1),
			],
			view_menu: image("view").with_attempts(1),
			view_options: vec![
				image("gallery_view").with_attempts(MENU_ATTEMPTS),
				image("side_by_side_speaker").with_attempts(MENU_ATTEMPTS),
			],
			more_controls: None,
			stop_incoming_video: None,
			mute_microphone: None,
			chat_button: image("chat_icon").with_attempts(MENU_ATTEMPTS),
			chat_input: image("message_here").with_attempts(1),
		}
	}

	/// Iterates every target in the catalog.
	pub fn iter(&self) -> impl Iterator<Item = &Target> {
		[
			self.open_join_form.as_ref(),
			self.meeting_id_input.as_ref(),
			self.accept_cookies.as_ref(),
			self.agree_terms.as_ref(),
			Some(&self.name_input),
			Some(&self.join_button),
			Some(&self.secret_input),
			self.secret_submit.as_ref(),
			Some(&self.join_audio),
			Some(&self.waiting_room),
			Some(&self.view_menu),
			self.more_controls.as_ref(),
			self.stop_incoming_video.as_ref(),
			self.mute_microphone.as_ref(),
			Some(&self.chat_button),
			Some(&self.chat_input),
		]
		.into_iter()
		.flatten()
		.chain(self.banners.iter())
		.chain(self.view_options.iter())
	}
}

impl Default for TargetCatalog {
	fn default() -> Self {
		Self::web()
	}
}
