//! In-meeting chat.

use std::sync::Arc;

use meetbot_protocol::TargetCatalog;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::locator::{Activation, Lookup};
use crate::session::{Screen, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
	Sent,
	/// The chat panel or its input could not be reached.
	NotFound,
}

pub struct Messenger {
	session: Arc<Session>,
	catalog: Arc<TargetCatalog>,
}

impl Messenger {
	pub fn new(session: Arc<Session>, catalog: Arc<TargetCatalog>) -> Self {
		Self { session, catalog }
	}

	/// Posts `text` to the meeting chat once the session is ready.
	///
	/// Holds the screen lock from opening the chat panel until it is closed
	/// again, so the whole exchange is one uninterrupted block of UI calls.
	pub async fn send_message(&self, text: &str, cancel: &CancellationToken) -> Result<Delivery> {
		self.session.wait_ready(cancel).await?;
		let screen = self.session.lock_screen().await;

		let Lookup::Found(chat) = screen.find(&self.catalog.chat_button).await? else {
			info!(target = "meetbot.messaging", "chat panel button not found");
			return Ok(Delivery::NotFound);
		};
		if screen.activate(&chat).await? == Activation::Stale {
			info!(target = "meetbot.messaging", "chat panel button went away");
			return Ok(Delivery::NotFound);
		}

		let delivery = self.write(&screen, text, cancel).await;
		match &delivery {
			Err(err) if err.is_fatal() => {}
			_ => self.close_panel(&screen).await,
		}

		let delivery = delivery?;
		match delivery {
			Delivery::Sent => info!(target = "meetbot.messaging", chars = text.chars().count(), "message sent"),
			Delivery::NotFound => info!(target = "meetbot.messaging", "chat input not found"),
		}
		Ok(delivery)
	}

	/// Sends the greeting posted once after joining.
	pub async fn send_welcome_message(&self, text: &str, cancel: &CancellationToken) -> Result<Delivery> {
		debug!(target = "meetbot.messaging", "sending welcome message");
		self.send_message(text, cancel).await
	}

	async fn write(&self, screen: &Screen<'_>, text: &str, cancel: &CancellationToken) -> Result<Delivery> {
		let input = match screen.find_and_activate(&self.catalog.chat_input, cancel).await {
			Ok(input) => input,
			Err(err) if err.is_soft() => return Ok(Delivery::NotFound),
			Err(err) => return Err(err),
		};
		screen.type_text(&input, text).await?;
		screen.press_key("Enter").await?;
		Ok(Delivery::Sent)
	}

	async fn close_panel(&self, screen: &Screen<'_>) {
		match screen.try_activate(&self.catalog.chat_button).await {
			Ok(true) => {}
			Ok(false) => debug!(target = "meetbot.messaging", "chat panel button gone before close"),
			Err(err) => warn!(target = "meetbot.messaging", error = %err, "failed to close chat panel"),
		}
	}
}
