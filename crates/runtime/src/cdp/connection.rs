//! JSON-RPC correlation over a DevTools websocket.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`CdpConnection::send`] with a method and params
//! 2. The connection allocates an id and parks a oneshot sender under it
//! 3. The writer task serializes the request onto the socket
//! 4. The reader task matches the response `id` and completes the oneshot
//! 5. Messages without an `id` are protocol events and are only traced
//!
//! When the socket ends every parked request resolves to
//! [`CdpError::ConnectionClosed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::{CdpError, Result};

type Callbacks = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

#[derive(Debug, Deserialize)]
struct Incoming {
	id: Option<u64>,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ProtocolError>,
	#[serde(default)]
	method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtocolError {
	code: i64,
	message: String,
}

/// A live DevTools websocket with request/response correlation.
///
/// Cheap to share behind `Arc`; concurrent requests are supported.
pub struct CdpConnection {
	last_id: AtomicU64,
	callbacks: Callbacks,
	outbound: mpsc::UnboundedSender<(String, Value)>,
	closed: Arc<AtomicBool>,
}

impl CdpConnection {
	/// Connects to a websocket debugger URL and spawns the reader/writer tasks.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (stream, _) = tokio_tungstenite::connect_async(ws_url)
			.await
			.map_err(|e| CdpError::Transport(format!("connect {ws_url}: {e}")))?;
		let (mut sink, mut source) = stream.split();

		let callbacks: Callbacks = Arc::new(Mutex::new(HashMap::new()));
		let closed = Arc::new(AtomicBool::new(false));
		let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<(String, Value)>();

		let writer_callbacks = Arc::clone(&callbacks);
		tokio::spawn(async move {
			while let Some((method, request)) = outbound_rx.recv().await {
				let id = request["id"].as_u64();
				if let Err(err) = sink.send(Message::Text(request.to_string().into())).await {
					warn!(target = "meetbot.cdp", %method, error = %err, "failed to write request");
					if let Some(tx) = id.and_then(|id| writer_callbacks.lock().remove(&id)) {
						let _ = tx.send(Err(CdpError::Transport(err.to_string())));
					}
				}
			}
			let _ = sink.close().await;
		});

		let reader_callbacks = Arc::clone(&callbacks);
		let reader_closed = Arc::clone(&closed);
		tokio::spawn(async move {
			while let Some(frame) = source.next().await {
				let text = match frame {
					Ok(Message::Text(text)) => text.to_string(),
					Ok(Message::Close(_)) => break,
					Ok(_) => continue,
					Err(err) => {
						debug!(target = "meetbot.cdp", error = %err, "websocket read failed");
						break;
					}
				};
				dispatch(&reader_callbacks, &text);
			}

			reader_closed.store(true, Ordering::SeqCst);
			// Dropping the parked senders resolves every waiter with ConnectionClosed.
			reader_callbacks.lock().clear();
			debug!(target = "meetbot.cdp", "connection closed");
		});

		Ok(Self {
			last_id: AtomicU64::new(1),
			callbacks,
			outbound,
			closed,
		})
	}

	/// Sends `method` with `params` and waits for the correlated response.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(CdpError::ConnectionClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		if self.is_closed() {
			self.callbacks.lock().remove(&id);
			return Err(CdpError::ConnectionClosed);
		}

		let request = json!({ "id": id, "method": method, "params": params });
		trace!(target = "meetbot.cdp", id, %method, "send");
		if self.outbound.send((method.to_string(), request)).is_err() {
			self.callbacks.lock().remove(&id);
			return Err(CdpError::ConnectionClosed);
		}

		match rx.await {
			Ok(Ok(result)) => Ok(result),
			Ok(Err(CdpError::Protocol { code, message, .. })) => Err(CdpError::Protocol {
				method: method.to_string(),
				code,
				message,
			}),
			Ok(Err(err)) => Err(err),
			Err(_) => Err(CdpError::ConnectionClosed),
		}
	}

	/// Returns `true` once the socket has ended.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

fn dispatch(callbacks: &Callbacks, text: &str) {
	let incoming: Incoming = match serde_json::from_str(text) {
		Ok(incoming) => incoming,
		Err(err) => {
			warn!(target = "meetbot.cdp", error = %err, "unparseable frame");
			return;
		}
	};

	let Some(id) = incoming.id else {
		if let Some(method) = incoming.method {
			trace!(target = "meetbot.cdp", %method, "event");
		}
		return;
	};

	let Some(tx) = callbacks.lock().remove(&id) else {
		debug!(target = "meetbot.cdp", id, "response for unknown request");
		return;
	};

	let outcome = match incoming.error {
		Some(error) => Err(CdpError::Protocol {
			method: String::new(),
			code: error.code,
			message: error.message,
		}),
		None => Ok(incoming.result.unwrap_or(Value::Null)),
	};
	let _ = tx.send(outcome);
}
