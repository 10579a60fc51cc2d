//! Join an automated participant to a web video meeting and keep it there.
//!
//! The engine is layered bottom-up:
//!
//! * [`locator`]: the [`ElementLocator`] capability and its backends
//! * [`retry`]: bounded, cancellable polling on top of single lookups
//! * [`session`]: identity, the screen lock and the ready gate
//! * [`join`]: the join workflow from the join page into the meeting
//! * [`maintenance`]: the post-join tick loop keeping the UI usable
//! * [`messaging`]: posting to the meeting chat
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use meetbot::{DomLocator, JoinPolicy, MaintenanceConfig, MaintenanceLoop, Session, SessionOptions};
//! use meetbot_protocol::{MeetingRef, TargetCatalog};
//! use tokio_util::sync::CancellationToken;
//!
//! let locator = Arc::new(DomLocator::attach("http://127.0.0.1:9222").await?);
//! let session = Arc::new(Session::new(locator, SessionOptions::default())?);
//! let catalog = Arc::new(TargetCatalog::web());
//! let cancel = CancellationToken::new();
//!
//! let meeting = MeetingRef::parse("https://us02web.zoom.us/j/123456789?pwd=abc");
//! meetbot::join(&session, &catalog, &JoinPolicy::default(), &meeting, &cancel).await?;
//! MaintenanceLoop::new(session, catalog, MaintenanceConfig::default()).run(&cancel).await?;
//! ```

pub mod diagnostics;
pub mod error;
pub mod join;
pub mod locator;
pub mod maintenance;
pub mod messaging;
pub mod pool;
pub mod retry;
pub mod session;

pub use diagnostics::{Capture, Diagnostics, DiagnosticsConfig};
pub use error::{BotError, Result};
pub use join::{JoinError, JoinFailure, JoinPolicy, JoinReport, JoinStep, JoinWorkflow, StepOutcome, StepRecord, join};
pub use locator::{
	Activation, DomLocator, ElementHandle, ElementLocator, FakeSurface, HandleToken, Lookup, ScreenDriver, Snapshot, TemplateLocator,
};
pub use maintenance::{ActionOutcome, MaintenanceConfig, MaintenanceLoop, TickAction, TickRecord};
pub use messaging::{Delivery, Messenger};
pub use pool::WorkerPool;
pub use retry::RetryPolicy;
pub use session::{Participant, Screen, ScreenFlag, ScreenFlags, Session, SessionOptions};
