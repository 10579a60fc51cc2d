//! Runtime plumbing beneath the meetbot engine.
//!
//! * [`process`]: liveness of the conferencing application's process
//! * [`cdp`]: Chrome DevTools Protocol connection and page-target discovery

pub mod cdp;
pub mod process;

pub use cdp::{CdpError, CdpPage, PageTarget};
pub use process::AppProcess;
