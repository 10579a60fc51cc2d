//! Data types shared by the meetbot engine and its front ends.
//!
//! This crate holds the pure, serde-serializable shapes the engine works
//! with: the parsed meeting reference a join starts from, and the UI target
//! descriptors a locator backend resolves against the live surface.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: parsing and construction only, no I/O
//! * Backend-neutral: a [`Target`] describes *what* to look for; backends decide *how*
//! * Replaceable: a [`TargetCatalog`] round-trips through JSON so deployments can swap layouts

pub mod catalog;
pub mod meeting;
pub mod target;

pub use catalog::*;
pub use meeting::*;
pub use target::*;
