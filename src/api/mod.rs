//! HTTP transport adapter (SPEC_FULL.md §4.12.5, §6).
//!
//! Thin request/response shaping over `TurnRunner`/`hil`. No workflow logic
//! lives here — everything below this module already knows how to run a
//! turn; this module only knows how to get HTTP in and JSON out.

pub mod auth;
pub mod http;
pub mod tenant;

pub use http::{build_router, AppState};
