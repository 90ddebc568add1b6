//! Email-driven event-booking workflow orchestration kernel (SPEC_FULL.md).
//!
//! A turn enters through [`turn_runner::TurnRunner::run_turn`], is classified,
//! routed through [`dispatcher::run_dispatch`] across the seven booking
//! steps in [`steps`], and persisted by [`persistence`]. The `api` module is
//! the only part of this crate that knows it is being reached over HTTP.

pub mod api;
pub mod audit;
pub mod candidate_dates;
pub mod capture;
pub mod catalog;
pub mod change_detector;
pub mod classify;
pub mod config;
pub mod confirmation_gate;
pub mod dispatcher;
pub mod error;
pub mod hil;
pub mod migrations;
pub mod persistence;
pub mod site_visit;
pub mod steps;
pub mod turn_runner;
pub mod types;
pub mod util;

pub use config::KernelConfig;
pub use error::{ApiError, KernelError};
pub use turn_runner::TurnRunner;
pub use types::{Database, DraftMessage, InboundMessage, TurnResult};
