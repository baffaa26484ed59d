//! Order lifecycle tracking.
//!
//! `state_machine` holds the per-order record and its pure transition
//! function; `triggers` maps state changes to follow-up broker calls;
//! `manager` owns the active set and runs evaluation passes.

pub mod manager;
pub mod state_machine;
pub mod triggers;
