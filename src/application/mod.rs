//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Every mutating handler owns one unit of work and one event emitter, and
//! dispatches events only after its unit of work commits.

pub mod event_emitter;
pub mod handlers;
pub mod services;

pub use event_emitter::{complete, EventEmitter};
pub use handlers::*;
pub use services::MemberBillingServices;
