//! Member Billing - subscription reconciliation engine
//!
//! Keeps each member's entitlements and membership status consistent with
//! the subscriptions held at the billing provider. Every write to a member
//! happens under that member's row lock inside one unit of work, and
//! `member.*` events are dispatched only after the unit of work commits.

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
