//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors, events)
//! - `billing` - Provider subscription snapshots, MRR and lifecycle labels
//! - `membership` - Members, subscriptions, entitlements and status

pub mod billing;
pub mod foundation;
pub mod membership;
