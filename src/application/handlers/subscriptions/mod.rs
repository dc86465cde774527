//! Subscription handlers.
//!
//! `LinkSubscriptionHandler` is the reconciler; the other handlers change
//! the subscription at the billing provider and then link the result.

mod cancel_complimentary;
mod cancel_subscription;
mod get_subscription;
mod link_subscription;
mod set_complimentary;
mod update_subscription;

pub use cancel_complimentary::{CancelComplimentaryCommand, CancelComplimentaryHandler};
pub use cancel_subscription::{CancelSubscriptionCommand, CancelSubscriptionHandler};
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery};
pub use link_subscription::{
    LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult, PreparedLink,
};
pub use set_complimentary::{SetComplimentaryCommand, SetComplimentaryHandler};
pub use update_subscription::{UpdateSubscriptionCommand, UpdateSubscriptionHandler};
