//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod members;
pub mod subscriptions;

pub use members::{
    CreateMemberCommand, CreateMemberHandler, CreateMemberResult, DestroyMemberCommand,
    DestroyMemberHandler, DestroyMemberResult, UpdateMemberCommand, UpdateMemberHandler,
    UpdateMemberResult,
};
pub use subscriptions::{
    CancelComplimentaryCommand, CancelComplimentaryHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, GetSubscriptionHandler, GetSubscriptionQuery,
    LinkSubscriptionCommand, LinkSubscriptionHandler, LinkSubscriptionResult, PreparedLink,
    SetComplimentaryCommand, SetComplimentaryHandler, UpdateSubscriptionCommand,
    UpdateSubscriptionHandler,
};
