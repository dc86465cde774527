//! Membership domain module.
//!
//! Members, their billing links and subscription records, and the pure
//! rules that keep entitlements and status consistent with billing.
//!
//! # Module Structure
//!
//! - `member` - Member entity and `MemberStatus`
//! - `subscription` - Internal mirror of an external subscription
//! - `entitlements` - Entitlement set reconciler
//! - `status` - Membership status resolution
//! - `events` - `MemberEvent` catalogue

mod customer;
mod degradation;
mod entitlements;
mod errors;
mod events;
mod member;
mod offer;
mod product;
mod status;
mod subscription;

pub use customer::CustomerLink;
pub use degradation::{Degradation, DegradationKind};
pub use entitlements::{
    diff_sets, reconcile_entitlements, EntitlementInput, EntitlementPlan, EntitlementPolicy,
    ProductChange, ProductDiff,
};
pub use errors::MembershipError;
pub use events::{MemberEvent, MemberEventKind};
pub use member::{normalize_email, Member, MemberStatus};
pub use offer::{Attribution, Offer};
pub use product::{Product, ProductFilter, ProductKind, ProductPatch, ProductSelector};
pub use status::{resolve_member_status, AccessGrant};
pub use subscription::SubscriptionRecord;
