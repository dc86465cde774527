//! Member store port - transactional persistence for members.
//!
//! All writes go through a [`MemberUnitOfWork`]. A unit of work holds the
//! row locks it acquired until `commit` or `rollback`, so two reconciliations
//! of the same member are totally ordered. Nothing written through a unit of
//! work is visible to readers before `commit`.
//!
//! # Example
//!
//! ```ignore
//! let mut uow = store.begin().await?;
//! let member = uow.lock_member(&member_id).await?;
//! uow.save_member_state(&member.id, MemberStatus::Paid, Some(&products)).await?;
//! uow.commit().await?;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, MemberId, ProductId, SubscriptionRecordId};
use crate::domain::membership::{CustomerLink, Member, MemberStatus, SubscriptionRecord};

/// Result of upserting a subscription row by external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The row existed; holds its state before the update.
    Updated { previous: SubscriptionRecord },
}

/// Entry point: starts units of work and serves unlocked reads.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Start a new unit of work (a database transaction).
    async fn begin(&self) -> Result<Box<dyn MemberUnitOfWork>, DomainError>;

    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, DomainError>;

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, DomainError>;

    async fn find_subscription(
        &self,
        id: &SubscriptionRecordId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    async fn find_subscription_by_external_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    async fn subscriptions_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError>;

    async fn customers_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError>;

    async fn member_products(&self, member_id: &MemberId) -> Result<Vec<ProductId>, DomainError>;
}

/// One transaction against the member store.
///
/// Dropping a unit of work without committing discards its writes.
#[async_trait]
pub trait MemberUnitOfWork: Send {
    /// Load a member and hold an exclusive lock on it.
    ///
    /// Locking a member already locked by this unit of work is a no-op.
    ///
    /// # Errors
    ///
    /// - `MemberNotFound` if the member doesn't exist
    async fn lock_member(&mut self, id: &MemberId) -> Result<Member, DomainError>;

    async fn find_member_by_email(&mut self, email: &str) -> Result<Option<Member>, DomainError>;

    /// Insert a new member; the new row is locked by this unit of work.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the email is taken
    async fn insert_member(&mut self, member: &Member) -> Result<(), DomainError>;

    /// Update email, name, status and newsletters of a locked member.
    async fn update_member(&mut self, member: &Member) -> Result<(), DomainError>;

    /// Delete a locked member and everything it owns.
    async fn delete_member(&mut self, id: &MemberId) -> Result<(), DomainError>;

    async fn find_customer(&mut self, customer_id: &str)
        -> Result<Option<CustomerLink>, DomainError>;

    async fn customers_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError>;

    /// # Errors
    ///
    /// - `Conflict` if the customer is linked to another member
    async fn insert_customer(&mut self, link: &CustomerLink) -> Result<(), DomainError>;

    async fn update_customer_email(
        &mut self,
        customer_id: &str,
        email: &str,
    ) -> Result<(), DomainError>;

    async fn subscriptions_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError>;

    async fn find_subscription(
        &mut self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Insert or update a subscription keyed by its external id.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the external id belongs to another member
    async fn upsert_subscription(
        &mut self,
        record: &SubscriptionRecord,
    ) -> Result<UpsertOutcome, DomainError>;

    async fn member_products(&mut self, member_id: &MemberId)
        -> Result<Vec<ProductId>, DomainError>;

    /// Write a member's status and, when given, replace its entitlements.
    ///
    /// The two writes are atomic with respect to each other: if the
    /// entitlement write fails, the status is not written either and the
    /// unit of work stays usable for a status-only retry.
    async fn save_member_state(
        &mut self,
        member_id: &MemberId,
        status: MemberStatus,
        products: Option<&[ProductId]>,
    ) -> Result<(), DomainError>;

    /// Make all writes durable and release locks.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discard all writes and release locks.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
