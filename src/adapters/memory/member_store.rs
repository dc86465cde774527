//! In-memory member store.
//!
//! Each unit of work stages its writes and applies them to the shared tables
//! on commit. Member locks are per-member `tokio` mutexes held as owned
//! guards by the unit of work until it is committed or dropped, so two
//! units of work touching the same member are serialized exactly as row
//! locks would serialize them.
//!
//! Uniqueness rules (member email, customer ownership, subscription
//! ownership) are checked both when a write is staged and again on commit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::domain::foundation::{
    DomainError, ErrorCode, MemberId, ProductId, SubscriptionRecordId, Timestamp,
};
use crate::domain::membership::{CustomerLink, Member, MemberStatus, SubscriptionRecord};
use crate::ports::{MemberStore, MemberUnitOfWork, UpsertOutcome};

#[derive(Debug, Clone, Default)]
struct Tables {
    members: HashMap<MemberId, Member>,
    customers: HashMap<String, CustomerLink>,
    /// Keyed by external subscription id.
    subscriptions: HashMap<String, SubscriptionRecord>,
    entitlements: HashMap<MemberId, Vec<ProductId>>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertMember(Member),
    UpdateMember(Member),
    DeleteMember(MemberId),
    InsertCustomer(CustomerLink),
    UpdateCustomerEmail { customer_id: String, email: String },
    UpsertSubscription(SubscriptionRecord),
    MemberState {
        member_id: MemberId,
        status: MemberStatus,
        products: Option<Vec<ProductId>>,
    },
}

impl Tables {
    fn apply(&mut self, write: &Write) -> Result<(), DomainError> {
        match write {
            Write::InsertMember(member) => {
                if self.members.contains_key(&member.id) {
                    return Err(conflict(format!("Member {} already exists", member.id)));
                }
                self.ensure_email_free(&member.email, &member.id)?;
                self.members.insert(member.id, member.clone());
            }
            Write::UpdateMember(member) => {
                self.ensure_email_free(&member.email, &member.id)?;
                let existing = self
                    .members
                    .get_mut(&member.id)
                    .ok_or_else(|| member_not_found(&member.id))?;
                *existing = member.clone();
            }
            Write::DeleteMember(id) => {
                self.members.remove(id);
                self.customers.retain(|_, c| c.member_id != *id);
                self.subscriptions.retain(|_, s| s.member_id != *id);
                self.entitlements.remove(id);
            }
            Write::InsertCustomer(link) => {
                if !self.members.contains_key(&link.member_id) {
                    return Err(member_not_found(&link.member_id));
                }
                if let Some(existing) = self.customers.get(&link.customer_id) {
                    if existing.member_id != link.member_id {
                        return Err(conflict(format!(
                            "Customer '{}' is linked to another member",
                            link.customer_id
                        )));
                    }
                    return Ok(());
                }
                self.customers.insert(link.customer_id.clone(), link.clone());
            }
            Write::UpdateCustomerEmail { customer_id, email } => {
                if let Some(link) = self.customers.get_mut(customer_id) {
                    link.email = Some(email.clone());
                }
            }
            Write::UpsertSubscription(record) => {
                if let Some(existing) = self.subscriptions.get(&record.subscription_id) {
                    if existing.member_id != record.member_id {
                        return Err(conflict(format!(
                            "Subscription '{}' belongs to another member",
                            record.subscription_id
                        )));
                    }
                }
                self.subscriptions
                    .insert(record.subscription_id.clone(), record.clone());
            }
            Write::MemberState {
                member_id,
                status,
                products,
            } => {
                let member = self
                    .members
                    .get_mut(member_id)
                    .ok_or_else(|| member_not_found(member_id))?;
                member.status = *status;
                member.updated_at = Timestamp::now();
                if let Some(products) = products {
                    self.entitlements.insert(*member_id, products.clone());
                }
            }
        }
        Ok(())
    }

    fn ensure_email_free(&self, email: &str, owner: &MemberId) -> Result<(), DomainError> {
        let taken = self
            .members
            .values()
            .any(|m| m.email == email && m.id != *owner);
        if taken {
            return Err(conflict(format!("Email '{}' is already in use", email)));
        }
        Ok(())
    }

    fn member_subscriptions(&self, member_id: &MemberId) -> Vec<SubscriptionRecord> {
        let mut records: Vec<SubscriptionRecord> = self
            .subscriptions
            .values()
            .filter(|s| s.member_id == *member_id)
            .cloned()
            .collect();
        records.sort_by_key(|s| (s.created_at, s.subscription_id.clone()));
        records
    }

    fn member_customers(&self, member_id: &MemberId) -> Vec<CustomerLink> {
        let mut links: Vec<CustomerLink> = self
            .customers
            .values()
            .filter(|c| c.member_id == *member_id)
            .cloned()
            .collect();
        links.sort_by_key(|c| (c.created_at, c.customer_id.clone()));
        links
    }

    fn member_by_email(&self, email: &str) -> Option<Member> {
        self.members.values().find(|m| m.email == email).cloned()
    }
}

fn conflict(message: String) -> DomainError {
    DomainError::new(ErrorCode::Conflict, message)
}

fn member_not_found(id: &MemberId) -> DomainError {
    DomainError::new(ErrorCode::MemberNotFound, format!("Member {} not found", id))
}

struct Shared {
    tables: RwLock<Tables>,
    locks: Mutex<HashMap<MemberId, Arc<tokio::sync::Mutex<()>>>>,
    fail_entitlement_writes: AtomicBool,
}

impl Shared {
    fn lock_handle(&self, id: &MemberId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .expect("InMemoryMemberStore: lock table poisoned");
        locks.entry(*id).or_default().clone()
    }
}

/// In-memory implementation of [`MemberStore`].
#[derive(Clone)]
pub struct InMemoryMemberStore {
    shared: Arc<Shared>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                fail_entitlement_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Makes every entitlement write fail with a database error until reset.
    pub fn fail_entitlement_writes(&self, fail: bool) {
        self.shared
            .fail_entitlement_writes
            .store(fail, Ordering::SeqCst);
    }

    /// Inserts a member directly, bypassing units of work.
    pub async fn seed_member(&self, member: Member) {
        self.shared
            .tables
            .write()
            .await
            .members
            .insert(member.id, member);
    }

    /// Inserts a customer link directly, bypassing units of work.
    pub async fn seed_customer(&self, link: CustomerLink) {
        self.shared
            .tables
            .write()
            .await
            .customers
            .insert(link.customer_id.clone(), link);
    }

    pub async fn member_count(&self) -> usize {
        self.shared.tables.read().await.members.len()
    }

    pub async fn subscription_count(&self) -> usize {
        self.shared.tables.read().await.subscriptions.len()
    }
}

impl Default for InMemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn begin(&self) -> Result<Box<dyn MemberUnitOfWork>, DomainError> {
        Ok(Box::new(InMemoryUnitOfWork {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            staged: Vec::new(),
        }))
    }

    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, DomainError> {
        Ok(self.shared.tables.read().await.members.get(id).cloned())
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, DomainError> {
        Ok(self.shared.tables.read().await.member_by_email(email))
    }

    async fn find_subscription(
        &self,
        id: &SubscriptionRecordId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .subscriptions
            .values()
            .find(|s| s.id == *id)
            .cloned())
    }

    async fn find_subscription_by_external_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .subscriptions
            .get(subscription_id)
            .cloned())
    }

    async fn subscriptions_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        Ok(self.shared.tables.read().await.member_subscriptions(member_id))
    }

    async fn customers_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        Ok(self.shared.tables.read().await.member_customers(member_id))
    }

    async fn member_products(&self, member_id: &MemberId) -> Result<Vec<ProductId>, DomainError> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .entitlements
            .get(member_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// One in-memory unit of work. Dropping it discards staged writes.
struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    guards: HashMap<MemberId, OwnedMutexGuard<()>>,
    staged: Vec<Write>,
}

impl InMemoryUnitOfWork {
    /// Committed tables with this unit of work's staged writes applied.
    async fn view(&self) -> Tables {
        let mut tables = self.shared.tables.read().await.clone();
        for write in &self.staged {
            // Staged writes were validated when staged
            let _ = tables.apply(write);
        }
        tables
    }

    async fn stage(&mut self, write: Write) -> Result<(), DomainError> {
        let mut view = self.view().await;
        view.apply(&write)?;
        self.staged.push(write);
        Ok(())
    }

    async fn acquire(&mut self, id: &MemberId) {
        if self.guards.contains_key(id) {
            return;
        }
        let handle = self.shared.lock_handle(id);
        let guard = handle.lock_owned().await;
        self.guards.insert(*id, guard);
    }
}

#[async_trait]
impl MemberUnitOfWork for InMemoryUnitOfWork {
    async fn lock_member(&mut self, id: &MemberId) -> Result<Member, DomainError> {
        self.acquire(id).await;
        self.view()
            .await
            .members
            .get(id)
            .cloned()
            .ok_or_else(|| member_not_found(id))
    }

    async fn find_member_by_email(&mut self, email: &str) -> Result<Option<Member>, DomainError> {
        Ok(self.view().await.member_by_email(email))
    }

    async fn insert_member(&mut self, member: &Member) -> Result<(), DomainError> {
        self.acquire(&member.id).await;
        self.stage(Write::InsertMember(member.clone())).await
    }

    async fn update_member(&mut self, member: &Member) -> Result<(), DomainError> {
        self.stage(Write::UpdateMember(member.clone())).await
    }

    async fn delete_member(&mut self, id: &MemberId) -> Result<(), DomainError> {
        if !self.view().await.members.contains_key(id) {
            return Err(member_not_found(id));
        }
        self.stage(Write::DeleteMember(*id)).await
    }

    async fn find_customer(
        &mut self,
        customer_id: &str,
    ) -> Result<Option<CustomerLink>, DomainError> {
        Ok(self.view().await.customers.get(customer_id).cloned())
    }

    async fn customers_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        Ok(self.view().await.member_customers(member_id))
    }

    async fn insert_customer(&mut self, link: &CustomerLink) -> Result<(), DomainError> {
        self.stage(Write::InsertCustomer(link.clone())).await
    }

    async fn update_customer_email(
        &mut self,
        customer_id: &str,
        email: &str,
    ) -> Result<(), DomainError> {
        self.stage(Write::UpdateCustomerEmail {
            customer_id: customer_id.to_string(),
            email: email.to_string(),
        })
        .await
    }

    async fn subscriptions_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        Ok(self.view().await.member_subscriptions(member_id))
    }

    async fn find_subscription(
        &mut self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self.view().await.subscriptions.get(subscription_id).cloned())
    }

    async fn upsert_subscription(
        &mut self,
        record: &SubscriptionRecord,
    ) -> Result<UpsertOutcome, DomainError> {
        let previous = self
            .view()
            .await
            .subscriptions
            .get(&record.subscription_id)
            .cloned();
        self.stage(Write::UpsertSubscription(record.clone())).await?;
        Ok(match previous {
            Some(previous) => UpsertOutcome::Updated { previous },
            None => UpsertOutcome::Inserted,
        })
    }

    async fn member_products(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<ProductId>, DomainError> {
        Ok(self
            .view()
            .await
            .entitlements
            .get(member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_member_state(
        &mut self,
        member_id: &MemberId,
        status: MemberStatus,
        products: Option<&[ProductId]>,
    ) -> Result<(), DomainError> {
        if products.is_some() && self.shared.fail_entitlement_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("Entitlement write failed"));
        }
        self.stage(Write::MemberState {
            member_id: *member_id,
            status,
            products: products.map(<[ProductId]>::to_vec),
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let mut tables = self.shared.tables.write().await;
        let mut next = tables.clone();
        for write in &self.staged {
            next.apply(write)?;
        }
        *tables = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{fixtures, SubscriptionStatus};
    use std::time::Duration;

    async fn store_with_member(email: &str) -> (InMemoryMemberStore, Member) {
        let store = InMemoryMemberStore::new();
        let member = Member::new(email, None).unwrap();
        store.seed_member(member.clone()).await;
        (store, member)
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let (store, member) = store_with_member("a@example.com").await;
        let product = ProductId::new();

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        uow.save_member_state(&member.id, MemberStatus::Comped, Some(&[product]))
            .await
            .unwrap();

        assert_eq!(uow.member_products(&member.id).await.unwrap(), vec![product]);
        assert!(store.member_products(&member.id).await.unwrap().is_empty());

        uow.commit().await.unwrap();

        assert_eq!(store.member_products(&member.id).await.unwrap(), vec![product]);
        let stored = store.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MemberStatus::Comped);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let (store, member) = store_with_member("a@example.com").await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_member(&member.id).await.unwrap();
            uow.save_member_state(&member.id, MemberStatus::Paid, None)
                .await
                .unwrap();
        }

        let stored = store.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MemberStatus::Free);
    }

    #[tokio::test]
    async fn lock_member_is_reentrant() {
        let (store, member) = store_with_member("a@example.com").await;

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        let again = tokio::time::timeout(Duration::from_millis(100), uow.lock_member(&member.id))
            .await
            .expect("re-locking must not block");

        assert_eq!(again.unwrap().id, member.id);
    }

    #[tokio::test]
    async fn second_unit_of_work_waits_for_lock() {
        let (store, member) = store_with_member("a@example.com").await;

        let mut first = store.begin().await.unwrap();
        first.lock_member(&member.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), second.lock_member(&member.id)).await;
        assert!(blocked.is_err());

        first
            .save_member_state(&member.id, MemberStatus::Paid, None)
            .await
            .unwrap();
        first.commit().await.unwrap();

        let seen = second.lock_member(&member.id).await.unwrap();
        assert_eq!(seen.status, MemberStatus::Paid);
    }

    #[tokio::test]
    async fn lock_missing_member_is_not_found() {
        let store = InMemoryMemberStore::new();
        let mut uow = store.begin().await.unwrap();

        let err = uow.lock_member(&MemberId::new()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::MemberNotFound);
    }

    #[tokio::test]
    async fn failed_entitlement_write_leaves_status_untouched() {
        let (store, member) = store_with_member("a@example.com").await;
        store.fail_entitlement_writes(true);

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        let err = uow
            .save_member_state(&member.id, MemberStatus::Paid, Some(&[ProductId::new()]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        assert_eq!(
            uow.lock_member(&member.id).await.unwrap().status,
            MemberStatus::Free
        );

        uow.save_member_state(&member.id, MemberStatus::Paid, None)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MemberStatus::Paid);
        assert!(store.member_products(&member.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (store, _) = store_with_member("a@example.com").await;
        let other = Member::new("a@example.com", None).unwrap();

        let mut uow = store.begin().await.unwrap();
        let err = uow.insert_member(&other).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn customer_owned_by_other_member_is_a_conflict() {
        let (store, alice) = store_with_member("alice@example.com").await;
        let bob = Member::new("bob@example.com", None).unwrap();
        store.seed_member(bob.clone()).await;
        store
            .seed_customer(CustomerLink::new("cus_1", alice.id, None, None))
            .await;

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&bob.id).await.unwrap();
        let err = uow
            .insert_customer(&CustomerLink::new("cus_1", bob.id, None, None))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::Conflict);
    }

    fn record_for(member_id: MemberId) -> SubscriptionRecord {
        let snapshot = fixtures::snapshot(SubscriptionStatus::Active, fixtures::price("price_1", 500, "month"));
        let price = snapshot.items[0].price.clone();
        SubscriptionRecord::from_snapshot(member_id, &snapshot, &price, None, None, 500, None)
    }

    #[tokio::test]
    async fn subscription_owned_by_other_member_is_a_conflict() {
        let (store, alice) = store_with_member("alice@example.com").await;
        let bob = Member::new("bob@example.com", None).unwrap();
        store.seed_member(bob.clone()).await;

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&alice.id).await.unwrap();
        assert_eq!(
            uow.upsert_subscription(&record_for(alice.id)).await.unwrap(),
            UpsertOutcome::Inserted
        );
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&bob.id).await.unwrap();
        let err = uow.upsert_subscription(&record_for(bob.id)).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::Conflict);
        let stored = store
            .find_subscription_by_external_id("sub_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.member_id, alice.id);
    }

    #[tokio::test]
    async fn racing_upserts_across_members_conflict_at_commit() {
        let (store, alice) = store_with_member("alice@example.com").await;
        let bob = Member::new("bob@example.com", None).unwrap();
        store.seed_member(bob.clone()).await;

        let mut first = store.begin().await.unwrap();
        first.lock_member(&alice.id).await.unwrap();
        first.upsert_subscription(&record_for(alice.id)).await.unwrap();

        let mut second = store.begin().await.unwrap();
        second.lock_member(&bob.id).await.unwrap();
        second.upsert_subscription(&record_for(bob.id)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::Conflict);
        let stored = store
            .find_subscription_by_external_id("sub_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.member_id, alice.id);
    }

    #[tokio::test]
    async fn delete_cascades_to_owned_rows() {
        let (store, member) = store_with_member("a@example.com").await;
        store
            .seed_customer(CustomerLink::new("cus_1", member.id, None, None))
            .await;

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        uow.save_member_state(&member.id, MemberStatus::Comped, Some(&[ProductId::new()]))
            .await
            .unwrap();
        uow.delete_member(&member.id).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.member_count().await, 0);
        assert!(store.customers_for_member(&member.id).await.unwrap().is_empty());
        assert!(store.member_products(&member.id).await.unwrap().is_empty());
    }
}
