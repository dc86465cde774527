//! PostgreSQL implementation of MemberStore.
//!
//! A unit of work is one database transaction. `lock_member` takes a row lock
//! with `SELECT ... FOR UPDATE`, which Postgres already treats as re-entrant
//! within a transaction. Entitlement writes run inside a savepoint so that a
//! failed write can be rolled back without aborting the transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::SubscriptionStatus;
use crate::domain::foundation::{
    DomainError, ErrorCode, MemberId, NewsletterId, OfferId, ProductId, SubscriptionRecordId,
    Timestamp,
};
use crate::domain::membership::{CustomerLink, Member, MemberStatus, SubscriptionRecord};
use crate::ports::{MemberStore, MemberUnitOfWork, UpsertOutcome};

const SELECT_MEMBER: &str = r#"
    SELECT
        m.id, m.email, m.name, m.status, m.created_at, m.updated_at,
        ARRAY(
            SELECT n.newsletter_id FROM member_newsletters n
            WHERE n.member_id = m.id
            ORDER BY n.newsletter_id
        ) AS newsletters
    FROM members m
"#;

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT
        id, member_id, customer_id, subscription_id, price_id, product_id,
        plan_nickname, plan_interval, plan_amount, plan_currency,
        status, cancel_at_period_end, cancellation_reason,
        start_date, current_period_end, trial_start_at, trial_end_at,
        mrr, offer_id, payment_card_last4, payment_card_brand,
        created_at, updated_at
    FROM subscriptions
"#;

const SELECT_CUSTOMER: &str =
    "SELECT customer_id, member_id, email, name, created_at FROM customers";

/// PostgreSQL implementation of the MemberStore port.
#[derive(Clone)]
pub struct PostgresMemberStore {
    pool: PgPool,
}

impl PostgresMemberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    status: String,
    newsletters: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = DomainError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<MemberStatus>().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
        })?;

        Ok(Member {
            id: MemberId::from_uuid(row.id),
            email: row.email,
            name: row.name,
            status,
            newsletters: row.newsletters.into_iter().map(NewsletterId::from_uuid).collect(),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    customer_id: String,
    member_id: Uuid,
    email: Option<String>,
    name: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for CustomerLink {
    fn from(row: CustomerRow) -> Self {
        CustomerLink {
            customer_id: row.customer_id,
            member_id: MemberId::from_uuid(row.member_id),
            email: row.email,
            name: row.name,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    member_id: Uuid,
    customer_id: String,
    subscription_id: String,
    price_id: String,
    product_id: Option<Uuid>,
    plan_nickname: Option<String>,
    plan_interval: String,
    plan_amount: i64,
    plan_currency: String,
    status: String,
    cancel_at_period_end: bool,
    cancellation_reason: Option<String>,
    start_date: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    trial_start_at: Option<DateTime<Utc>>,
    trial_end_at: Option<DateTime<Utc>>,
    mrr: i64,
    offer_id: Option<Uuid>,
    payment_card_last4: Option<String>,
    payment_card_brand: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        SubscriptionRecord {
            id: SubscriptionRecordId::from_uuid(row.id),
            member_id: MemberId::from_uuid(row.member_id),
            customer_id: row.customer_id,
            subscription_id: row.subscription_id,
            price_id: row.price_id,
            product_id: row.product_id.map(ProductId::from_uuid),
            plan_nickname: row.plan_nickname,
            plan_interval: row.plan_interval,
            plan_amount: row.plan_amount,
            plan_currency: row.plan_currency,
            // Unrecognised provider states are stored verbatim and read back as Unknown
            status: SubscriptionStatus::parse(&row.status),
            cancel_at_period_end: row.cancel_at_period_end,
            cancellation_reason: row.cancellation_reason,
            start_date: Timestamp::from_datetime(row.start_date),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            trial_start_at: row.trial_start_at.map(Timestamp::from_datetime),
            trial_end_at: row.trial_end_at.map(Timestamp::from_datetime),
            mrr: row.mrr,
            offer_id: row.offer_id.map(OfferId::from_uuid),
            payment_card_last4: row.payment_card_last4,
            payment_card_brand: row.payment_card_brand,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error mapping
// ════════════════════════════════════════════════════════════════════════════════

fn query_failed(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

fn constraint_of(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

fn member_not_found(id: &MemberId) -> DomainError {
    DomainError::new(ErrorCode::MemberNotFound, format!("Member {} not found", id))
}

fn conflict(message: String) -> DomainError {
    DomainError::new(ErrorCode::Conflict, message)
}

fn member_write_failed(action: &str, member: &Member, e: sqlx::Error) -> DomainError {
    match constraint_of(&e) {
        Some("members_email_key") => {
            conflict(format!("Email '{}' is already in use", member.email))
        }
        Some("members_pkey") => conflict(format!("Member {} already exists", member.id)),
        _ => query_failed(action, e),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Queries shared by the pool and open transactions
// ════════════════════════════════════════════════════════════════════════════════

async fn fetch_member<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &MemberId,
    for_update: bool,
) -> Result<Option<Member>, DomainError> {
    let sql = if for_update {
        format!("{} WHERE m.id = $1 FOR UPDATE OF m", SELECT_MEMBER)
    } else {
        format!("{} WHERE m.id = $1", SELECT_MEMBER)
    };
    let row = sqlx::query_as::<_, MemberRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| query_failed("fetch member", e))?;

    row.map(Member::try_from).transpose()
}

async fn fetch_member_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    email: &str,
) -> Result<Option<Member>, DomainError> {
    let sql = format!("{} WHERE m.email = $1", SELECT_MEMBER);
    let row = sqlx::query_as::<_, MemberRow>(&sql)
        .bind(email)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_failed("fetch member", e))?;

    row.map(Member::try_from).transpose()
}

async fn fetch_customer<'e, E: PgExecutor<'e>>(
    executor: E,
    customer_id: &str,
) -> Result<Option<CustomerLink>, DomainError> {
    let sql = format!("{} WHERE customer_id = $1", SELECT_CUSTOMER);
    let row = sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(customer_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_failed("fetch customer", e))?;

    Ok(row.map(CustomerLink::from))
}

async fn fetch_customers<'e, E: PgExecutor<'e>>(
    executor: E,
    member_id: &MemberId,
) -> Result<Vec<CustomerLink>, DomainError> {
    let sql = format!(
        "{} WHERE member_id = $1 ORDER BY created_at, customer_id",
        SELECT_CUSTOMER
    );
    let rows = sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(member_id.as_uuid())
        .fetch_all(executor)
        .await
        .map_err(|e| query_failed("list customers", e))?;

    Ok(rows.into_iter().map(CustomerLink::from).collect())
}

async fn fetch_subscription_by_external_id<'e, E: PgExecutor<'e>>(
    executor: E,
    subscription_id: &str,
    for_update: bool,
) -> Result<Option<SubscriptionRecord>, DomainError> {
    let sql = if for_update {
        format!("{} WHERE subscription_id = $1 FOR UPDATE", SELECT_SUBSCRIPTION)
    } else {
        format!("{} WHERE subscription_id = $1", SELECT_SUBSCRIPTION)
    };
    let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
        .bind(subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| query_failed("fetch subscription", e))?;

    Ok(row.map(SubscriptionRecord::from))
}

async fn fetch_subscriptions<'e, E: PgExecutor<'e>>(
    executor: E,
    member_id: &MemberId,
) -> Result<Vec<SubscriptionRecord>, DomainError> {
    let sql = format!(
        "{} WHERE member_id = $1 ORDER BY created_at, subscription_id",
        SELECT_SUBSCRIPTION
    );
    let rows = sqlx::query_as::<_, SubscriptionRow>(&sql)
        .bind(member_id.as_uuid())
        .fetch_all(executor)
        .await
        .map_err(|e| query_failed("list subscriptions", e))?;

    Ok(rows.into_iter().map(SubscriptionRecord::from).collect())
}

async fn fetch_member_products<'e, E: PgExecutor<'e>>(
    executor: E,
    member_id: &MemberId,
) -> Result<Vec<ProductId>, DomainError> {
    let rows: Vec<Uuid> = sqlx::query_scalar(
        "SELECT product_id FROM member_products WHERE member_id = $1 ORDER BY sort_order",
    )
    .bind(member_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| query_failed("list member products", e))?;

    Ok(rows.into_iter().map(ProductId::from_uuid).collect())
}

#[async_trait]
impl MemberStore for PostgresMemberStore {
    async fn begin(&self) -> Result<Box<dyn MemberUnitOfWork>, DomainError> {
        let tx = self.pool.begin().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn find_member(&self, id: &MemberId) -> Result<Option<Member>, DomainError> {
        fetch_member(&self.pool, id, false).await
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, DomainError> {
        fetch_member_by_email(&self.pool, email).await
    }

    async fn find_subscription(
        &self,
        id: &SubscriptionRecordId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let sql = format!("{} WHERE id = $1", SELECT_SUBSCRIPTION);
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("fetch subscription", e))?;

        Ok(row.map(SubscriptionRecord::from))
    }

    async fn find_subscription_by_external_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        fetch_subscription_by_external_id(&self.pool, subscription_id, false).await
    }

    async fn subscriptions_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        fetch_subscriptions(&self.pool, member_id).await
    }

    async fn customers_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        fetch_customers(&self.pool, member_id).await
    }

    async fn member_products(&self, member_id: &MemberId) -> Result<Vec<ProductId>, DomainError> {
        fetch_member_products(&self.pool, member_id).await
    }
}

/// One open transaction. Dropping it rolls back.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn replace_newsletters(&mut self, member: &Member) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM member_newsletters WHERE member_id = $1")
            .bind(member.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("clear newsletters", e))?;

        let newsletters: Vec<Uuid> = member.newsletters.iter().map(|n| *n.as_uuid()).collect();
        if newsletters.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO member_newsletters (member_id, newsletter_id)
            SELECT $1, UNNEST($2::uuid[])
            "#,
        )
        .bind(member.id.as_uuid())
        .bind(&newsletters)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| query_failed("save newsletters", e))?;

        Ok(())
    }

    async fn write_member_state(
        &mut self,
        member_id: &MemberId,
        status: MemberStatus,
        products: Option<&[ProductId]>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE members SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(member_id.as_uuid())
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("update member status", e))?;

        if result.rows_affected() == 0 {
            return Err(member_not_found(member_id));
        }

        let Some(products) = products else {
            return Ok(());
        };

        sqlx::query("DELETE FROM member_products WHERE member_id = $1")
            .bind(member_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("clear entitlements", e))?;

        if products.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = products.iter().map(|p| *p.as_uuid()).collect();
        let order: Vec<i32> = (0..ids.len() as i32).collect();
        sqlx::query(
            r#"
            INSERT INTO member_products (member_id, product_id, sort_order)
            SELECT $1, p.product_id, p.sort_order
            FROM UNNEST($2::uuid[], $3::int[]) AS p (product_id, sort_order)
            "#,
        )
        .bind(member_id.as_uuid())
        .bind(&ids)
        .bind(&order)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| query_failed("save entitlements", e))?;

        Ok(())
    }

    async fn savepoint(&mut self, statement: &str) -> Result<(), DomainError> {
        sqlx::query(statement)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("manage savepoint", e))?;
        Ok(())
    }
}

#[async_trait]
impl MemberUnitOfWork for PostgresUnitOfWork {
    async fn lock_member(&mut self, id: &MemberId) -> Result<Member, DomainError> {
        fetch_member(&mut *self.tx, id, true)
            .await?
            .ok_or_else(|| member_not_found(id))
    }

    async fn find_member_by_email(&mut self, email: &str) -> Result<Option<Member>, DomainError> {
        fetch_member_by_email(&mut *self.tx, email).await
    }

    async fn insert_member(&mut self, member: &Member) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO members (id, email, name, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(member.id.as_uuid())
        .bind(&member.email)
        .bind(&member.name)
        .bind(member.status.as_str())
        .bind(member.created_at.as_datetime())
        .bind(member.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| member_write_failed("insert member", member, e))?;

        self.replace_newsletters(member).await
    }

    async fn update_member(&mut self, member: &Member) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE members SET
                email = $2,
                name = $3,
                status = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(member.id.as_uuid())
        .bind(&member.email)
        .bind(&member.name)
        .bind(member.status.as_str())
        .bind(member.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| member_write_failed("update member", member, e))?;

        if result.rows_affected() == 0 {
            return Err(member_not_found(&member.id));
        }

        self.replace_newsletters(member).await
    }

    async fn delete_member(&mut self, id: &MemberId) -> Result<(), DomainError> {
        // Customers, subscriptions, newsletters and entitlements cascade
        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("delete member", e))?;
        Ok(())
    }

    async fn find_customer(
        &mut self,
        customer_id: &str,
    ) -> Result<Option<CustomerLink>, DomainError> {
        fetch_customer(&mut *self.tx, customer_id).await
    }

    async fn customers_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        fetch_customers(&mut *self.tx, member_id).await
    }

    async fn insert_customer(&mut self, link: &CustomerLink) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO customers (customer_id, member_id, email, name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(&link.customer_id)
        .bind(link.member_id.as_uuid())
        .bind(&link.email)
        .bind(&link.name)
        .bind(link.created_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match constraint_of(&e) {
            Some("customers_member_id_fkey") => member_not_found(&link.member_id),
            _ => query_failed("insert customer", e),
        })?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match fetch_customer(&mut *self.tx, &link.customer_id).await? {
            Some(existing) if existing.member_id != link.member_id => Err(conflict(format!(
                "Customer '{}' is linked to another member",
                link.customer_id
            ))),
            _ => Ok(()),
        }
    }

    async fn update_customer_email(
        &mut self,
        customer_id: &str,
        email: &str,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE customers SET email = $2 WHERE customer_id = $1")
            .bind(customer_id)
            .bind(email)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| query_failed("update customer email", e))?;
        Ok(())
    }

    async fn subscriptions_for_member(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        fetch_subscriptions(&mut *self.tx, member_id).await
    }

    async fn find_subscription(
        &mut self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        fetch_subscription_by_external_id(&mut *self.tx, subscription_id, false).await
    }

    async fn upsert_subscription(
        &mut self,
        record: &SubscriptionRecord,
    ) -> Result<UpsertOutcome, DomainError> {
        let previous =
            fetch_subscription_by_external_id(&mut *self.tx, &record.subscription_id, true).await?;

        let owned_elsewhere = || {
            conflict(format!(
                "Subscription '{}' belongs to another member",
                record.subscription_id
            ))
        };

        if matches!(&previous, Some(p) if p.member_id != record.member_id) {
            return Err(owned_elsewhere());
        }

        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, member_id, customer_id, subscription_id, price_id, product_id,
                plan_nickname, plan_interval, plan_amount, plan_currency,
                status, cancel_at_period_end, cancellation_reason,
                start_date, current_period_end, trial_start_at, trial_end_at,
                mrr, offer_id, payment_card_last4, payment_card_brand,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            ON CONFLICT (subscription_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                price_id = EXCLUDED.price_id,
                product_id = EXCLUDED.product_id,
                plan_nickname = EXCLUDED.plan_nickname,
                plan_interval = EXCLUDED.plan_interval,
                plan_amount = EXCLUDED.plan_amount,
                plan_currency = EXCLUDED.plan_currency,
                status = EXCLUDED.status,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                cancellation_reason = EXCLUDED.cancellation_reason,
                start_date = EXCLUDED.start_date,
                current_period_end = EXCLUDED.current_period_end,
                trial_start_at = EXCLUDED.trial_start_at,
                trial_end_at = EXCLUDED.trial_end_at,
                mrr = EXCLUDED.mrr,
                offer_id = EXCLUDED.offer_id,
                payment_card_last4 = EXCLUDED.payment_card_last4,
                payment_card_brand = EXCLUDED.payment_card_brand,
                updated_at = EXCLUDED.updated_at
            WHERE subscriptions.member_id = EXCLUDED.member_id
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.member_id.as_uuid())
        .bind(&record.customer_id)
        .bind(&record.subscription_id)
        .bind(&record.price_id)
        .bind(record.product_id.map(|p| *p.as_uuid()))
        .bind(&record.plan_nickname)
        .bind(&record.plan_interval)
        .bind(record.plan_amount)
        .bind(&record.plan_currency)
        .bind(record.status.as_str())
        .bind(record.cancel_at_period_end)
        .bind(&record.cancellation_reason)
        .bind(record.start_date.as_datetime())
        .bind(record.current_period_end.as_datetime())
        .bind(record.trial_start_at.map(|t| *t.as_datetime()))
        .bind(record.trial_end_at.map(|t| *t.as_datetime()))
        .bind(record.mrr)
        .bind(record.offer_id.map(|o| *o.as_uuid()))
        .bind(&record.payment_card_last4)
        .bind(&record.payment_card_brand)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| query_failed("upsert subscription", e))?;

        // The guarded update matched nothing: another member won the race
        if result.rows_affected() == 0 {
            return Err(owned_elsewhere());
        }

        Ok(match previous {
            Some(previous) => UpsertOutcome::Updated { previous },
            None => UpsertOutcome::Inserted,
        })
    }

    async fn member_products(
        &mut self,
        member_id: &MemberId,
    ) -> Result<Vec<ProductId>, DomainError> {
        fetch_member_products(&mut *self.tx, member_id).await
    }

    async fn save_member_state(
        &mut self,
        member_id: &MemberId,
        status: MemberStatus,
        products: Option<&[ProductId]>,
    ) -> Result<(), DomainError> {
        self.savepoint("SAVEPOINT member_state").await?;

        match self.write_member_state(member_id, status, products).await {
            Ok(()) => self.savepoint("RELEASE SAVEPOINT member_state").await,
            Err(err) => {
                self.savepoint("ROLLBACK TO SAVEPOINT member_state").await?;
                Err(err)
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to commit transaction: {}", e))
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to roll back transaction: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::fixtures;

    #[test]
    fn subscription_row_keeps_unknown_status() {
        let price = fixtures::price("price_gold", 500, "month");
        let snapshot = fixtures::snapshot(SubscriptionStatus::Active, price.clone());
        let record = SubscriptionRecord::from_snapshot(
            MemberId::new(),
            &snapshot,
            &price,
            None,
            None,
            500,
            None,
        );

        let row = SubscriptionRow {
            id: *record.id.as_uuid(),
            member_id: *record.member_id.as_uuid(),
            customer_id: record.customer_id.clone(),
            subscription_id: record.subscription_id.clone(),
            price_id: record.price_id.clone(),
            product_id: None,
            plan_nickname: None,
            plan_interval: record.plan_interval.clone(),
            plan_amount: record.plan_amount,
            plan_currency: record.plan_currency.clone(),
            status: "some_future_state".to_string(),
            cancel_at_period_end: false,
            cancellation_reason: None,
            start_date: *record.start_date.as_datetime(),
            current_period_end: *record.current_period_end.as_datetime(),
            trial_start_at: None,
            trial_end_at: None,
            mrr: record.mrr,
            offer_id: None,
            payment_card_last4: None,
            payment_card_brand: None,
            created_at: *record.created_at.as_datetime(),
            updated_at: *record.updated_at.as_datetime(),
        };

        let restored = SubscriptionRecord::from(row);
        assert_eq!(restored.status, SubscriptionStatus::Unknown);
        assert_eq!(restored.subscription_id, "sub_1");
        assert!(!restored.grants_access());
    }

    #[test]
    fn member_row_with_bad_status_is_a_database_error() {
        let now = Utc::now();
        let row = MemberRow {
            id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            name: None,
            status: "gifted".to_string(),
            newsletters: vec![],
            created_at: now,
            updated_at: now,
        };
        assert_eq!(Member::try_from(row).unwrap_err().code, ErrorCode::DatabaseError);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Database-backed tests
    // ════════════════════════════════════════════════════════════════════════════

    async fn store() -> PostgresMemberStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::adapters::postgres::run_migrations(&pool).await.unwrap();
        PostgresMemberStore::new(pool)
    }

    async fn inserted_member(store: &PostgresMemberStore) -> Member {
        let email = format!("{}@example.com", Uuid::new_v4());
        let member = Member::new(&email, None).unwrap();
        let mut uow = store.begin().await.unwrap();
        uow.insert_member(&member).await.unwrap();
        uow.commit().await.unwrap();
        member
    }

    #[tokio::test]
    #[ignore = "Requires a PostgreSQL database (DATABASE_URL)"]
    async fn writes_are_invisible_until_commit() {
        let store = store().await;
        let member = inserted_member(&store).await;
        let product = ProductId::new();
        sqlx::query("INSERT INTO products (id, name, kind) VALUES ($1, 'Gold', 'paid')")
            .bind(product.as_uuid())
            .execute(&store.pool)
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        uow.save_member_state(&member.id, MemberStatus::Paid, Some(&[product]))
            .await
            .unwrap();

        assert_eq!(
            store.find_member(&member.id).await.unwrap().unwrap().status,
            MemberStatus::Free
        );
        uow.commit().await.unwrap();

        assert_eq!(
            store.find_member(&member.id).await.unwrap().unwrap().status,
            MemberStatus::Paid
        );
        assert_eq!(store.member_products(&member.id).await.unwrap(), vec![product]);
    }

    #[tokio::test]
    #[ignore = "Requires a PostgreSQL database (DATABASE_URL)"]
    async fn failed_entitlement_write_keeps_transaction_usable() {
        let store = store().await;
        let member = inserted_member(&store).await;

        let mut uow = store.begin().await.unwrap();
        uow.lock_member(&member.id).await.unwrap();
        // Unknown product violates the foreign key
        let err = uow
            .save_member_state(&member.id, MemberStatus::Comped, Some(&[ProductId::new()]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        uow.save_member_state(&member.id, MemberStatus::Comped, None)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(
            store.find_member(&member.id).await.unwrap().unwrap().status,
            MemberStatus::Comped
        );
    }

    #[tokio::test]
    #[ignore = "Requires a PostgreSQL database (DATABASE_URL)"]
    async fn duplicate_email_is_a_conflict() {
        let store = store().await;
        let member = inserted_member(&store).await;

        let twin = Member::new(&member.email, None).unwrap();
        let mut uow = store.begin().await.unwrap();
        let err = uow.insert_member(&twin).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires a PostgreSQL database (DATABASE_URL)"]
    async fn lock_missing_member_is_not_found() {
        let store = store().await;
        let mut uow = store.begin().await.unwrap();
        let err = uow.lock_member(&MemberId::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MemberNotFound);
    }
}
