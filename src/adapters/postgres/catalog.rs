//! PostgreSQL product and offer repositories.
//!
//! Provider price ids live in `product_prices`, one row per price, so a
//! lookup by price id is a single indexed lookup.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OfferId, ProductId};
use crate::domain::membership::{
    Offer, Product, ProductFilter, ProductKind, ProductPatch, ProductSelector,
};
use crate::ports::{OfferRepository, ProductRepository};

const SELECT_PRODUCT: &str = r#"
    SELECT
        p.id, p.name, p.kind, p.active, p.external_product_id,
        ARRAY(
            SELECT pp.price_id FROM product_prices pp
            WHERE pp.product_id = p.id
            ORDER BY pp.linked_at, pp.price_id
        ) AS price_ids
    FROM products p
"#;

#[derive(Clone)]
pub struct PostgresProductRepository {
    pool: PgPool,
}

impl PostgresProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &ProductId) -> Result<Option<Product>, DomainError> {
        let sql = format!("{} WHERE p.id = $1", SELECT_PRODUCT);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("fetch product", e))?;

        row.map(Product::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    kind: String,
    active: bool,
    external_product_id: Option<String>,
    price_ids: Vec<String>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DomainError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            kind: parse_kind(&row.kind)?,
            active: row.active,
            external_product_id: row.external_product_id,
            external_price_ids: row.price_ids,
        })
    }
}

fn parse_kind(s: &str) -> Result<ProductKind, DomainError> {
    match s {
        "free" => Ok(ProductKind::Free),
        "paid" => Ok(ProductKind::Paid),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid product kind: {}", s),
        )),
    }
}

fn kind_to_str(kind: ProductKind) -> &'static str {
    match kind {
        ProductKind::Free => "free",
        ProductKind::Paid => "paid",
    }
}

fn query_failed(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    async fn get(&self, selector: &ProductSelector) -> Result<Option<Product>, DomainError> {
        let row = match selector {
            ProductSelector::ById(id) => return self.fetch(id).await,
            ProductSelector::ByExternalProductId(external) => {
                let sql = format!("{} WHERE p.external_product_id = $1", SELECT_PRODUCT);
                let row = sqlx::query_as::<_, ProductRow>(&sql)
                    .bind(external)
                    .fetch_optional(&self.pool)
                    .await;
                row
            }
            ProductSelector::ByExternalPriceId(price_id) => {
                let sql = format!(
                    "{} WHERE EXISTS (
                        SELECT 1 FROM product_prices pp
                        WHERE pp.product_id = p.id AND pp.price_id = $1
                    )",
                    SELECT_PRODUCT
                );
                let row = sqlx::query_as::<_, ProductRow>(&sql)
                    .bind(price_id)
                    .fetch_optional(&self.pool)
                    .await;
                row
            }
        }
        .map_err(|e| query_failed("fetch product", e))?;

        row.map(Product::try_from).transpose()
    }

    async fn update(&self, patch: &ProductPatch) -> Result<Product, DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                active = COALESCE($3, active),
                external_product_id = COALESCE($4, external_product_id)
            WHERE id = $1
            "#,
        )
        .bind(patch.id.as_uuid())
        .bind(&patch.name)
        .bind(patch.active)
        .bind(&patch.external_product_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_failed("update product", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ProductNotFound,
                format!("Product {} not found", patch.id),
            ));
        }

        for price_id in &patch.add_price_ids {
            // A price already linked elsewhere keeps its product
            sqlx::query(
                r#"
                INSERT INTO product_prices (price_id, product_id)
                VALUES ($1, $2)
                ON CONFLICT (price_id) DO NOTHING
                "#,
            )
            .bind(price_id)
            .bind(patch.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("link price", e))?;
        }

        tx.commit().await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to commit transaction: {}", e))
        })?;

        self.fetch(&patch.id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::ProductNotFound,
                format!("Product {} not found", patch.id),
            )
        })
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError> {
        let sql = format!(
            "{} WHERE ($1::text IS NULL OR p.kind = $1)
                AND ($2::boolean IS NULL OR p.active = $2)
              ORDER BY p.created_at, p.id",
            SELECT_PRODUCT
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(filter.kind.map(kind_to_str))
            .bind(filter.active)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("list products", e))?;

        rows.into_iter().map(Product::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PostgresOfferRepository {
    pool: PgPool,
}

impl PostgresOfferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    name: String,
    external_coupon_id: Option<String>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Offer {
            id: OfferId::from_uuid(row.id),
            name: row.name,
            external_coupon_id: row.external_coupon_id,
        }
    }
}

#[async_trait]
impl OfferRepository for PostgresOfferRepository {
    async fn get_by_external_coupon_id(
        &self,
        coupon_id: &str,
    ) -> Result<Option<Offer>, DomainError> {
        let row = sqlx::query_as::<_, OfferRow>(
            "SELECT id, name, external_coupon_id FROM offers WHERE external_coupon_id = $1",
        )
        .bind(coupon_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("fetch offer", e))?;

        Ok(row.map(Offer::from))
    }

    async fn get_by_id(&self, id: &OfferId) -> Result<Option<Offer>, DomainError> {
        let row = sqlx::query_as::<_, OfferRow>(
            "SELECT id, name, external_coupon_id FROM offers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("fetch offer", e))?;

        Ok(row.map(Offer::from))
    }
}
