//! # Line Item Repository
//!
//! Database operations on the line items of one document.
//!
//! Discounts are stored as a `(discount_kind, discount_value)` pair: the
//! value is basis points for `percentage` and cents for `amount`.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use tessera_core::{ItemId, LineDiscount, LineItem, LineItemData, Money, Quantity};

use super::rate_from_column;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: i64,
    position: i64,
    description: String,
    quantity_milli: i64,
    unit_price_cents: i64,
    discount_kind: String,
    discount_value: i64,
    tax_rate_bps: Option<i64>,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        let discount = match row.discount_kind.as_str() {
            "percentage" => LineDiscount::Percentage(rate_from_column(row.discount_value)),
            "amount" => LineDiscount::Amount(Money::from_cents(row.discount_value)),
            _ => LineDiscount::None,
        };

        LineItem {
            id: ItemId::Durable(row.id),
            data: LineItemData {
                description: row.description,
                quantity: Quantity::from_milli(row.quantity_milli),
                unit_price: Money::from_cents(row.unit_price_cents),
                discount,
                tax_rate: row.tax_rate_bps.map(rate_from_column),
                position: row.position,
            },
        }
    }
}

fn discount_columns(discount: &LineDiscount) -> (&'static str, i64) {
    match discount {
        LineDiscount::None => ("none", 0),
        LineDiscount::Percentage(rate) => ("percentage", i64::from(rate.bps())),
        LineDiscount::Amount(amount) => ("amount", amount.cents()),
    }
}

/// Repository for line items.
#[derive(Debug)]
pub struct LineItemRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LineItemRepository<'c> {
    /// Creates a repository over a borrowed connection or transaction.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LineItemRepository { conn }
    }

    /// Gets a document's items in display order.
    pub async fn list_for_document(
        &mut self,
        tenant_id: &str,
        document_id: i64,
    ) -> DbResult<Vec<LineItem>> {
        let rows: Vec<LineItemRow> = sqlx::query_as(
            r#"
            SELECT
                id, position, description, quantity_milli, unit_price_cents,
                discount_kind, discount_value, tax_rate_bps
            FROM line_items
            WHERE tenant_id = ?1 AND document_id = ?2
            ORDER BY position, id
            "#,
        )
        .bind(tenant_id)
        .bind(document_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    /// Inserts an item and returns its durable id.
    pub async fn insert(
        &mut self,
        tenant_id: &str,
        document_id: i64,
        data: &LineItemData,
    ) -> DbResult<i64> {
        let (discount_kind, discount_value) = discount_columns(&data.discount);
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO line_items (
                document_id, tenant_id, position, description,
                quantity_milli, unit_price_cents,
                discount_kind, discount_value, tax_rate_bps,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?10
            )
            "#,
        )
        .bind(document_id)
        .bind(tenant_id)
        .bind(data.position)
        .bind(&data.description)
        .bind(data.quantity.milli())
        .bind(data.unit_price.cents())
        .bind(discount_kind)
        .bind(discount_value)
        .bind(data.tax_rate.map(|rate| i64::from(rate.bps())))
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Rewrites every field of an item that belongs to `document_id`.
    ///
    /// An id from another document or tenant is `NotFound`.
    pub async fn update(
        &mut self,
        tenant_id: &str,
        document_id: i64,
        id: i64,
        data: &LineItemData,
    ) -> DbResult<()> {
        let (discount_kind, discount_value) = discount_columns(&data.discount);

        let result = sqlx::query(
            r#"
            UPDATE line_items SET
                position = ?4,
                description = ?5,
                quantity_milli = ?6,
                unit_price_cents = ?7,
                discount_kind = ?8,
                discount_value = ?9,
                tax_rate_bps = ?10,
                updated_at = ?11
            WHERE tenant_id = ?1 AND document_id = ?2 AND id = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(document_id)
        .bind(id)
        .bind(data.position)
        .bind(&data.description)
        .bind(data.quantity.milli())
        .bind(data.unit_price.cents())
        .bind(discount_kind)
        .bind(discount_value)
        .bind(data.tax_rate.map(|rate| i64::from(rate.bps())))
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LineItem", id));
        }

        Ok(())
    }

    /// Deletes the given items of a document. Returns the number removed.
    ///
    /// Ids that belong to another document or tenant are skipped.
    pub async fn delete_many(
        &mut self,
        tenant_id: &str,
        document_id: i64,
        ids: &[i64],
    ) -> DbResult<u64> {
        let mut deleted = 0;

        for &id in ids {
            let result = sqlx::query(
                r#"
                DELETE FROM line_items
                WHERE tenant_id = ?1 AND document_id = ?2 AND id = ?3
                "#,
            )
            .bind(tenant_id)
            .bind(document_id)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

            deleted += result.rows_affected();
        }

        if !ids.is_empty() {
            debug!(
                document_id,
                requested = ids.len(),
                deleted,
                "Deleted line items"
            );
        }

        Ok(deleted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{setup_db, OTHER_TENANT, TENANT, USER};
    use crate::repository::DocumentRepository;
    use tessera_core::{DocumentHeader, Rate};

    fn data(description: &str, position: i64, discount: LineDiscount) -> LineItemData {
        LineItemData {
            description: description.to_string(),
            quantity: Quantity::from_milli(1500),
            unit_price: Money::from_cents(4000),
            discount,
            tax_rate: Some(Rate::from_bps(700)),
            position,
        }
    }

    #[tokio::test]
    async fn test_insert_list_round_trip() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let doc = DocumentRepository::new(&mut conn)
            .insert(TENANT, USER, &DocumentHeader::draft("EUR"))
            .await
            .unwrap();
        let mut repo = LineItemRepository::new(&mut conn);

        let second = data("second", 1, LineDiscount::Amount(Money::from_cents(250)));
        let first = data("first", 0, LineDiscount::Percentage(Rate::from_bps(1000)));
        let second_id = repo.insert(TENANT, doc, &second).await.unwrap();
        let first_id = repo.insert(TENANT, doc, &first).await.unwrap();

        let items = repo.list_for_document(TENANT, doc).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, ItemId::Durable(first_id));
        assert_eq!(items[0].data, first);
        assert_eq!(items[1].id, ItemId::Durable(second_id));
        assert_eq!(items[1].data, second);

        assert!(repo
            .list_for_document(OTHER_TENANT, doc)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_foreign_item() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let (doc_a, doc_b) = {
            let mut docs = DocumentRepository::new(&mut conn);
            let a = docs.insert(TENANT, USER, &DocumentHeader::draft("EUR")).await.unwrap();
            let b = docs.insert(TENANT, USER, &DocumentHeader::draft("EUR")).await.unwrap();
            (a, b)
        };
        let mut repo = LineItemRepository::new(&mut conn);

        let id = repo
            .insert(TENANT, doc_a, &data("a", 0, LineDiscount::None))
            .await
            .unwrap();

        let err = repo
            .update(TENANT, doc_b, id, &data("moved", 0, LineDiscount::None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        repo.update(TENANT, doc_a, id, &data("edited", 3, LineDiscount::None))
            .await
            .unwrap();
        let items = repo.list_for_document(TENANT, doc_a).await.unwrap();
        assert_eq!(items[0].data.description, "edited");
        assert_eq!(items[0].data.position, 3);
    }

    #[tokio::test]
    async fn test_delete_many_is_document_scoped() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let (doc_a, doc_b) = {
            let mut docs = DocumentRepository::new(&mut conn);
            let a = docs.insert(TENANT, USER, &DocumentHeader::draft("EUR")).await.unwrap();
            let b = docs.insert(TENANT, USER, &DocumentHeader::draft("EUR")).await.unwrap();
            (a, b)
        };
        let mut repo = LineItemRepository::new(&mut conn);

        let a1 = repo.insert(TENANT, doc_a, &data("a1", 0, LineDiscount::None)).await.unwrap();
        let a2 = repo.insert(TENANT, doc_a, &data("a2", 1, LineDiscount::None)).await.unwrap();
        let b1 = repo.insert(TENANT, doc_b, &data("b1", 0, LineDiscount::None)).await.unwrap();

        assert_eq!(repo.delete_many(TENANT, doc_a, &[]).await.unwrap(), 0);
        assert_eq!(repo.delete_many(TENANT, doc_a, &[a1, b1]).await.unwrap(), 1);

        let remaining: Vec<ItemId> = repo
            .list_for_document(TENANT, doc_a)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(remaining, vec![ItemId::Durable(a2)]);
        assert_eq!(repo.list_for_document(TENANT, doc_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_items_cascade_with_document() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let doc = DocumentRepository::new(&mut conn)
            .insert(TENANT, USER, &DocumentHeader::draft("EUR"))
            .await
            .unwrap();
        LineItemRepository::new(&mut conn)
            .insert(TENANT, doc, &data("x", 0, LineDiscount::None))
            .await
            .unwrap();

        DocumentRepository::new(&mut conn)
            .delete_draft(TENANT, doc)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM line_items")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
