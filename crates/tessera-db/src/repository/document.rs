//! # Document Repository
//!
//! Database operations on document headers.
//!
//! ## Column Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  documents                                                              │
//! │                                                                         │
//! │  caller fields     currency, dates, notes,        ← insert / update_header
//! │                    tax_rate_bps, discount_cents,                        │
//! │                    shipping_cents                                       │
//! │  computed totals   subtotal_cents, tax_cents,     ← update_totals      │
//! │                    total_cents                                          │
//! │  lifecycle         status, number, number_seq,    ← issue / set_status │
//! │                    issued_at                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Header and totals writes only match rows still in `draft`, so a document
//! locked between the persister's check and its write is reported as not
//! found instead of being modified.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use tessera_core::{DocumentHeader, DocumentStatus, DocumentTotals, Money};

use super::rate_from_column;
use crate::error::{DbError, DbResult};

const DOCUMENT_COLUMNS: &str = "id, number, status, currency, issue_date, due_date, notes, \
     tax_rate_bps, discount_cents, shipping_cents, \
     subtotal_cents, tax_cents, total_cents, \
     created_at, updated_at, issued_at";

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: i64,
    number: Option<String>,
    status: DocumentStatus,
    currency: String,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    tax_rate_bps: i64,
    discount_cents: i64,
    shipping_cents: i64,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    issued_at: Option<DateTime<Utc>>,
}

impl From<DocumentRow> for DocumentHeader {
    fn from(row: DocumentRow) -> Self {
        DocumentHeader {
            id: Some(row.id),
            number: row.number,
            status: row.status,
            currency: row.currency,
            issue_date: row.issue_date,
            due_date: row.due_date,
            notes: row.notes,
            tax_rate: rate_from_column(row.tax_rate_bps),
            discount_amount: Money::from_cents(row.discount_cents),
            shipping_cost: Money::from_cents(row.shipping_cents),
            subtotal: Money::from_cents(row.subtotal_cents),
            tax_amount: Money::from_cents(row.tax_cents),
            total_amount: Money::from_cents(row.total_cents),
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
            issued_at: row.issued_at,
        }
    }
}

/// Repository for document headers.
#[derive(Debug)]
pub struct DocumentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> DocumentRepository<'c> {
    /// Creates a repository over a borrowed connection or transaction.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        DocumentRepository { conn }
    }

    /// Gets a document header by id within a tenant.
    pub async fn find(&mut self, tenant_id: &str, id: i64) -> DbResult<Option<DocumentHeader>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM documents WHERE tenant_id = ?1 AND id = ?2",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(DocumentHeader::from))
    }

    /// Lists a tenant's documents, most recently updated first.
    pub async fn list(&mut self, tenant_id: &str) -> DbResult<Vec<DocumentHeader>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM documents WHERE tenant_id = ?1 ORDER BY updated_at DESC, id DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows.into_iter().map(DocumentHeader::from).collect())
    }

    /// Inserts a new draft and returns its id.
    ///
    /// Computed totals start at zero; `header.id` and lifecycle fields are
    /// ignored.
    pub async fn insert(
        &mut self,
        tenant_id: &str,
        created_by: &str,
        header: &DocumentHeader,
    ) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                tenant_id, status, currency, issue_date, due_date, notes,
                tax_rate_bps, discount_cents, shipping_cents,
                created_by, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?11
            )
            "#,
        )
        .bind(tenant_id)
        .bind(DocumentStatus::Draft)
        .bind(&header.currency)
        .bind(header.issue_date)
        .bind(header.due_date)
        .bind(&header.notes)
        .bind(i64::from(header.tax_rate.bps()))
        .bind(header.discount_amount.cents())
        .bind(header.shipping_cost.cents())
        .bind(created_by)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        let id = result.last_insert_rowid();
        debug!(document_id = id, tenant_id = %tenant_id, "Inserted document");

        Ok(id)
    }

    /// Rewrites the caller-owned header fields of a draft.
    pub async fn update_header(
        &mut self,
        tenant_id: &str,
        id: i64,
        header: &DocumentHeader,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                currency = ?3,
                issue_date = ?4,
                due_date = ?5,
                notes = ?6,
                tax_rate_bps = ?7,
                discount_cents = ?8,
                shipping_cents = ?9,
                updated_at = ?10
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'draft'
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&header.currency)
        .bind(header.issue_date)
        .bind(header.due_date)
        .bind(&header.notes)
        .bind(i64::from(header.tax_rate.bps()))
        .bind(header.discount_amount.cents())
        .bind(header.shipping_cost.cents())
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document (draft)", id));
        }

        Ok(())
    }

    /// Writes the computed totals of a draft.
    pub async fn update_totals(
        &mut self,
        tenant_id: &str,
        id: i64,
        totals: &DocumentTotals,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                subtotal_cents = ?3,
                tax_cents = ?4,
                total_cents = ?5,
                updated_at = ?6
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'draft'
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(totals.subtotal.cents())
        .bind(totals.tax_amount.cents())
        .bind(totals.total_amount.cents())
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document (draft)", id));
        }

        Ok(())
    }

    /// Next free number sequence for the tenant.
    pub async fn next_number_seq(&mut self, tenant_id: &str) -> DbResult<i64> {
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(number_seq), 0) + 1 FROM documents WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(next)
    }

    /// Moves a draft to `issued`, stamping its number and issue time.
    pub async fn issue(
        &mut self,
        tenant_id: &str,
        id: i64,
        number: &str,
        number_seq: i64,
        issued_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                status = ?3,
                number = ?4,
                number_seq = ?5,
                issued_at = ?6,
                updated_at = ?6
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'draft'
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(DocumentStatus::Issued)
        .bind(number)
        .bind(number_seq)
        .bind(issued_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document (draft)", id));
        }

        Ok(())
    }

    /// Changes status, matching only rows currently in `from`.
    pub async fn set_status(
        &mut self,
        tenant_id: &str,
        id: i64,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                status = ?4,
                updated_at = ?5
            WHERE tenant_id = ?1 AND id = ?2 AND status = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("Document ({})", from), id));
        }

        Ok(())
    }

    /// Deletes a draft; its line items go with it.
    pub async fn delete_draft(&mut self, tenant_id: &str, id: i64) -> DbResult<()> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE tenant_id = ?1 AND id = ?2 AND status = 'draft'",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document (draft)", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{setup_db, OTHER_TENANT, TENANT, USER};
    use tessera_core::Rate;

    fn header() -> DocumentHeader {
        DocumentHeader {
            tax_rate: Rate::from_bps(2100),
            shipping_cost: Money::from_cents(500),
            notes: Some("Net 30".to_string()),
            issue_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            ..DocumentHeader::draft("EUR")
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();
        let found = repo.find(TENANT, id).await.unwrap().unwrap();

        assert_eq!(found.id, Some(id));
        assert_eq!(found.status, DocumentStatus::Draft);
        assert_eq!(found.tax_rate.bps(), 2100);
        assert_eq!(found.shipping_cost.cents(), 500);
        assert_eq!(found.issue_date, NaiveDate::from_ymd_opt(2026, 5, 1));
        assert_eq!(found.total_amount, Money::zero());
        assert!(found.created_at.is_some());
    }

    #[tokio::test]
    async fn test_find_is_tenant_scoped() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();

        assert!(repo.find(OTHER_TENANT, id).await.unwrap().is_none());
        assert!(repo.list(OTHER_TENANT).await.unwrap().is_empty());
        assert_eq!(repo.list(TENANT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_header_and_totals() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();

        let mut changed = header();
        changed.currency = "USD".to_string();
        changed.notes = None;
        repo.update_header(TENANT, id, &changed).await.unwrap();

        let totals = DocumentTotals {
            subtotal: Money::from_cents(10000),
            total_line_discount: Money::from_cents(1000),
            effective_subtotal: Money::from_cents(9000),
            tax_amount: Money::from_cents(1890),
            total_amount: Money::from_cents(11390),
        };
        repo.update_totals(TENANT, id, &totals).await.unwrap();

        let found = repo.find(TENANT, id).await.unwrap().unwrap();
        assert_eq!(found.currency, "USD");
        assert_eq!(found.notes, None);
        assert!(found.totals_match(&totals));
    }

    #[tokio::test]
    async fn test_issue_locks_header_writes() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();
        let seq = repo.next_number_seq(TENANT).await.unwrap();
        assert_eq!(seq, 1);

        repo.issue(TENANT, id, "INV-000001", seq, Utc::now())
            .await
            .unwrap();

        let found = repo.find(TENANT, id).await.unwrap().unwrap();
        assert_eq!(found.status, DocumentStatus::Issued);
        assert_eq!(found.number.as_deref(), Some("INV-000001"));
        assert!(found.issued_at.is_some());
        assert_eq!(repo.next_number_seq(TENANT).await.unwrap(), 2);
        assert_eq!(repo.next_number_seq(OTHER_TENANT).await.unwrap(), 1);

        let err = repo.update_header(TENANT, id, &header()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.delete_draft(TENANT, id).await.is_err());
    }

    #[tokio::test]
    async fn test_set_status_requires_current_status() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();

        let err = repo
            .set_status(TENANT, id, DocumentStatus::Issued, DocumentStatus::Paid)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        repo.set_status(TENANT, id, DocumentStatus::Draft, DocumentStatus::Cancelled)
            .await
            .unwrap();
        let found = repo.find(TENANT, id).await.unwrap().unwrap();
        assert_eq!(found.status, DocumentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_delete_draft() {
        let db = setup_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = DocumentRepository::new(&mut conn);

        let id = repo.insert(TENANT, USER, &header()).await.unwrap();
        assert!(repo.delete_draft(OTHER_TENANT, id).await.is_err());

        repo.delete_draft(TENANT, id).await.unwrap();
        assert!(repo.find(TENANT, id).await.unwrap().is_none());
    }
}
