//! # Document Persister
//!
//! Saves an invoice document (header + full line item list) and keeps the
//! cached totals consistent with the stored items.
//!
//! ## Save Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         save(principal, header, items)                  │
//! │                                                                         │
//! │  1. NORMALIZE     raw input ──► DocumentHeader + Vec<LineItem>         │
//! │                   (NumericPolicy, currency, status must be draft)      │
//! │                                                                         │
//! │  2. HEADER        id? ──► find in tenant ──► must be Draft ──► update  │
//! │                   none ──► insert ──► new document id                  │
//! │                                                                         │
//! │  3. ITEMS         load persisted ──► reconcile() ──► delete/update/    │
//! │                   insert                                               │
//! │                                                                         │
//! │  4. TOTALS        compute from reconciled sums ──► update_totals       │
//! │                                                                         │
//! │  5. OUTCOME       reload items (transient ids now durable)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Strategies
//! ```text
//! Atomic (default)   steps 2-5 in one transaction; any failure rolls back
//!                    and is returned as Err
//! Staged             each step commits on its own:
//!                      header fails  → Err
//!                      items fail    → Ok(SaveStatus::ItemsFailed)
//!                      totals fail   → Ok(SaveStatus::TotalsStale)
//! ```
//! A `TotalsStale` document is repaired with [`DocumentPersister::refresh_totals`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, instrument, warn};
use ts_rs::TS;

use tessera_core::lifecycle::{ensure_editable, ensure_transition};
use tessera_core::validation::{normalize_header, normalize_items};
use tessera_core::{
    reconcile, CoreError, Document, DocumentHeader, DocumentHeaderInput, DocumentStatus,
    DocumentTotals, InputRules, LineItem, LineItemInput, Principal, ValidationError,
};

use crate::error::{DbError, SaveError, SaveResult};
use crate::repository::{DocumentRepository, LineItemRepository};

// =============================================================================
// Configuration
// =============================================================================

/// How a save is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStrategy {
    /// One transaction for header, items and totals.
    #[default]
    Atomic,
    /// Header, items and totals are written as separate steps.
    Staged,
}

impl fmt::Display for SaveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStrategy::Atomic => write!(f, "atomic"),
            SaveStrategy::Staged => write!(f, "staged"),
        }
    }
}

impl FromStr for SaveStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "atomic" | "transactional" => Ok(SaveStrategy::Atomic),
            "staged" => Ok(SaveStrategy::Staged),
            _ => Err(ValidationError::NotAllowed {
                field: "save_strategy".to_string(),
                allowed: vec!["atomic".to_string(), "staged".to_string()],
            }),
        }
    }
}

/// Persister settings, usually built by `TesseraConfig::persister_config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersisterConfig {
    pub save_strategy: SaveStrategy,
    pub input_rules: InputRules,
    /// Prepended to the sequence number when a document is issued.
    pub number_prefix: String,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        PersisterConfig {
            save_strategy: SaveStrategy::Atomic,
            input_rules: InputRules::default(),
            number_prefix: "INV-".to_string(),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of a save that reached storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    /// Header, items and totals are all stored.
    Saved,
    /// The header was saved; the line items were not (fully) applied and the
    /// stored totals are stale.
    ItemsFailed { message: String },
    /// Header and items were saved; writing the totals failed.
    TotalsStale { message: String },
}

impl SaveStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveStatus::Saved)
    }
}

/// What the editor gets back from a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaveOutcome {
    pub document_id: i64,
    pub status: SaveStatus,
    /// Computed totals of the saved items. For `ItemsFailed` these are the
    /// stale values still stored on the header.
    pub totals: DocumentTotals,
    /// The document's items as stored, all with durable ids.
    pub items: Vec<LineItem>,
    /// Transient token → durable id, for every item inserted by this save.
    pub assigned_ids: BTreeMap<String, i64>,
}

// =============================================================================
// Persister
// =============================================================================

/// Storage-side entry point for invoice documents.
///
/// Every operation is scoped to `principal.tenant_id`; documents of other
/// tenants are reported as not found.
#[derive(Debug, Clone)]
pub struct DocumentPersister {
    pool: SqlitePool,
    config: PersisterConfig,
}

impl DocumentPersister {
    pub fn new(pool: SqlitePool, config: PersisterConfig) -> Self {
        DocumentPersister { pool, config }
    }

    pub fn config(&self) -> &PersisterConfig {
        &self.config
    }

    /// Saves a header and its complete item list.
    ///
    /// Items missing from `items` are deleted. Items with transient ids are
    /// inserted; their new ids are in [`SaveOutcome::assigned_ids`].
    #[instrument(
        skip(self, header, items),
        fields(
            tenant_id = %principal.tenant_id,
            document_id = ?header.id,
            item_count = items.len(),
            strategy = %self.config.save_strategy
        )
    )]
    pub async fn save(
        &self,
        principal: &Principal,
        header: DocumentHeaderInput,
        items: Vec<LineItemInput>,
    ) -> SaveResult<SaveOutcome> {
        let rules = &self.config.input_rules;
        let header = normalize_header(header, rules)?;
        let items = normalize_items(items, rules)?;

        let outcome = match self.config.save_strategy {
            SaveStrategy::Atomic => self.save_atomic(principal, &header, items).await?,
            SaveStrategy::Staged => self.save_staged(principal, &header, items).await?,
        };

        info!(
            document_id = outcome.document_id,
            items = outcome.items.len(),
            total_cents = outcome.totals.total_amount.cents(),
            saved = outcome.status.is_saved(),
            "Document saved"
        );

        Ok(outcome)
    }

    async fn save_atomic(
        &self,
        principal: &Principal,
        header: &DocumentHeader,
        items: Vec<LineItem>,
    ) -> SaveResult<SaveOutcome> {
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let document_id = write_header(&mut tx, principal, header).await?;
        let assigned_ids = apply_items(&mut tx, &principal.tenant_id, document_id, items).await?;

        let items = LineItemRepository::new(&mut tx)
            .list_for_document(&principal.tenant_id, document_id)
            .await?;
        let totals = totals_of(&items, header);

        DocumentRepository::new(&mut tx)
            .update_totals(&principal.tenant_id, document_id, &totals)
            .await?;

        tx.commit().await.map_err(transaction_failed)?;

        Ok(SaveOutcome {
            document_id,
            status: SaveStatus::Saved,
            totals,
            items,
            assigned_ids,
        })
    }

    async fn save_staged(
        &self,
        principal: &Principal,
        header: &DocumentHeader,
        items: Vec<LineItem>,
    ) -> SaveResult<SaveOutcome> {
        let tenant_id = principal.tenant_id.as_str();
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let document_id = write_header(&mut conn, principal, header).await?;

        let assigned_ids = match apply_items(&mut conn, tenant_id, document_id, items).await {
            Ok(assigned_ids) => assigned_ids,
            Err(err) => {
                warn!(document_id, error = %err, "Line items not saved, totals left stale");

                let stored = DocumentRepository::new(&mut conn)
                    .find(tenant_id, document_id)
                    .await?
                    .ok_or(CoreError::DocumentNotFound(document_id))?;
                let items = LineItemRepository::new(&mut conn)
                    .list_for_document(tenant_id, document_id)
                    .await?;

                return Ok(SaveOutcome {
                    document_id,
                    status: SaveStatus::ItemsFailed {
                        message: err.to_string(),
                    },
                    totals: stored.cached_totals(),
                    items,
                    assigned_ids: BTreeMap::new(),
                });
            }
        };

        let items = LineItemRepository::new(&mut conn)
            .list_for_document(tenant_id, document_id)
            .await?;
        let totals = totals_of(&items, header);

        let status = match DocumentRepository::new(&mut conn)
            .update_totals(tenant_id, document_id, &totals)
            .await
        {
            Ok(()) => SaveStatus::Saved,
            Err(err) => {
                error!(document_id, error = %err, "Failed to write document totals");
                SaveStatus::TotalsStale {
                    message: err.to_string(),
                }
            }
        };

        Ok(SaveOutcome {
            document_id,
            status,
            totals,
            items,
            assigned_ids,
        })
    }

    /// Loads a document with its items.
    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id))]
    pub async fn load(&self, principal: &Principal, id: i64) -> SaveResult<Document> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let header = find_document(&mut conn, principal, id).await?;
        let items = LineItemRepository::new(&mut conn)
            .list_for_document(&principal.tenant_id, id)
            .await?;

        Ok(Document { header, items })
    }

    /// Lists the tenant's document headers, most recently updated first.
    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id))]
    pub async fn list(&self, principal: &Principal) -> SaveResult<Vec<DocumentHeader>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let headers = DocumentRepository::new(&mut conn)
            .list(&principal.tenant_id)
            .await?;

        debug!(count = headers.len(), "Listed documents");
        Ok(headers)
    }

    /// Moves a document through its lifecycle.
    ///
    /// Issuing recomputes the totals from the stored items first, then
    /// assigns the next document number and the issue time.
    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id))]
    pub async fn transition(
        &self,
        principal: &Principal,
        id: i64,
        to: DocumentStatus,
    ) -> SaveResult<DocumentHeader> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let current = find_document(&mut tx, principal, id).await?;
        ensure_transition(id, current.status, to)?;

        if to == DocumentStatus::Issued {
            let totals = stored_totals(&mut tx, tenant_id, &current).await?;
            let mut documents = DocumentRepository::new(&mut tx);
            documents.update_totals(tenant_id, id, &totals).await?;

            let seq = documents.next_number_seq(tenant_id).await?;
            let number = format!("{}{:06}", self.config.number_prefix, seq);
            documents
                .issue(tenant_id, id, &number, seq, Utc::now())
                .await?;

            info!(document_id = id, number = %number, "Document issued");
        } else {
            DocumentRepository::new(&mut tx)
                .set_status(tenant_id, id, current.status, to)
                .await?;

            info!(document_id = id, from = %current.status, to = %to, "Document status changed");
        }

        let updated = find_document(&mut tx, principal, id).await?;
        tx.commit().await.map_err(transaction_failed)?;

        Ok(updated)
    }

    /// Recomputes and rewrites a draft's totals from its stored items.
    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id))]
    pub async fn refresh_totals(&self, principal: &Principal, id: i64) -> SaveResult<DocumentTotals> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let current = find_document(&mut tx, principal, id).await?;
        ensure_editable(id, current.status)?;

        let totals = stored_totals(&mut tx, tenant_id, &current).await?;
        if current.totals_match(&totals) {
            debug!(document_id = id, "Totals already current");
        } else {
            DocumentRepository::new(&mut tx)
                .update_totals(tenant_id, id, &totals)
                .await?;
            info!(
                document_id = id,
                total_cents = totals.total_amount.cents(),
                "Document totals refreshed"
            );
        }

        tx.commit().await.map_err(transaction_failed)?;
        Ok(totals)
    }

    /// Deletes a draft and its items.
    #[instrument(skip(self), fields(tenant_id = %principal.tenant_id))]
    pub async fn discard(&self, principal: &Principal, id: i64) -> SaveResult<()> {
        let mut tx = self.pool.begin().await.map_err(transaction_failed)?;

        let current = find_document(&mut tx, principal, id).await?;
        ensure_editable(id, current.status)?;

        DocumentRepository::new(&mut tx)
            .delete_draft(&principal.tenant_id, id)
            .await?;

        tx.commit().await.map_err(transaction_failed)?;

        info!(document_id = id, "Draft discarded");
        Ok(())
    }
}

// =============================================================================
// Pipeline Steps
// =============================================================================

fn transaction_failed(err: sqlx::Error) -> DbError {
    DbError::TransactionFailed(err.to_string())
}

async fn find_document(
    conn: &mut SqliteConnection,
    principal: &Principal,
    id: i64,
) -> SaveResult<DocumentHeader> {
    DocumentRepository::new(conn)
        .find(&principal.tenant_id, id)
        .await?
        .ok_or(SaveError::Domain(CoreError::DocumentNotFound(id)))
}

/// Inserts a new draft or updates an existing one; returns the document id.
async fn write_header(
    conn: &mut SqliteConnection,
    principal: &Principal,
    header: &DocumentHeader,
) -> SaveResult<i64> {
    match header.id {
        Some(id) => {
            let current = find_document(conn, principal, id).await?;
            ensure_editable(id, current.status)?;

            DocumentRepository::new(conn)
                .update_header(&principal.tenant_id, id, header)
                .await?;
            Ok(id)
        }
        None => {
            let id = DocumentRepository::new(conn)
                .insert(&principal.tenant_id, &principal.user_id, header)
                .await?;
            Ok(id)
        }
    }
}

/// Reconciles the submission against the stored items and applies the diff.
/// Returns the ids assigned to inserted items, keyed by transient token.
async fn apply_items(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    document_id: i64,
    submitted: Vec<LineItem>,
) -> SaveResult<BTreeMap<String, i64>> {
    let mut repo = LineItemRepository::new(conn);

    let persisted = repo.list_for_document(tenant_id, document_id).await?;
    let plan = reconcile(&persisted, submitted);

    debug!(
        document_id,
        inserts = plan.to_insert.len(),
        updates = plan.to_update.len(),
        deletes = plan.to_delete.len(),
        "Applying line item changes"
    );

    repo.delete_many(tenant_id, document_id, &plan.to_delete)
        .await?;

    for update in &plan.to_update {
        repo.update(tenant_id, document_id, update.id, &update.data)
            .await?;
    }

    let mut assigned_ids = BTreeMap::new();
    for insert in &plan.to_insert {
        let id = repo.insert(tenant_id, document_id, &insert.data).await?;
        assigned_ids.insert(insert.token.clone(), id);
    }

    Ok(assigned_ids)
}

/// Totals of the stored items under the stored header's adjustments.
async fn stored_totals(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    header: &DocumentHeader,
) -> SaveResult<DocumentTotals> {
    let id = header
        .id
        .ok_or(SaveError::Storage(DbError::Internal("stored document without id".into())))?;

    let items = LineItemRepository::new(conn)
        .list_for_document(tenant_id, id)
        .await?;

    Ok(totals_of(&items, header))
}

/// Header totals are always derived from the rows as stored, so they match
/// whatever a later load recomputes.
fn totals_of(items: &[LineItem], header: &DocumentHeader) -> DocumentTotals {
    tessera_core::compute_totals(items.iter().map(|item| &item.data), &header.adjustments())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{setup_db, OTHER_TENANT, TENANT, USER};
    use crate::Database;
    use tessera_core::validation::NumericPolicy;
    use tessera_core::{ItemId, Money};

    fn principal() -> Principal {
        Principal::new(TENANT, USER)
    }

    fn persister(db: &Database, save_strategy: SaveStrategy) -> DocumentPersister {
        db.persister(PersisterConfig {
            save_strategy,
            ..PersisterConfig::default()
        })
    }

    fn header_input(id: Option<i64>) -> DocumentHeaderInput {
        DocumentHeaderInput {
            id,
            currency: Some("EUR".to_string()),
            tax_rate: 21.0,
            shipping_cost: 5.0,
            ..DocumentHeaderInput::default()
        }
    }

    fn item(id: ItemId, description: &str, quantity: f64, price: f64) -> LineItemInput {
        LineItemInput {
            id: Some(id),
            description: description.to_string(),
            quantity,
            unit_price: price,
            ..LineItemInput::default()
        }
    }

    fn temp(token: &str, description: &str) -> LineItemInput {
        item(ItemId::Transient(token.to_string()), description, 1.0, 10.0)
    }

    /// Resubmits stored items unchanged, as the editor would.
    fn resubmit(items: &[LineItem]) -> Vec<LineItemInput> {
        items
            .iter()
            .map(|stored| LineItemInput {
                id: Some(stored.id.clone()),
                description: stored.data.description.clone(),
                quantity: stored.data.quantity.as_f64(),
                unit_price: stored.data.unit_price.cents() as f64 / 100.0,
                position: Some(stored.data.position),
                ..LineItemInput::default()
            })
            .collect()
    }

    async fn count_items(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM line_items")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_reference_scenario() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let line = LineItemInput {
            discount_percentage: Some(10.0),
            ..item(ItemId::Transient("temp-1".into()), "Consulting", 2.0, 50.0)
        };
        let outcome = persister
            .save(&principal(), header_input(None), vec![line])
            .await
            .unwrap();

        assert_eq!(outcome.status, SaveStatus::Saved);
        assert_eq!(outcome.totals.subtotal.cents(), 10000);
        assert_eq!(outcome.totals.total_line_discount.cents(), 1000);
        assert_eq!(outcome.totals.effective_subtotal.cents(), 9000);
        assert_eq!(outcome.totals.tax_amount.cents(), 1890);
        assert_eq!(outcome.totals.total_amount.cents(), 11390);

        let document = persister.load(&principal(), outcome.document_id).await.unwrap();
        assert!(document.header.totals_match(&outcome.totals));
        assert_eq!(document.computed_totals(), outcome.totals);
    }

    #[tokio::test]
    async fn test_transient_id_becomes_durable() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let first = persister
            .save(&principal(), header_input(None), vec![temp("temp-123", "Hosting")])
            .await
            .unwrap();

        let durable = first.assigned_ids["temp-123"];
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].id, ItemId::Durable(durable));

        let mut resubmitted = item(ItemId::Durable(durable), "Hosting (annual)", 1.0, 120.0);
        resubmitted.position = Some(0);
        let second = persister
            .save(
                &principal(),
                header_input(Some(first.document_id)),
                vec![resubmitted],
            )
            .await
            .unwrap();

        assert_eq!(second.document_id, first.document_id);
        assert!(second.assigned_ids.is_empty());
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, ItemId::Durable(durable));
        assert_eq!(second.items[0].data.description, "Hosting (annual)");
        assert_eq!(count_items(&db).await, 1);
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let first = persister
            .save(
                &principal(),
                header_input(None),
                vec![temp("temp-a", "a"), temp("temp-b", "b")],
            )
            .await
            .unwrap();

        let second = persister
            .save(
                &principal(),
                header_input(Some(first.document_id)),
                resubmit(&first.items),
            )
            .await
            .unwrap();

        assert_eq!(second.totals, first.totals);
        assert_eq!(second.items, first.items);
        assert_eq!(count_items(&db).await, 2);
    }

    #[tokio::test]
    async fn test_omitted_items_are_deleted() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let first = persister
            .save(
                &principal(),
                header_input(None),
                vec![temp("temp-a", "a"), temp("temp-b", "b"), temp("temp-c", "c")],
            )
            .await
            .unwrap();

        let kept = vec![first.items[0].clone(), first.items[2].clone()];
        let second = persister
            .save(
                &principal(),
                header_input(Some(first.document_id)),
                resubmit(&kept)
                    .into_iter()
                    .chain([temp("temp-d", "d")])
                    .collect(),
            )
            .await
            .unwrap();

        let ids: Vec<ItemId> = second.items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&kept[0].id));
        assert!(ids.contains(&kept[1].id));
        assert!(!ids.contains(&first.items[1].id));
        assert!(ids.contains(&ItemId::Durable(second.assigned_ids["temp-d"])));
    }

    #[tokio::test]
    async fn test_empty_submission_leaves_shipping_only() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let first = persister
            .save(
                &principal(),
                header_input(None),
                vec![temp("temp-a", "a"), temp("temp-b", "b")],
            )
            .await
            .unwrap();

        let second = persister
            .save(&principal(), header_input(Some(first.document_id)), Vec::new())
            .await
            .unwrap();

        assert!(second.items.is_empty());
        assert_eq!(second.totals.subtotal, Money::zero());
        assert_eq!(second.totals.tax_amount, Money::zero());
        assert_eq!(second.totals.total_amount.cents(), 500);
        assert_eq!(count_items(&db).await, 0);
    }

    #[tokio::test]
    async fn test_locked_document_rejects_save() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let saved = persister
            .save(&principal(), header_input(None), vec![temp("temp-a", "a")])
            .await
            .unwrap();
        let issued = persister
            .transition(&principal(), saved.document_id, DocumentStatus::Issued)
            .await
            .unwrap();
        assert_eq!(issued.number.as_deref(), Some("INV-000001"));

        let err = persister
            .save(
                &principal(),
                header_input(Some(saved.document_id)),
                vec![temp("temp-b", "b")],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Domain(CoreError::DocumentLocked {
                status: DocumentStatus::Issued,
                ..
            })
        ));

        let document = persister.load(&principal(), saved.document_id).await.unwrap();
        assert_eq!(document.items, saved.items);
        assert_eq!(document.header.total_amount, saved.totals.total_amount);
        assert_eq!(document.header.status, DocumentStatus::Issued);
    }

    #[tokio::test]
    async fn test_submitted_status_must_be_draft() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let header = DocumentHeaderInput {
            status: Some(DocumentStatus::Paid),
            ..header_input(None)
        };
        let err = persister.save(&principal(), header, Vec::new()).await.unwrap_err();

        assert!(matches!(err, SaveError::Domain(CoreError::Validation(_))));
        assert!(persister.list(&principal()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_garbage() {
        let db = setup_db().await;
        let persister = db.persister(PersisterConfig {
            input_rules: InputRules {
                numeric_policy: NumericPolicy::Strict,
                ..InputRules::default()
            },
            ..PersisterConfig::default()
        });

        let bad = item(ItemId::Transient("temp-1".into()), "x", f64::NAN, 10.0);
        let err = persister
            .save(&principal(), header_input(None), vec![bad])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SaveError::Domain(CoreError::Validation(ValidationError::NotFinite { .. }))
        ));
    }

    #[tokio::test]
    async fn test_atomic_save_rolls_back_on_item_failure() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let err = persister
            .save(
                &principal(),
                header_input(None),
                vec![
                    temp("temp-a", "a"),
                    item(ItemId::Durable(9999), "ghost", 1.0, 1.0),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SaveError::Storage(DbError::NotFound { .. })));
        assert!(persister.list(&principal()).await.unwrap().is_empty());
        assert_eq!(count_items(&db).await, 0);
    }

    #[tokio::test]
    async fn test_staged_save_reports_item_failure() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Staged);

        let outcome = persister
            .save(
                &principal(),
                header_input(None),
                vec![item(ItemId::Durable(9999), "ghost", 1.0, 1.0)],
            )
            .await
            .unwrap();

        assert!(matches!(outcome.status, SaveStatus::ItemsFailed { .. }));
        assert_eq!(outcome.totals.total_amount, Money::zero());

        let document = persister.load(&principal(), outcome.document_id).await.unwrap();
        assert_eq!(document.header.id, Some(outcome.document_id));
        assert!(document.items.is_empty());
    }

    #[tokio::test]
    async fn test_staged_totals_failure_is_repaired_by_refresh() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Staged);

        sqlx::query(
            r#"
            CREATE TRIGGER freeze_totals BEFORE UPDATE OF total_cents ON documents
            BEGIN
                SELECT RAISE(ABORT, 'totals are frozen');
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let outcome = persister
            .save(&principal(), header_input(None), vec![temp("temp-a", "a")])
            .await
            .unwrap();

        assert!(matches!(outcome.status, SaveStatus::TotalsStale { .. }));
        assert_eq!(outcome.items.len(), 1);
        // 10.00 + 21% tax + 5.00 shipping
        assert_eq!(outcome.totals.total_amount.cents(), 1710);

        let stale = persister.load(&principal(), outcome.document_id).await.unwrap();
        assert!(!stale.header.totals_match(&outcome.totals));

        sqlx::query("DROP TRIGGER freeze_totals")
            .execute(db.pool())
            .await
            .unwrap();

        let repaired = persister
            .refresh_totals(&principal(), outcome.document_id)
            .await
            .unwrap();
        assert_eq!(repaired, outcome.totals);

        let document = persister.load(&principal(), outcome.document_id).await.unwrap();
        assert!(document.header.totals_match(&repaired));
    }

    #[tokio::test]
    async fn test_repeated_durable_id_leaves_document_untouched() {
        let db = setup_db().await;

        for strategy in [SaveStrategy::Atomic, SaveStrategy::Staged] {
            let persister = persister(&db, strategy);
            let first = persister
                .save(&principal(), header_input(None), vec![temp("temp-a", "a")])
                .await
                .unwrap();
            let id = first.items[0].id.clone();

            let err = persister
                .save(
                    &principal(),
                    header_input(Some(first.document_id)),
                    vec![
                        item(id.clone(), "a", 1.0, 10.0),
                        item(id, "a again", 1.0, 12.0),
                    ],
                )
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                SaveError::Domain(CoreError::Validation(ValidationError::InvalidFormat { .. }))
            ));

            let document = persister.load(&principal(), first.document_id).await.unwrap();
            assert_eq!(document.items.len(), 1);
            assert!(document.header.totals_match(&document.computed_totals()));
            assert_eq!(document.header.total_amount.cents(), 1710);
        }
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_refused() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let err = persister
            .save(
                &principal(),
                header_input(None),
                vec![
                    item(ItemId::Transient("temp-a".into()), "a", 1.0, 9.0e16),
                    item(ItemId::Transient("temp-b".into()), "b", 1.0, 9.0e16),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        // each line within bounds, the sum is not
        let err = persister
            .save(
                &principal(),
                header_input(None),
                vec![
                    item(ItemId::Transient("temp-a".into()), "a", 1.0, 6.0e8),
                    item(ItemId::Transient("temp-b".into()), "b", 1.0, 6.0e8),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Domain(CoreError::Validation(ValidationError::OutOfRange { ref field, .. }))
                if field == "subtotal"
        ));

        assert!(persister.list(&principal()).await.unwrap().is_empty());
        assert_eq!(count_items(&db).await, 0);
    }

    #[tokio::test]
    async fn test_largest_accepted_amount_keeps_totals_derived() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);
        let max_major = (tessera_core::MAX_AMOUNT_CENTS / 100) as f64;

        let outcome = persister
            .save(
                &principal(),
                header_input(None),
                vec![item(ItemId::Transient("temp-a".into()), "a", 1.0, max_major)],
            )
            .await
            .unwrap();

        assert_eq!(outcome.totals.subtotal.cents(), tessera_core::MAX_AMOUNT_CENTS);
        let document = persister.load(&principal(), outcome.document_id).await.unwrap();
        assert!(document.header.totals_match(&document.computed_totals()));
        assert_eq!(document.header.total_amount, outcome.totals.total_amount);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_see_or_write() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);
        let intruder = Principal::new(OTHER_TENANT, "user-2");

        let saved = persister
            .save(&principal(), header_input(None), vec![temp("temp-a", "a")])
            .await
            .unwrap();

        let err = persister.load(&intruder, saved.document_id).await.unwrap_err();
        assert!(matches!(err, SaveError::Domain(CoreError::DocumentNotFound(_))));

        let err = persister
            .save(&intruder, header_input(Some(saved.document_id)), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Domain(CoreError::DocumentNotFound(_))));

        assert!(persister.list(&intruder).await.unwrap().is_empty());
        assert_eq!(count_items(&db).await, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let first = persister
            .save(&principal(), header_input(None), Vec::new())
            .await
            .unwrap();
        let second = persister
            .save(&principal(), header_input(None), Vec::new())
            .await
            .unwrap();

        let err = persister
            .transition(&principal(), first.document_id, DocumentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Domain(CoreError::InvalidTransition { .. })));

        persister
            .transition(&principal(), first.document_id, DocumentStatus::Issued)
            .await
            .unwrap();
        let paid = persister
            .transition(&principal(), first.document_id, DocumentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.status, DocumentStatus::Paid);
        assert_eq!(paid.number.as_deref(), Some("INV-000001"));

        let issued = persister
            .transition(&principal(), second.document_id, DocumentStatus::Issued)
            .await
            .unwrap();
        assert_eq!(issued.number.as_deref(), Some("INV-000002"));

        let err = persister
            .refresh_totals(&principal(), second.document_id)
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Domain(CoreError::DocumentLocked { .. })));
    }

    #[tokio::test]
    async fn test_discard_draft_only() {
        let db = setup_db().await;
        let persister = persister(&db, SaveStrategy::Atomic);

        let draft = persister
            .save(&principal(), header_input(None), vec![temp("temp-a", "a")])
            .await
            .unwrap();
        persister.discard(&principal(), draft.document_id).await.unwrap();

        let err = persister.load(&principal(), draft.document_id).await.unwrap_err();
        assert!(matches!(err, SaveError::Domain(CoreError::DocumentNotFound(_))));
        assert_eq!(count_items(&db).await, 0);

        let cancelled = persister
            .save(&principal(), header_input(None), Vec::new())
            .await
            .unwrap();
        persister
            .transition(&principal(), cancelled.document_id, DocumentStatus::Cancelled)
            .await
            .unwrap();
        assert!(persister
            .discard(&principal(), cancelled.document_id)
            .await
            .is_err());
    }

    #[test]
    fn test_save_strategy_parsing() {
        assert_eq!("Staged".parse::<SaveStrategy>().unwrap(), SaveStrategy::Staged);
        assert_eq!("atomic".parse::<SaveStrategy>().unwrap(), SaveStrategy::Atomic);
        assert!("eventually".parse::<SaveStrategy>().is_err());
        assert_eq!(SaveStrategy::default().to_string(), "atomic");
    }

    #[test]
    fn test_save_status_json() {
        let json = serde_json::to_value(SaveStatus::TotalsStale {
            message: "locked".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "totals_stale");
        assert_eq!(json["message"], "locked");
    }
}
