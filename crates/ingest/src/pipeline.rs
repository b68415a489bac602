use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use gastos_core::{CandidateTransaction, ImportRule};

use crate::columns::resolve_columns;
use crate::normalize::normalize_row;
use crate::rules::RuleEngine;
use crate::table::load_table;
use crate::ImportError;

/// The two persistence reads the pipeline consumes. The rule list is
/// fetched once per import call; the dedup lookup runs once per surviving
/// row.
#[allow(async_fn_in_trait)]
pub trait ImportStore {
    /// Does a confirmed transaction or pending candidate with exactly this
    /// (date, amount, truncated description) already exist for the user?
    async fn exists_recorded_transaction(
        &self,
        user_id: i64,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> anyhow::Result<bool>;

    /// The user's active import rules, descending priority.
    async fn list_import_rules(&self, user_id: i64) -> anyhow::Result<Vec<ImportRule>>;
}

/// Aggregate outcome of one statement import.
///
/// `needs_review == total_imported - auto_categorized` always;
/// `duplicates_skipped` counts rows that matched an existing record and
/// never became candidates.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub total_imported: usize,
    pub auto_categorized: usize,
    pub needs_review: usize,
    pub duplicates_skipped: usize,
    pub batch_id: String,
    pub pending_transactions: Vec<CandidateTransaction>,
}

/// Run the full pipeline over one uploaded statement for one user.
///
/// Loader or resolver failure aborts the whole import with no partial
/// result; malformed rows abort only themselves. Emitted candidates are not
/// persisted here — the caller writes them back.
///
/// `today` anchors year inference for shorthand dates; production callers
/// pass the current date.
pub async fn import_statement<S: ImportStore>(
    store: &S,
    user_id: i64,
    bytes: &[u8],
    today: NaiveDate,
) -> Result<ImportResult, ImportError> {
    let batch_id = new_batch_id();

    let table = load_table(bytes)?;
    let map = resolve_columns(&table.headers)?;
    let rules = RuleEngine::new(store.list_import_rules(user_id).await?);

    let mut auto_categorized = 0;
    let mut duplicates_skipped = 0;
    let mut pending = Vec::new();
    // Rows repeated within this upload are duplicates too, not just rows
    // colliding with persisted state.
    let mut seen_in_batch: HashSet<(NaiveDate, Decimal, String)> = HashSet::new();

    for (idx, row) in table.rows.iter().enumerate() {
        let Some(normalized) = normalize_row(row, &map, today) else {
            tracing::debug!(row = idx, "skipping unusable statement row");
            continue;
        };

        let key = (
            normalized.date,
            normalized.amount,
            normalized.description.clone(),
        );
        let recorded = seen_in_batch.contains(&key)
            || store
                .exists_recorded_transaction(
                    user_id,
                    normalized.date,
                    normalized.amount,
                    &normalized.description,
                )
                .await?;
        if recorded {
            duplicates_skipped += 1;
            tracing::debug!(row = idx, date = %normalized.date, "skipping duplicate row");
            continue;
        }
        seen_in_batch.insert(key);

        let category_id = rules.categorize(&normalized.raw_description);
        let auto = category_id.is_some();
        if auto {
            auto_categorized += 1;
        }

        pending.push(CandidateTransaction {
            id: None,
            user_id,
            category_id,
            amount: normalized.amount,
            kind: normalized.kind,
            description: normalized.description,
            raw_description: normalized.raw_description,
            date: normalized.date,
            auto_categorized: auto,
            import_batch_id: batch_id.clone(),
        });
    }

    let total_imported = pending.len();
    tracing::info!(
        user_id,
        batch_id = %batch_id,
        total_imported,
        auto_categorized,
        duplicates_skipped,
        "statement import complete"
    );

    Ok(ImportResult {
        total_imported,
        auto_categorized,
        needs_review: total_imported - auto_categorized,
        duplicates_skipped,
        batch_id,
        pending_transactions: pending,
    })
}

/// Short opaque identifier shared by every candidate of one import call.
fn new_batch_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gastos_core::TransactionKind;
    use std::str::FromStr;

    #[derive(Default)]
    struct MemStore {
        rules: Vec<ImportRule>,
        recorded: HashSet<(NaiveDate, Decimal, String)>,
    }

    impl MemStore {
        fn record(&mut self, tx: &CandidateTransaction) {
            self.recorded
                .insert((tx.date, tx.amount, tx.description.clone()));
        }
    }

    impl ImportStore for MemStore {
        async fn exists_recorded_transaction(
            &self,
            _user_id: i64,
            date: NaiveDate,
            amount: Decimal,
            description: &str,
        ) -> anyhow::Result<bool> {
            Ok(self
                .recorded
                .contains(&(date, amount, description.to_string())))
        }

        async fn list_import_rules(&self, _user_id: i64) -> anyhow::Result<Vec<ImportRule>> {
            Ok(self.rules.clone())
        }
    }

    struct FailingStore;

    impl ImportStore for FailingStore {
        async fn exists_recorded_transaction(
            &self,
            _user_id: i64,
            _date: NaiveDate,
            _amount: Decimal,
            _description: &str,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("connection lost")
        }

        async fn list_import_rules(&self, _user_id: i64) -> anyhow::Result<Vec<ImportRule>> {
            Ok(Vec::new())
        }
    }

    fn rule(keyword: &str, category_id: i64, priority: i32) -> ImportRule {
        ImportRule {
            id: None,
            keyword: keyword.to_string(),
            category_id,
            priority,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    const STATEMENT: &[u8] = b"Banco Estado\n\nFecha;Descripcion;Cargos;Abonos\n\
31/Dic;UBER TRIP SANTIAGO;12.500;\n\
02/Ene;SUELDO EMPRESA SA;;1.500.000\n\
03/Ene;SUBTOTAL MOVIMIENTOS;99.999;\n\
03/Ene;FARMACIA CRUZ VERDE;4.990;\n";

    #[tokio::test]
    async fn imports_statement_with_rules() {
        let store = MemStore {
            rules: vec![rule("uber", 7, 10)],
            ..Default::default()
        };
        let result = import_statement(&store, 1, STATEMENT, today()).await.unwrap();

        assert_eq!(result.total_imported, 3);
        assert_eq!(result.auto_categorized, 1);
        assert_eq!(result.needs_review, 2);
        assert_eq!(result.duplicates_skipped, 0);
        assert_eq!(result.batch_id.len(), 8);

        let uber = &result.pending_transactions[0];
        assert_eq!(uber.category_id, Some(7));
        assert!(uber.auto_categorized);
        assert_eq!(uber.kind, TransactionKind::Expense);
        assert_eq!(uber.amount, Decimal::from(12_500));
        // 31/Dic with today in January resolves to last year.
        assert_eq!(uber.date, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(uber.import_batch_id, result.batch_id);

        let sueldo = &result.pending_transactions[1];
        assert_eq!(sueldo.kind, TransactionKind::Income);
        assert_eq!(sueldo.amount, Decimal::from(1_500_000));
        assert!(!sueldo.auto_categorized);
    }

    #[tokio::test]
    async fn reimport_is_a_no_op() {
        let mut store = MemStore::default();
        let first = import_statement(&store, 1, STATEMENT, today()).await.unwrap();
        for tx in &first.pending_transactions {
            store.record(tx);
        }

        let second = import_statement(&store, 1, STATEMENT, today()).await.unwrap();
        assert_eq!(second.total_imported, 0);
        assert_eq!(second.duplicates_skipped, first.total_imported);
        assert!(second.pending_transactions.is_empty());
    }

    #[tokio::test]
    async fn repeated_rows_within_one_upload_are_duplicates() {
        let data = b"Fecha;Descripcion;Cargos;Abonos\n\
05/Ene;CAFE LOCAL;3.500;\n\
05/Ene;CAFE LOCAL;3.500;\n";
        let store = MemStore::default();
        let result = import_statement(&store, 1, data, today()).await.unwrap();
        assert_eq!(result.total_imported, 1);
        assert_eq!(result.duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn boilerplate_rows_hit_no_counter() {
        let data = b"Fecha;Descripcion;Cargos;Abonos\n\
05/Ene;SUBTOTAL MOVIMIENTOS;10.000;\n";
        let store = MemStore::default();
        let result = import_statement(&store, 1, data, today()).await.unwrap();
        assert_eq!(result.total_imported, 0);
        assert_eq!(result.duplicates_skipped, 0);
    }

    #[tokio::test]
    async fn amounts_are_positive_two_decimal() {
        let data = b"Fecha;Descripcion;Cargos;Abonos\n\
05/Ene;COMPRA;1.234,56;\n";
        let store = MemStore::default();
        let result = import_statement(&store, 1, data, today()).await.unwrap();
        let tx = &result.pending_transactions[0];
        assert_eq!(tx.amount, Decimal::from_str("1234.56").unwrap());
        assert!(tx.amount > Decimal::ZERO);
        assert!(tx.amount.scale() <= 2);
    }

    #[tokio::test]
    async fn missing_amount_columns_fail_resolution() {
        let data = b"Fecha;Detalle;Monto\n05/Ene;COMPRA;100\n";
        let store = MemStore::default();
        let err = import_statement(&store, 1, data, today()).await.unwrap_err();
        assert!(matches!(err, ImportError::UnresolvedColumns { .. }));
    }

    #[tokio::test]
    async fn unreadable_file_fails() {
        let store = MemStore::default();
        let err = import_statement(&store, 1, b"\x00\x01garbage", today())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::UnrecognizedFormat { .. }));
    }

    #[tokio::test]
    async fn store_failure_surfaces() {
        let err = import_statement(&FailingStore, 1, STATEMENT, today())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Store(_)));
    }

    #[tokio::test]
    async fn result_serializes_to_expected_shape() {
        let store = MemStore::default();
        let result = import_statement(&store, 1, STATEMENT, today()).await.unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_imported"], 3);
        assert_eq!(json["needs_review"], 3);
        assert!(json["pending_transactions"].is_array());
        assert!(json["batch_id"].is_string());
    }
}
