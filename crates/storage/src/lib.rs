pub mod db;

use chrono::NaiveDate;

use gastos_ingest::{import_statement, ImportError, ImportResult};

pub use db::{
    confirm_pending_transactions, create_category, create_db, create_import_rule,
    create_memory_db, create_user, delete_import_rule, delete_pending_transaction,
    exists_recorded_transaction, get_import_rules, get_pending_transactions,
    insert_pending_transaction, update_import_rule, update_pending_category, DbPool, SqliteStore,
};

/// Run the ingestion pipeline over an uploaded statement and persist every
/// emitted candidate as a pending transaction. The returned result carries
/// the assigned row ids.
pub async fn run_statement_import(
    pool: &DbPool,
    user_id: i64,
    bytes: &[u8],
    today: NaiveDate,
) -> Result<ImportResult, ImportError> {
    let store = SqliteStore::new(pool.clone());
    let mut result = import_statement(&store, user_id, bytes, today).await?;
    for tx in &mut result.pending_transactions {
        let id = db::insert_pending_transaction(pool, tx)
            .await
            .map_err(|e| ImportError::Store(e.into()))?;
        tx.id = Some(id);
    }
    Ok(result)
}
