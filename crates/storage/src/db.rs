use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use gastos_core::{
    cents_to_decimal, decimal_to_cents, CandidateTransaction, ImportRule, TransactionKind,
};
use gastos_ingest::ImportStore;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, for tests.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            category_id INTEGER,
            amount_cents INTEGER NOT NULL,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            raw_description TEXT NOT NULL,
            date TEXT NOT NULL,
            auto_categorized INTEGER NOT NULL DEFAULT 0,
            import_batch_id TEXT NOT NULL,
            is_confirmed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn kind_to_str(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Income => "income",
        TransactionKind::Expense => "expense",
    }
}

fn kind_from_str(s: &str) -> TransactionKind {
    match s {
        "income" => TransactionKind::Income,
        _ => TransactionKind::Expense,
    }
}

// ── users & categories ───────────────────────────────────────────────────────

pub async fn create_user(pool: &DbPool, email: &str) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO users (email) VALUES (?)")
        .bind(email)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn create_category(pool: &DbPool, user_id: i64, name: &str) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO categories (user_id, name) VALUES (?, ?)")
        .bind(user_id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

// ── dedup lookup ─────────────────────────────────────────────────────────────

/// Exact-match duplicate check over both the confirmed and the pending
/// store. Matching is deliberately not fuzzy: bank exports are
/// deterministic per statement, so re-importing one must be a no-op.
pub async fn exists_recorded_transaction(
    pool: &DbPool,
    user_id: i64,
    date: NaiveDate,
    amount_cents: i64,
    description: &str,
) -> Result<bool, sqlx::Error> {
    let confirmed: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM transactions
         WHERE user_id = ? AND date = ? AND amount_cents = ? AND description = ?
         LIMIT 1",
    )
    .bind(user_id)
    .bind(date)
    .bind(amount_cents)
    .bind(description)
    .fetch_optional(pool)
    .await?;
    if confirmed.is_some() {
        return Ok(true);
    }

    let pending: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM pending_transactions
         WHERE user_id = ? AND date = ? AND amount_cents = ? AND description = ?
         LIMIT 1",
    )
    .bind(user_id)
    .bind(date)
    .bind(amount_cents)
    .bind(description)
    .fetch_optional(pool)
    .await?;
    Ok(pending.is_some())
}

// ── pending transactions ─────────────────────────────────────────────────────

pub async fn insert_pending_transaction(
    pool: &DbPool,
    tx: &CandidateTransaction,
) -> Result<i64, sqlx::Error> {
    let cents = decimal_to_cents(tx.amount).ok_or_else(|| {
        sqlx::Error::Encode(format!("amount {} exceeds the storable range", tx.amount).into())
    })?;
    let result = sqlx::query(
        "INSERT INTO pending_transactions
         (user_id, category_id, amount_cents, kind, description, raw_description,
          date, auto_categorized, import_batch_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tx.user_id)
    .bind(tx.category_id)
    .bind(cents)
    .bind(kind_to_str(tx.kind))
    .bind(&tx.description)
    .bind(&tx.raw_description)
    .bind(tx.date)
    .bind(tx.auto_categorized)
    .bind(&tx.import_batch_id)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

type PendingRow = (
    i64,
    i64,
    Option<i64>,
    i64,
    String,
    String,
    String,
    NaiveDate,
    i64,
    String,
);

fn pending_from_row(r: PendingRow) -> CandidateTransaction {
    CandidateTransaction {
        id: Some(r.0),
        user_id: r.1,
        category_id: r.2,
        amount: cents_to_decimal(r.3),
        kind: kind_from_str(&r.4),
        description: r.5,
        raw_description: r.6,
        date: r.7,
        auto_categorized: r.8 != 0,
        import_batch_id: r.9,
    }
}

/// Unconfirmed candidates for review, newest date first; optionally scoped
/// to one import batch.
pub async fn get_pending_transactions(
    pool: &DbPool,
    user_id: i64,
    batch_id: Option<&str>,
) -> Result<Vec<CandidateTransaction>, sqlx::Error> {
    let base = "SELECT id, user_id, category_id, amount_cents, kind, description,
                raw_description, date, auto_categorized, import_batch_id
                FROM pending_transactions
                WHERE user_id = ? AND is_confirmed = 0";

    let rows: Vec<PendingRow> = match batch_id {
        Some(batch) => {
            sqlx::query_as(&format!("{base} AND import_batch_id = ? ORDER BY date DESC, id"))
                .bind(user_id)
                .bind(batch)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as(&format!("{base} ORDER BY date DESC, id"))
                .bind(user_id)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(pending_from_row).collect())
}

pub async fn update_pending_category(
    pool: &DbPool,
    transaction_id: i64,
    category_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pending_transactions SET category_id = ?
         WHERE id = ? AND user_id = ? AND is_confirmed = 0",
    )
    .bind(category_id)
    .bind(transaction_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Promote pending candidates to confirmed transactions.
///
/// `assignments` optionally assigns a category per candidate id before
/// confirmation. Candidates still lacking a category are left pending and
/// not counted. Returns the number confirmed.
pub async fn confirm_pending_transactions(
    pool: &DbPool,
    transaction_ids: &[i64],
    user_id: i64,
    assignments: &HashMap<i64, i64>,
) -> Result<usize, sqlx::Error> {
    let mut confirmed = 0;

    for &id in transaction_ids {
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT category_id FROM pending_transactions
             WHERE id = ? AND user_id = ? AND is_confirmed = 0",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        let Some((mut category_id,)) = row else {
            continue;
        };

        if let Some(&assigned) = assignments.get(&id) {
            category_id = Some(assigned);
        }
        let Some(category_id) = category_id else {
            continue;
        };

        // Each promotion commits the confirmed row and the flag together,
        // or neither; a retry after a failure must never double-book.
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO transactions (user_id, category_id, amount_cents, kind, description, date)
             SELECT user_id, ?, amount_cents, kind, description, date
             FROM pending_transactions WHERE id = ?",
        )
        .bind(category_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE pending_transactions SET is_confirmed = 1, category_id = ? WHERE id = ?",
        )
        .bind(category_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        confirmed += 1;
    }

    tracing::debug!(user_id, confirmed, "confirmed pending transactions");
    Ok(confirmed)
}

pub async fn delete_pending_transaction(
    pool: &DbPool,
    transaction_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pending_transactions WHERE id = ? AND user_id = ?")
        .bind(transaction_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── import rules ─────────────────────────────────────────────────────────────

pub async fn create_import_rule(
    pool: &DbPool,
    user_id: i64,
    keyword: &str,
    category_id: i64,
    priority: i32,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO import_rules (user_id, keyword, category_id, priority) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(keyword.to_lowercase())
    .bind(category_id)
    .bind(priority)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Active rules, descending priority; insertion order breaks ties so the
/// rule engine's first-match semantics stay stable.
pub async fn get_import_rules(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<ImportRule>, sqlx::Error> {
    let rows: Vec<(i64, String, i64, i32)> = sqlx::query_as(
        "SELECT id, keyword, category_id, priority FROM import_rules
         WHERE user_id = ? AND is_active = 1
         ORDER BY priority DESC, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, keyword, category_id, priority)| ImportRule {
            id: Some(id),
            keyword,
            category_id,
            priority,
        })
        .collect())
}

pub async fn update_import_rule(
    pool: &DbPool,
    rule_id: i64,
    user_id: i64,
    keyword: &str,
    category_id: i64,
    priority: i32,
    is_active: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE import_rules SET keyword = ?, category_id = ?, priority = ?, is_active = ?
         WHERE id = ? AND user_id = ?",
    )
    .bind(keyword.to_lowercase())
    .bind(category_id)
    .bind(priority)
    .bind(is_active)
    .bind(rule_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_import_rule(
    pool: &DbPool,
    rule_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM import_rules WHERE id = ? AND user_id = ?")
        .bind(rule_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── pipeline store seam ──────────────────────────────────────────────────────

/// Pipeline-facing handle over the SQLite pool. The pool itself is foreign
/// to this crate, so the `ImportStore` impl lives on this wrapper.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl ImportStore for SqliteStore {
    async fn exists_recorded_transaction(
        &self,
        user_id: i64,
        date: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> anyhow::Result<bool> {
        // An amount too large for integer cents cannot be stored, so it
        // cannot already be recorded either.
        let Some(cents) = decimal_to_cents(amount) else {
            return Ok(false);
        };
        Ok(exists_recorded_transaction(&self.pool, user_id, date, cents, description).await?)
    }

    async fn list_import_rules(&self, user_id: i64) -> anyhow::Result<Vec<ImportRule>> {
        Ok(get_import_rules(&self.pool, user_id).await?)
    }
}
