//! Read-only access to the SQLite transaction store.
//!
//! The store handle is opened once at pipeline start, passed explicitly to
//! every stage that needs it, and closed at pipeline end.

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{
    DatasetSummary, Dimension, DimensionValue, FromDimensions, GroupAggregate, Transaction,
    EXPECTED_COLUMNS,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, warn};

/// `amount` as a real, or NULL when the stored value is not numeric.
const AMOUNT_EXPR: &str = "\
CASE
    WHEN typeof(amount) IN ('integer', 'real') THEN CAST(amount AS REAL)
    WHEN typeof(amount) = 'text'
         AND trim(amount) GLOB '*[0-9]*'
         AND NOT trim(amount) GLOB '*[^0-9.eE+-]*' THEN CAST(trim(amount) AS REAL)
END";

/// 1 for any non-zero fraud flag, else 0.
const FRAUD_FLAG_EXPR: &str = "CASE WHEN CAST(fraud AS INTEGER) != 0 THEN 1 ELSE 0 END";

fn snapshot_query() -> String {
    format!(
        "SELECT CAST(step AS INTEGER) AS step, \
         COALESCE(CAST(customer AS TEXT), '') AS customer, \
         COALESCE(CAST(age AS TEXT), '') AS age, \
         COALESCE(CAST(gender AS TEXT), '') AS gender, \
         COALESCE(CAST(merchant AS TEXT), '') AS merchant, \
         COALESCE(CAST(category AS TEXT), '') AS category, \
         {AMOUNT_EXPR} AS amount, \
         {FRAUD_FLAG_EXPR} AS fraud \
         FROM transactions \
         ORDER BY rowid"
    )
}

fn summary_query() -> String {
    format!(
        "SELECT COUNT(*) AS total_transactions, \
         COUNT(DISTINCT customer) AS unique_customers, \
         COUNT(DISTINCT merchant) AS unique_merchants, \
         COALESCE(SUM({AMOUNT_EXPR}), 0.0) AS total_amount, \
         COALESCE(SUM({FRAUD_FLAG_EXPR}), 0) AS fraud_count \
         FROM transactions \
         WHERE ({AMOUNT_EXPR}) IS NOT NULL AND step IS NOT NULL"
    )
}

/// Raw snapshot row, before cleaning.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    step: Option<i64>,
    customer: String,
    age: String,
    gender: String,
    merchant: String,
    category: String,
    amount: Option<f64>,
    fraud: i64,
}

impl TransactionRow {
    /// Rows without a step or amount cannot be analysed.
    fn into_transaction(self) -> Option<Transaction> {
        Some(Transaction {
            step: self.step?,
            customer: self.customer,
            age: self.age,
            gender: self.gender,
            merchant: self.merchant,
            category: self.category,
            amount: self.amount?,
            fraud: self.fraud != 0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    total_transactions: i64,
    unique_customers: i64,
    unique_merchants: i64,
    total_amount: f64,
    fraud_count: i64,
}

/// Totals for one combination of dimension values.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotals {
    pub values: Vec<DimensionValue>,
    pub transaction_count: u64,
    pub total_amount: f64,
    pub fraud_count: u64,
}

/// Scope-owned handle to the transaction table.
pub struct TransactionStore {
    pool: SqlitePool,
    location: String,
}

impl TransactionStore {
    /// Open the database read-only and validate the `transactions` schema.
    pub async fn open(path: &Path) -> AnalysisResult<Self> {
        let location = path.display().to_string();
        info!("Opening transaction store: {}", location);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AnalysisError::source_unavailable(&location, e))?;

        let store = Self { pool, location };
        store.verify_schema().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&store.pool)
            .await
            .map_err(|e| store.unavailable(e))?;
        info!("Connected. {} transactions in store", count);

        Ok(store)
    }

    /// Release the connection pool.
    pub async fn close(self) {
        debug!("Closing transaction store: {}", self.location);
        self.pool.close().await;
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn unavailable(&self, source: sqlx::Error) -> AnalysisError {
        AnalysisError::source_unavailable(&self.location, source)
    }

    async fn verify_schema(&self) -> AnalysisResult<()> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('transactions')")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| self.unavailable(e))?;

        let missing: Vec<String> = EXPECTED_COLUMNS
            .iter()
            .filter(|expected| !columns.iter().any(|c| c == *expected))
            .map(|c| c.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(AnalysisError::SchemaMismatch { missing });
        }
        Ok(())
    }

    /// Load every analysable transaction in insertion order.
    pub async fn load_snapshot(&self) -> AnalysisResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&snapshot_query())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.unavailable(e))?;

        let total = rows.len();
        let transactions: Vec<Transaction> = rows
            .into_iter()
            .filter_map(TransactionRow::into_transaction)
            .collect();

        if transactions.len() < total {
            warn!(
                "Dropped {} rows with missing step or amount",
                total - transactions.len()
            );
        }
        info!("Loaded {} transactions", transactions.len());
        Ok(transactions)
    }

    /// Whole-table counts, distinct entities, volume and fraud totals.
    pub async fn summary(&self) -> AnalysisResult<DatasetSummary> {
        let row = sqlx::query_as::<_, SummaryRow>(&summary_query())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(DatasetSummary {
            total_transactions: row.total_transactions.max(0) as u64,
            unique_customers: row.unique_customers.max(0) as u64,
            unique_merchants: row.unique_merchants.max(0) as u64,
            total_amount: row.total_amount,
            fraud_count: row.fraud_count.max(0) as u64,
        })
    }

    /// Run `GROUP BY` over the given dimensions, ordered by the dimensions.
    pub async fn group_totals(&self, dimensions: &[Dimension]) -> AnalysisResult<Vec<GroupTotals>> {
        let query = group_query(dimensions);
        debug!("Group query: {}", query);

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.unavailable(e))?;

        rows.iter()
            .map(|row| decode_group_row(row, dimensions).map_err(|e| self.unavailable(e)))
            .collect()
    }

    /// Group aggregates for a dimension-backed key, computed by the store.
    pub async fn aggregate_by<K: FromDimensions>(&self) -> AnalysisResult<Vec<GroupAggregate<K>>> {
        let totals = self.group_totals(K::DIMENSIONS).await?;

        let groups: Vec<GroupAggregate<K>> = totals
            .into_iter()
            .filter_map(|t| {
                let key = K::from_values(&t.values)?;
                Some(GroupAggregate {
                    key,
                    transaction_count: t.transaction_count,
                    total_amount: t.total_amount,
                    fraud_count: t.fraud_count,
                })
            })
            .collect();

        debug!(
            "Store grouped {} rows by {:?}",
            groups.len(),
            K::DIMENSIONS
        );
        Ok(groups)
    }
}

fn group_query(dimensions: &[Dimension]) -> String {
    let select: Vec<String> = dimensions
        .iter()
        .map(|d| {
            if d.is_integer() {
                format!("CAST({0} AS INTEGER) AS {0}", d.column())
            } else {
                format!("COALESCE(CAST({0} AS TEXT), '') AS {0}", d.column())
            }
        })
        .collect();
    let positions = (1..=dimensions.len())
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {}, COUNT(*) AS transaction_count, \
         COALESCE(SUM({AMOUNT_EXPR}), 0.0) AS total_amount, \
         COALESCE(SUM({FRAUD_FLAG_EXPR}), 0) AS fraud_count \
         FROM transactions \
         WHERE ({AMOUNT_EXPR}) IS NOT NULL AND step IS NOT NULL \
         GROUP BY {positions} ORDER BY {positions}",
        select.join(", ")
    )
}

fn decode_group_row(row: &SqliteRow, dimensions: &[Dimension]) -> Result<GroupTotals, sqlx::Error> {
    let mut values = Vec::with_capacity(dimensions.len());
    for (i, dimension) in dimensions.iter().enumerate() {
        let value = if dimension.is_integer() {
            DimensionValue::Int(row.try_get::<i64, _>(i)?)
        } else {
            DimensionValue::Text(row.try_get::<String, _>(i)?)
        };
        values.push(value);
    }

    let transaction_count: i64 = row.try_get("transaction_count")?;
    let total_amount: f64 = row.try_get("total_amount")?;
    let fraud_count: i64 = row.try_get("fraud_count")?;

    Ok(GroupTotals {
        values,
        transaction_count: transaction_count.max(0) as u64,
        total_amount,
        fraud_count: fraud_count.max(0) as u64,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for building scratch databases in tests.

    use crate::models::Transaction;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::path::Path;

    const FIXTURE: &str = include_str!("../../fixtures/transactions.csv");

    /// The bundled fixture dataset.
    pub fn fixture_transactions() -> Vec<Transaction> {
        let mut reader = csv::Reader::from_reader(FIXTURE.as_bytes());
        reader
            .deserialize()
            .collect::<Result<Vec<Transaction>, _>>()
            .unwrap()
    }

    pub fn tx(step: i64, customer: &str, category: &str, amount: f64, fraud: bool) -> Transaction {
        Transaction {
            step,
            customer: customer.to_string(),
            age: "2".to_string(),
            gender: "F".to_string(),
            merchant: "M1".to_string(),
            category: category.to_string(),
            amount,
            fraud,
        }
    }

    /// Create a `transactions` table at `path` and insert the rows.
    pub async fn seed_database(path: &Path, transactions: &[Transaction]) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE transactions (
                step INTEGER, customer TEXT, age TEXT, gender TEXT,
                merchant TEXT, category TEXT, amount REAL, fraud INTEGER
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        for t in transactions {
            sqlx::query("INSERT INTO transactions VALUES (?, ?, ?, ?, ?, ?, ?, ?)")
                .bind(t.step)
                .bind(&t.customer)
                .bind(&t.age)
                .bind(&t.gender)
                .bind(&t.merchant)
                .bind(&t.category)
                .bind(t.amount)
                .bind(t.fraud as i64)
                .execute(&pool)
                .await
                .unwrap();
        }

        pool.close().await;
    }

    /// Run raw statements against an existing scratch database.
    pub async fn execute_raw(path: &Path, statements: &[&str]) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }

        pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{execute_raw, fixture_transactions, seed_database, tx};
    use super::*;
    use crate::analysis::aggregate;
    use crate::models::{Category, Demographic, Step};
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let result = TransactionStore::open(&temp_dir.path().join("absent.db")).await;

        assert!(matches!(
            result,
            Err(AnalysisError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.db");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE transactions (step INTEGER, customer TEXT, amount REAL)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        match TransactionStore::open(&path).await {
            Err(AnalysisError::SchemaMismatch { missing }) => {
                assert_eq!(missing, vec!["age", "gender", "merchant", "category", "fraud"]);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected schema mismatch"),
        }
    }

    #[tokio::test]
    async fn test_load_snapshot_and_summary() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bank.db");
        let rows = vec![
            tx(0, "C1", "A", 10.0, false),
            tx(0, "C2", "A", 10.0, false),
            tx(1, "C1", "A", 1000.0, true),
        ];
        seed_database(&path, &rows).await;

        let store = TransactionStore::open(&path).await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        let summary = store.summary().await.unwrap();
        store.close().await;

        assert_eq!(snapshot, rows);
        assert_eq!(summary.total_transactions, 3);
        assert_eq!(summary.unique_customers, 2);
        assert_eq!(summary.unique_merchants, 1);
        assert_eq!(summary.total_amount, 1020.0);
        assert_eq!(summary.fraud_count, 1);
    }

    #[tokio::test]
    async fn test_store_grouping_matches_engine() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bank.db");
        let rows = fixture_transactions();
        seed_database(&path, &rows).await;

        let store = TransactionStore::open(&path).await.unwrap();
        let by_category = store.aggregate_by::<Category>().await.unwrap();
        let by_demographic = store.aggregate_by::<Demographic>().await.unwrap();
        let by_step = store.aggregate_by::<Step>().await.unwrap();
        store.close().await;

        let expected_category = aggregate(&rows, Category::of);
        assert_eq!(by_category.len(), expected_category.len());
        for (sql, engine) in by_category.iter().zip(&expected_category) {
            assert_eq!(sql.key, engine.key);
            assert_eq!(sql.transaction_count, engine.transaction_count);
            assert_eq!(sql.fraud_count, engine.fraud_count);
            assert!((sql.total_amount - engine.total_amount).abs() < 1e-6);
        }

        assert_eq!(by_demographic.len(), aggregate(&rows, Demographic::of).len());
        assert_eq!(
            by_step.iter().map(|g| g.key).collect::<Vec<_>>(),
            aggregate(&rows, Step::of)
                .iter()
                .map(|g| g.key)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_irregular_values_agree_across_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("irregular.db");
        seed_database(&path, &[tx(0, "C1", "A", 10.0, false)]).await;
        execute_raw(
            &path,
            &[
                "INSERT INTO transactions VALUES (1, 'C2', '2', 'F', 'M1', 'B', 50.0, 2)",
                "INSERT INTO transactions VALUES (1, 'C3', '2', 'F', 'M1', 'B', '25', 1)",
                "INSERT INTO transactions VALUES (2, 'C4', '2', 'F', 'M1', 'A', 'n/a', 1)",
                "INSERT INTO transactions VALUES (2, 'C5', '2', 'F', 'M1', 'A', NULL, 0)",
            ],
        )
        .await;

        let store = TransactionStore::open(&path).await.unwrap();
        let snapshot = store.load_snapshot().await.unwrap();
        let by_category = store.aggregate_by::<Category>().await.unwrap();
        let summary = store.summary().await.unwrap();
        store.close().await;

        assert_eq!(snapshot.len(), 3);
        assert!(snapshot[1].fraud);
        assert_eq!(snapshot[2].amount, 25.0);

        let engine = aggregate(&snapshot, Category::of);
        assert_eq!(by_category.len(), engine.len());
        for (sql, expected) in by_category.iter().zip(&engine) {
            assert_eq!(sql.key, expected.key);
            assert_eq!(sql.transaction_count, expected.transaction_count);
            assert_eq!(sql.fraud_count, expected.fraud_count);
            assert!(sql.fraud_count <= sql.transaction_count);
            assert_eq!(sql.total_amount, expected.total_amount);
        }
        assert_eq!(by_category[1].fraud_count, 2);
        assert_eq!(by_category[1].fraud_rate(), 100.0);

        assert_eq!(summary.total_transactions, 3);
        assert_eq!(summary.fraud_count, 2);
        assert_eq!(summary.total_amount, 85.0);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.db");
        seed_database(&path, &[]).await;

        let store = TransactionStore::open(&path).await.unwrap();
        assert!(store.load_snapshot().await.unwrap().is_empty());
        assert!(store.aggregate_by::<Category>().await.unwrap().is_empty());
        assert_eq!(store.summary().await.unwrap(), DatasetSummary::default());
        store.close().await;
    }

    #[test]
    fn test_group_query_shape() {
        let query = group_query(&[Dimension::Age, Dimension::Gender]);
        assert!(query.contains("AS age"));
        assert!(query.contains("AS gender"));
        assert!(query.contains("GROUP BY 1, 2 ORDER BY 1, 2"));
        assert!(!query.contains("SUM(CAST(fraud"));
    }
}
