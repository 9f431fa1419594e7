//! Expense staging

use anyhow::Result;
use sqlx::SqliteConnection;

/// An expense row ready to stage. Rows only reach this type with a
/// resolved legislator foreign key and a present net value.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub legislator_id: i64,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub category: Option<String>,
    pub net_value: f64,
    pub document_type: Option<String>,
    pub document_uri: Option<String>,
    pub supplier_name: Option<String>,
}

/// True if any expense row exists (stage short-circuit check).
pub async fn any_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Stage a whole batch of expense rows in one call.
pub async fn insert_batch(conn: &mut SqliteConnection, expenses: &[NewExpense]) -> Result<()> {
    for expense in expenses {
        sqlx::query(
            r#"
            INSERT INTO expenses
                (legislator_id, year, month, category, net_value,
                 document_type, document_uri, supplier_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.legislator_id)
        .bind(expense.year)
        .bind(expense.month)
        .bind(&expense.category)
        .bind(expense.net_value)
        .bind(&expense.document_type)
        .bind(&expense.document_uri)
        .bind(&expense.supplier_name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Number of persisted expense rows.
pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
