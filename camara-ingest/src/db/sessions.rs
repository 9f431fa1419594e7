//! Voting-session, bill, and session-bill link staging

use anyhow::Result;
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};

/// A voting-session row ready to stage.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub source_id: String,
    pub recorded_at: Option<String>,
    pub description: Option<String>,
    pub organ_acronym: Option<String>,
    pub source_uri: Option<String>,
    pub approval: Option<String>,
    pub last_opening_description: Option<String>,
}

/// A bill row ready to stage.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub source_id: String,
    pub type_acronym: Option<String>,
    pub year: Option<i64>,
    pub summary: Option<String>,
    pub presented_at: Option<String>,
    pub status: Option<String>,
    pub full_text_uri: Option<String>,
}

/// A persisted session as seen by the vote stage.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub source_uri: Option<String>,
}

/// True if any session row exists (stage short-circuit check).
pub async fn any_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voting_sessions")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Source ids of every persisted session.
pub async fn existing_source_ids(conn: &mut SqliteConnection) -> Result<HashSet<String>> {
    let rows = sqlx::query("SELECT source_id FROM voting_sessions")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|row| row.get::<String, _>("source_id")).collect())
}

/// Bill source id -> internal id map.
pub async fn bill_source_id_map(conn: &mut SqliteConnection) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query("SELECT id, source_id FROM bills")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("source_id"), row.get::<i64, _>("id")))
        .collect())
}

/// Stage one bill row, returning its internal id.
pub async fn insert_bill(conn: &mut SqliteConnection, bill: &NewBill) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO bills
            (source_id, type_acronym, year, summary, presented_at, status, full_text_uri)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&bill.source_id)
    .bind(&bill.type_acronym)
    .bind(bill.year)
    .bind(&bill.summary)
    .bind(&bill.presented_at)
    .bind(&bill.status)
    .bind(&bill.full_text_uri)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Stage one session row, returning its internal id immediately so link
/// rows can reference it before the transaction commits.
pub async fn insert_session(conn: &mut SqliteConnection, session: &NewSession) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO voting_sessions
            (source_id, recorded_at, description, organ_acronym, source_uri,
             approval, last_opening_description)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.source_id)
    .bind(&session.recorded_at)
    .bind(&session.description)
    .bind(&session.organ_acronym)
    .bind(&session.source_uri)
    .bind(&session.approval)
    .bind(&session.last_opening_description)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Stage one session-bill link.
pub async fn insert_session_bill_link(
    conn: &mut SqliteConnection,
    session_id: i64,
    bill_id: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO session_bills (session_id, bill_id) VALUES (?, ?)")
        .bind(session_id)
        .bind(bill_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Sessions whose recorded timestamp falls within `year`.
pub async fn sessions_for_year(
    conn: &mut SqliteConnection,
    year: i32,
) -> Result<Vec<SessionRow>> {
    let rows = sqlx::query(
        "SELECT id, source_uri FROM voting_sessions WHERE recorded_at LIKE ? ORDER BY id",
    )
    .bind(format!("{}%", year))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SessionRow {
            id: row.get::<i64, _>("id"),
            source_uri: row.get::<Option<String>, _>("source_uri"),
        })
        .collect())
}
