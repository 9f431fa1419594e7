//! Legislator staging and lookups

use anyhow::Result;
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};

/// A legislator row ready to stage.
#[derive(Debug, Clone)]
pub struct NewLegislator {
    pub source_id: i64,
    pub legal_name: Option<String>,
    pub electoral_name: Option<String>,
    pub party_acronym: Option<String>,
    /// Resolved party foreign key; None when the acronym is unknown
    pub party_id: Option<i64>,
    pub state_code: Option<String>,
    pub term_id: Option<i64>,
    pub photo_uri: Option<String>,
    pub sex: Option<String>,
}

/// Minimal legislator view used for vote resolution.
#[derive(Debug, Clone)]
pub struct LegislatorRef {
    pub id: i64,
    pub party_acronym: Option<String>,
}

/// True if any legislator row exists (stage short-circuit check).
pub async fn any_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM legislators")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Source ids of every persisted legislator.
pub async fn existing_source_ids(conn: &mut SqliteConnection) -> Result<HashSet<i64>> {
    let rows = sqlx::query("SELECT source_id FROM legislators")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("source_id")).collect())
}

/// Source id -> internal id map for expense foreign-key resolution.
pub async fn source_id_to_id_map(conn: &mut SqliteConnection) -> Result<HashMap<i64, i64>> {
    let rows = sqlx::query("SELECT id, source_id FROM legislators")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<i64, _>("source_id"), row.get::<i64, _>("id")))
        .collect())
}

/// Source id -> (internal id, party acronym) map for vote resolution.
pub async fn source_id_to_ref_map(
    conn: &mut SqliteConnection,
) -> Result<HashMap<i64, LegislatorRef>> {
    let rows = sqlx::query("SELECT id, source_id, party_acronym FROM legislators")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<i64, _>("source_id"),
                LegislatorRef {
                    id: row.get::<i64, _>("id"),
                    party_acronym: row.get::<Option<String>, _>("party_acronym"),
                },
            )
        })
        .collect())
}

/// Stage one legislator row.
pub async fn insert(conn: &mut SqliteConnection, legislator: &NewLegislator) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO legislators
            (source_id, legal_name, electoral_name, party_acronym, party_id,
             state_code, term_id, photo_uri, sex)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(legislator.source_id)
    .bind(&legislator.legal_name)
    .bind(&legislator.electoral_name)
    .bind(&legislator.party_acronym)
    .bind(legislator.party_id)
    .bind(&legislator.state_code)
    .bind(legislator.term_id)
    .bind(&legislator.photo_uri)
    .bind(&legislator.sex)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
