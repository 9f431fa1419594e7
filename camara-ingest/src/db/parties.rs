//! Party staging and lookups

use anyhow::Result;
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};

/// A party row ready to stage.
#[derive(Debug, Clone)]
pub struct NewParty {
    pub source_id: i64,
    pub acronym: String,
    pub name: Option<String>,
    pub logo_uri: Option<String>,
    pub term_id: Option<i64>,
    pub status: Option<String>,
    pub total_members: Option<i64>,
    pub total_sworn_in: Option<i64>,
}

/// True if any party row exists (stage short-circuit check).
pub async fn any_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parties")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Source ids of every persisted party.
pub async fn existing_source_ids(conn: &mut SqliteConnection) -> Result<HashSet<i64>> {
    let rows = sqlx::query("SELECT source_id FROM parties")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("source_id")).collect())
}

/// Acronym -> internal id map for legislator foreign-key resolution.
pub async fn acronym_to_id_map(conn: &mut SqliteConnection) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query("SELECT id, acronym FROM parties")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("acronym"), row.get::<i64, _>("id")))
        .collect())
}

/// Stage one party row.
pub async fn insert(conn: &mut SqliteConnection, party: &NewParty) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO parties
            (source_id, acronym, name, logo_uri, term_id, status, total_members, total_sworn_in)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(party.source_id)
    .bind(&party.acronym)
    .bind(&party.name)
    .bind(&party.logo_uri)
    .bind(party.term_id)
    .bind(&party.status)
    .bind(party.total_members)
    .bind(party.total_sworn_in)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
