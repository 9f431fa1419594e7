//! Individual-vote staging and duplicate-pair lookups

use anyhow::Result;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;

/// An individual-vote row ready to stage.
#[derive(Debug, Clone)]
pub struct NewVote {
    pub session_id: i64,
    pub legislator_id: i64,
    pub vote_value: Option<String>,
    pub recorded_at: Option<String>,
    pub party_acronym: Option<String>,
    pub legislator_uri: Option<String>,
    pub session_uri: Option<String>,
}

/// True if any vote row exists (stage short-circuit check).
pub async fn any_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM individual_votes")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Existing (session id, legislator id) pairs for the given sessions.
pub async fn existing_pairs(
    conn: &mut SqliteConnection,
    session_ids: &[i64],
) -> Result<HashSet<(i64, i64)>> {
    let mut pairs = HashSet::new();

    for session_id in session_ids {
        let rows = sqlx::query(
            "SELECT session_id, legislator_id FROM individual_votes WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;

        pairs.extend(
            rows.iter()
                .map(|row| (row.get::<i64, _>("session_id"), row.get::<i64, _>("legislator_id"))),
        );
    }

    Ok(pairs)
}

/// Stage a whole batch of vote rows in one call.
pub async fn insert_batch(conn: &mut SqliteConnection, votes: &[NewVote]) -> Result<()> {
    for vote in votes {
        sqlx::query(
            r#"
            INSERT INTO individual_votes
                (session_id, legislator_id, vote_value, recorded_at,
                 party_acronym, legislator_uri, session_uri)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(vote.session_id)
        .bind(vote.legislator_id)
        .bind(&vote.vote_value)
        .bind(&vote.recorded_at)
        .bind(&vote.party_acronym)
        .bind(&vote.legislator_uri)
        .bind(&vote.session_uri)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Number of persisted vote rows.
pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM individual_votes")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
