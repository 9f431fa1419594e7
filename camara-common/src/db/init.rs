//! Per-year database initialization
//!
//! Each legislative year gets its own SQLite store. Initialization is
//! idempotent: tables are created with `IF NOT EXISTS`, so preparing an
//! existing store is a no-op apart from the PRAGMAs.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if necessary) the store at `db_path` and ensure the
/// schema exists.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL keeps readers unblocked while the ingestion transaction is open
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_parties_table(&pool).await?;
    create_legislators_table(&pool).await?;
    create_expenses_table(&pool).await?;
    create_voting_sessions_table(&pool).await?;
    create_bills_table(&pool).await?;
    create_session_bills_table(&pool).await?;
    create_individual_votes_table(&pool).await?;

    Ok(pool)
}

async fn create_parties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL UNIQUE,
            acronym TEXT NOT NULL,
            name TEXT,
            logo_uri TEXT,
            term_id INTEGER,
            status TEXT,
            total_members INTEGER,
            total_sworn_in INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_legislators_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS legislators (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL UNIQUE,
            legal_name TEXT,
            electoral_name TEXT,
            party_acronym TEXT,
            party_id INTEGER REFERENCES parties(id),
            state_code TEXT,
            term_id INTEGER,
            photo_uri TEXT,
            sex TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_legislators_source_id ON legislators(source_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_expenses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            legislator_id INTEGER NOT NULL REFERENCES legislators(id),
            year INTEGER,
            month INTEGER,
            category TEXT,
            net_value REAL NOT NULL,
            document_type TEXT,
            document_uri TEXT,
            supplier_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_expenses_legislator ON expenses(legislator_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_voting_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voting_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL UNIQUE,
            recorded_at TEXT,
            description TEXT,
            organ_acronym TEXT,
            source_uri TEXT,
            approval TEXT,
            last_opening_description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_bills_table(pool: &SqlitePool) -> Result<()> {
    // source_id is TEXT: some upstream bill identifiers are non-numeric
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL UNIQUE,
            type_acronym TEXT,
            year INTEGER,
            summary TEXT,
            presented_at TEXT,
            status TEXT,
            full_text_uri TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_session_bills_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_bills (
            session_id INTEGER NOT NULL REFERENCES voting_sessions(id),
            bill_id INTEGER NOT NULL REFERENCES bills(id),
            PRIMARY KEY (session_id, bill_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_individual_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS individual_votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES voting_sessions(id),
            legislator_id INTEGER NOT NULL REFERENCES legislators(id),
            vote_value TEXT,
            recorded_at TEXT,
            party_acronym TEXT,
            legislator_uri TEXT,
            session_uri TEXT,
            UNIQUE (session_id, legislator_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_votes_session ON individual_votes(session_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
