//! Ingestion pipeline orchestrator
//!
//! Runs the five ingestion stages in strict dependency order for one
//! legislative year, inside a single transaction: parties, legislators,
//! expenses, voting sessions + bills, individual votes. The orchestrator is
//! the only place that commits or rolls back; stages just stage rows.

pub mod expenses;
pub mod legislators;
pub mod parties;
pub mod sessions;
pub mod votes;

mod xml;

use crate::services::OpenDataClient;
use anyhow::{Context, Result};
use camara_common::config::DataPaths;
use camara_common::events::ProgressBus;
use camara_common::term::term_for_year;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

/// The five ingestion stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Parties,
    Legislators,
    Expenses,
    SessionsAndBills,
    Votes,
}

impl IngestStage {
    /// Human-readable stage name for logs and failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            IngestStage::Parties => "parties",
            IngestStage::Legislators => "legislators",
            IngestStage::Expenses => "expenses",
            IngestStage::SessionsAndBills => "voting sessions",
            IngestStage::Votes => "individual votes",
        }
    }

    /// Percentage reported once this stage has completed.
    pub fn milestone(&self) -> u8 {
        match self {
            IngestStage::Parties => 25,
            IngestStage::Legislators => 40,
            IngestStage::Expenses => 60,
            IngestStage::SessionsAndBills => 80,
            IngestStage::Votes => 95,
        }
    }
}

/// Keep the first occurrence of every key, preserving input order.
///
/// Duplicate entries across roster pages and merged term rosters carry
/// identical payloads, so dropping later occurrences loses nothing.
pub(crate) fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// One configured ingestion pipeline.
///
/// Owns nothing long-lived itself; each [`run`](IngestPipeline::run) opens
/// the year's store, builds the shared HTTP client, and drives the stages.
pub struct IngestPipeline {
    paths: DataPaths,
}

impl IngestPipeline {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    /// Execute a full ingestion run for one year.
    ///
    /// Returns `true` when every stage committed, `false` on validation
    /// failure or any stage error (the store is rolled back or untouched).
    pub async fn run(&self, year: i32, progress: &ProgressBus) -> bool {
        self.run_with_client(year, None, progress).await
    }

    /// Same as [`run`](IngestPipeline::run) with a caller-provided client
    /// (tests point it at a mock server).
    pub async fn run_with_client(
        &self,
        year: i32,
        client: Option<OpenDataClient>,
        progress: &ProgressBus,
    ) -> bool {
        let run_start = Instant::now();

        progress.log("=".repeat(50));
        progress.log(format!("Starting collection for year {}...", year));
        progress.progress(5);

        let Some(term) = term_for_year(year) else {
            progress.log(format!(
                "ERROR: year {} outside the analyzed range (2011-2027).",
                year
            ));
            tracing::error!(year, "Unsupported year requested");
            return false;
        };

        let db_path = self.paths.database_path(year);
        let pool = match camara_common::db::init_database(&db_path).await {
            Ok(pool) => pool,
            Err(err) => {
                progress.log(format!("CRITICAL ERROR preparing the environment: {}", err));
                tracing::error!(error = %err, "Store preparation failed");
                return false;
            }
        };
        progress.log(format!("Database '{}' is ready.", db_path.display()));

        let client = match client {
            Some(client) => client,
            None => match OpenDataClient::new() {
                Ok(client) => client,
                Err(err) => {
                    progress.log(format!("CRITICAL ERROR preparing the environment: {}", err));
                    tracing::error!(error = %err, "HTTP client construction failed");
                    return false;
                }
            },
        };
        progress.progress(10);

        match self.run_stages(&pool, &client, year, term, progress).await {
            Ok(()) => {
                let total = run_start.elapsed();
                progress.log("=".repeat(50));
                progress.log("Process complete!");
                progress.log(format!(
                    "Total execution time: {:.2} minutes.",
                    total.as_secs_f64() / 60.0
                ));
                progress.progress(100);
                true
            }
            Err(err) => {
                progress.log(format!("ERROR during data collection: {:#}", err));
                tracing::error!(year, error = ?err, "Ingestion run failed, store rolled back");
                false
            }
        }
    }

    /// Run every stage inside one transaction, committing only when all of
    /// them succeed.
    async fn run_stages(
        &self,
        pool: &SqlitePool,
        client: &OpenDataClient,
        year: i32,
        term: i64,
        progress: &ProgressBus,
    ) -> Result<()> {
        let mut tx = pool.begin().await.context("could not open the ingestion transaction")?;

        let result = self
            .execute_stages(&mut *tx, client, year, term, progress)
            .await;

        match result {
            Ok(()) => {
                progress.log("Collection finished. Saving data to the store...");
                tx.commit()
                    .await
                    .context("could not commit the ingestion transaction")?;
                progress.log("Data saved successfully!");
                Ok(())
            }
            Err(err) => {
                // Roll back explicitly; dropping the transaction would too,
                // but the failure path should not look accidental
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    async fn execute_stages(
        &self,
        conn: &mut SqliteConnection,
        client: &OpenDataClient,
        year: i32,
        term: i64,
        progress: &ProgressBus,
    ) -> Result<()> {
        let stage = IngestStage::Parties;
        let stage_start = Instant::now();
        parties::ingest_parties(&mut *conn, client, progress)
            .await
            .with_context(|| format!("stage '{}' failed", stage.label()))?;
        self.finish_stage(stage, stage_start, progress);

        let stage = IngestStage::Legislators;
        let stage_start = Instant::now();
        legislators::ingest_legislators(&mut *conn, client, term, progress)
            .await
            .with_context(|| format!("stage '{}' failed", stage.label()))?;
        self.finish_stage(stage, stage_start, progress);

        let stage = IngestStage::Expenses;
        let stage_start = Instant::now();
        expenses::ingest_expenses(&mut *conn, client, &self.paths.cache_dir, year, progress)
            .await
            .with_context(|| format!("stage '{}' failed", stage.label()))?;
        self.finish_stage(stage, stage_start, progress);

        let stage = IngestStage::SessionsAndBills;
        let stage_start = Instant::now();
        sessions::ingest_sessions(&mut *conn, client, &self.paths.cache_dir, year, progress)
            .await
            .with_context(|| format!("stage '{}' failed", stage.label()))?;
        self.finish_stage(stage, stage_start, progress);

        let stage = IngestStage::Votes;
        let stage_start = Instant::now();
        votes::ingest_votes(&mut *conn, client, year, progress)
            .await
            .with_context(|| format!("stage '{}' failed", stage.label()))?;
        self.finish_stage(stage, stage_start, progress);

        Ok(())
    }

    fn finish_stage(&self, stage: IngestStage, started: Instant, progress: &ProgressBus) {
        let elapsed = started.elapsed();
        progress.log(format!(
            "Stage '{}' finished in {:.2} seconds.\n",
            stage.label(),
            elapsed.as_secs_f64()
        ));
        progress.progress(stage.milestone());
        tracing::info!(
            stage = stage.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Ingestion stage finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let items = vec![(1, "a"), (2, "b"), (1, "c"), (3, "d"), (2, "e")];
        let unique = dedup_by_key(items, |item| item.0);
        assert_eq!(unique, vec![(1, "a"), (2, "b"), (3, "d")]);
    }

    #[test]
    fn stage_milestones_are_monotonic() {
        let stages = [
            IngestStage::Parties,
            IngestStage::Legislators,
            IngestStage::Expenses,
            IngestStage::SessionsAndBills,
            IngestStage::Votes,
        ];
        let mut last = 10; // store preparation milestone
        for stage in stages {
            assert!(stage.milestone() > last, "{} not monotonic", stage.label());
            last = stage.milestone();
        }
        assert!(last < 100);
    }
}
