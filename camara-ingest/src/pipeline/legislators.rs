//! Legislator ingestion stage
//!
//! Fetches the paginated legislator roster for one legislative term,
//! deduplicates by source id across pages, enriches each new legislator
//! through the per-item XML detail endpoint, resolves the party foreign key,
//! and stages the rows. Runs after party ingestion.

use crate::db::legislators::{self, NewLegislator};
use crate::db::parties;
use crate::pipeline::dedup_by_key;
use crate::pipeline::xml::{dados_root, descendant_text};
use crate::services::OpenDataClient;
use anyhow::{Context, Result};
use camara_common::events::ProgressBus;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sqlx::SqliteConnection;

const DETAIL_WORKERS: usize = 10;

/// One legislator entry of the paginated term roster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegislatorSummary {
    pub id: i64,
    pub nome: Option<String>,
    pub uri: Option<String>,
    pub sigla_uf: Option<String>,
    pub id_legislatura: Option<i64>,
    pub url_foto: Option<String>,
}

/// Enrichment fields from the legislator detail XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegislatorDetail {
    pub legal_name: Option<String>,
    pub electoral_name: Option<String>,
    pub sex: Option<String>,
    pub party_acronym: Option<String>,
}

/// Parse a legislator detail document. `None` when the document is
/// malformed or lacks the `<dados>` envelope.
pub(crate) fn parse_legislator_detail(xml: &str) -> Option<LegislatorDetail> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let dados = dados_root(&doc)?;

    Some(LegislatorDetail {
        legal_name: descendant_text(dados, "nomeCivil"),
        electoral_name: descendant_text(dados, "nomeEleitoral"),
        sex: descendant_text(dados, "sexo"),
        party_acronym: descendant_text(dados, "siglaPartido"),
    })
}

/// Fetch and stage all legislators of one legislative term.
pub async fn ingest_legislators(
    conn: &mut SqliteConnection,
    client: &OpenDataClient,
    term: i64,
    progress: &ProgressBus,
) -> Result<()> {
    progress.log(format!(
        "-> Fetching legislators for legislative term {}...",
        term
    ));

    if legislators::any_exists(conn).await? {
        progress.log(format!(
            "-> Legislators for term {} already present in the store. Stage complete.",
            term
        ));
        return Ok(());
    }

    // Paginated roster, followed to exhaustion
    let start_url = format!(
        "{}/deputados?idLegislatura={}&itens=100&ordem=ASC&ordenarPor=nome",
        client.api_base(),
        term
    );
    let roster: Vec<LegislatorSummary> = client
        .get_paginated(&start_url)
        .await
        .context("could not fetch the legislator roster")?;

    progress.log(format!(
        "   - Found {} legislator records in the term.",
        roster.len()
    ));

    let unique = dedup_by_key(roster, |legislator| legislator.id);
    progress.log(format!(
        "   - {} unique legislators to process.",
        unique.len()
    ));

    let existing = legislators::existing_source_ids(conn).await?;
    progress.log(format!(
        "   - Found {} legislators already in the store.",
        existing.len()
    ));

    let party_map = parties::acronym_to_id_map(conn).await?;

    let targets: Vec<(LegislatorSummary, String)> = unique
        .into_iter()
        .filter(|legislator| !existing.contains(&legislator.id))
        .filter_map(|legislator| legislator.uri.clone().map(|uri| (legislator, uri)))
        .collect();

    if targets.is_empty() {
        progress.log("-> No new legislators to process.");
        progress.log("-> Legislator processing complete.");
        return Ok(());
    }

    progress.log(format!(
        "   - Fetching details for {} new legislators concurrently...",
        targets.len()
    ));

    let details: Vec<Option<LegislatorDetail>> = stream::iter(targets.iter())
        .map(|(_, uri)| async move {
            match client.get_xml(uri).await {
                Ok(xml) => parse_legislator_detail(&xml),
                Err(err) => {
                    tracing::warn!(uri = %uri, error = %err, "Legislator detail fetch failed");
                    None
                }
            }
        })
        .buffered(DETAIL_WORKERS)
        .collect()
        .await;

    progress.log("   - Combining data and preparing rows...");

    let mut staged = 0usize;
    for ((summary, _), detail) in targets.iter().zip(details) {
        match detail {
            Some(detail) => {
                let party_id = detail
                    .party_acronym
                    .as_deref()
                    .and_then(|acronym| party_map.get(acronym).copied());

                legislators::insert(
                    conn,
                    &NewLegislator {
                        source_id: summary.id,
                        legal_name: detail.legal_name,
                        electoral_name: detail.electoral_name,
                        party_acronym: detail.party_acronym,
                        party_id,
                        state_code: summary.sigla_uf.clone(),
                        term_id: summary.id_legislatura,
                        photo_uri: summary.url_foto.clone(),
                        sex: detail.sex,
                    },
                )
                .await?;
                staged += 1;
            }
            None => {
                progress.log(format!(
                    "  - Failed to fetch details for legislator {}. Skipping.",
                    summary.nome.as_deref().unwrap_or("unknown")
                ));
            }
        }
    }

    tracing::info!(term, staged, "Legislator stage finished");
    progress.log("-> Legislator processing complete.");
    Ok(())
}
