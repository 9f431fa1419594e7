//! Voting-session and bill ingestion stage
//!
//! Downloads the year's bulk session file (cached on disk), discovers the
//! bills each new session references through the per-session detail XML,
//! enriches unknown bills through the per-bill JSON endpoint, and stages
//! sessions, bills, and the session-bill links. Sessions are flushed one by
//! one because link rows need the session's internal id before commit.

use crate::db::sessions::{self as sessions_db, NewBill, NewSession};
use crate::services::OpenDataClient;
use anyhow::{Context, Result};
use camara_common::events::ProgressBus;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Sessions only need their detail XML skimmed for bill ids, so this pool
/// runs wider than the enrichment pools.
const SESSION_DETAIL_WORKERS: usize = 25;
const BILL_DETAIL_WORKERS: usize = 10;

/// One session entry of the bulk session file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub uri: Option<String>,
    pub data_hora_registro: Option<String>,
    pub descricao: Option<String>,
    pub sigla_orgao: Option<String>,
    pub aprovacao: Option<i64>,
    pub ultima_abertura_votacao: Option<LastOpening>,
}

/// Nested "last opening" object of a session record.
#[derive(Debug, Clone, Deserialize)]
pub struct LastOpening {
    pub descricao: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionFile {
    dados: Vec<SessionRecord>,
}

/// Bill detail payload (`dados` object of the bill endpoint).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDetail {
    pub sigla_tipo: Option<String>,
    pub ano: Option<i64>,
    pub ementa: Option<String>,
    pub data_apresentacao: Option<String>,
    pub status_proposicao: Option<BillStatus>,
    pub url_inteiro_teor: Option<String>,
}

/// Nested status object of a bill detail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillStatus {
    pub descricao_situacao: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope<T> {
    dados: T,
}

/// Pull the affected-bill source ids out of a session detail document.
/// Any parse problem yields an empty list, never an error.
pub(crate) fn extract_bill_ids(xml: &str) -> Vec<String> {
    let Ok(doc) = roxmltree::Document::parse(xml) else {
        return Vec::new();
    };

    doc.descendants()
        .filter(|node| {
            node.has_tag_name("id")
                && node
                    .parent()
                    .map_or(false, |parent| parent.has_tag_name("proposicoesAfetadas"))
        })
        .filter_map(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Make sure the year's bulk session JSON exists locally.
async fn ensure_sessions_file(
    client: &OpenDataClient,
    cache_dir: &Path,
    year: i32,
    progress: &ProgressBus,
) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;

    let json_path = cache_dir.join(format!("votacoes_{}.json", year));
    if json_path.exists() {
        progress.log(format!(
            "   - File '{}' already exists locally.",
            json_path.display()
        ));
        return Ok(json_path);
    }

    progress.log(format!(
        "   - Downloading the voting-session file for year {}...",
        year
    ));
    let url = format!(
        "{}/votacoes/json/votacoes-{}.json",
        client.bulk_files_base(),
        year
    );
    client
        .download_to_file(&url, &json_path)
        .await
        .with_context(|| format!("could not download the session file for year {}", year))?;
    progress.log(format!("   - File saved to '{}'", json_path.display()));

    Ok(json_path)
}

fn record_to_new_session(record: &SessionRecord) -> NewSession {
    NewSession {
        source_id: record.id.clone(),
        recorded_at: record.data_hora_registro.clone(),
        description: record.descricao.clone(),
        organ_acronym: record.sigla_orgao.clone(),
        source_uri: record.uri.clone(),
        approval: record.aprovacao.map(|value| value.to_string()),
        last_opening_description: record
            .ultima_abertura_votacao
            .as_ref()
            .and_then(|opening| opening.descricao.clone()),
    }
}

/// Fetch and stage all voting sessions, bills, and links for one year.
pub async fn ingest_sessions(
    conn: &mut SqliteConnection,
    client: &OpenDataClient,
    cache_dir: &Path,
    year: i32,
    progress: &ProgressBus,
) -> Result<()> {
    progress.log(format!(
        "-> Starting voting-session processing for year {}...",
        year
    ));

    if sessions_db::any_exists(conn).await? {
        progress.log(format!(
            "-> Sessions for year {} already present in the store. Stage complete.",
            year
        ));
        return Ok(());
    }

    let json_path = ensure_sessions_file(client, cache_dir, year, progress).await?;

    let text = std::fs::read_to_string(&json_path)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let parsed: SessionFile = serde_json::from_str(text)
        .with_context(|| format!("session file '{}' is not valid JSON", json_path.display()))?;

    progress.log(format!(
        "   - Found {} sessions in the {} file.",
        parsed.dados.len(),
        year
    ));

    let existing_sessions = sessions_db::existing_source_ids(conn).await?;
    let mut known_bills = sessions_db::bill_source_id_map(conn).await?;

    let to_process: Vec<SessionRecord> = parsed
        .dados
        .into_iter()
        .filter(|session| !existing_sessions.contains(&session.id))
        .collect();

    if to_process.is_empty() {
        progress.log("-> No new voting sessions to add.");
        return Ok(());
    }

    // Discover referenced bills session by session; the result vector is
    // index-aligned with `to_process`
    progress.log(format!(
        "   - Discovering affected bills for {} new sessions...",
        to_process.len()
    ));
    let bill_id_lists: Vec<Vec<String>> = stream::iter(to_process.iter())
        .map(|session| async move {
            match &session.uri {
                Some(uri) => match client.get_xml(uri).await {
                    Ok(xml) => extract_bill_ids(&xml),
                    Err(err) => {
                        tracing::warn!(
                            session = %session.id,
                            error = %err,
                            "Session detail fetch failed, no bills discovered"
                        );
                        Vec::new()
                    }
                },
                None => Vec::new(),
            }
        })
        .buffered(SESSION_DETAIL_WORKERS)
        .collect()
        .await;

    // Bill ids nobody has seen yet, in first-seen order
    let mut unknown_bills: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for bill_ids in &bill_id_lists {
        for bill_id in bill_ids {
            if !known_bills.contains_key(bill_id) && seen.insert(bill_id.clone()) {
                unknown_bills.push(bill_id.clone());
            }
        }
    }

    if !unknown_bills.is_empty() {
        progress.log(format!(
            "   - Fetching details for {} new bills...",
            unknown_bills.len()
        ));

        let details: Vec<Option<BillDetail>> = stream::iter(unknown_bills.iter())
            .map(|bill_id| async move {
                let url = format!("{}/proposicoes/{}", client.api_base(), bill_id);
                match client.get_json::<DetailEnvelope<BillDetail>>(&url).await {
                    Ok(envelope) => Some(envelope.dados),
                    Err(err) => {
                        tracing::warn!(bill_id = %bill_id, error = %err, "Bill detail fetch failed");
                        None
                    }
                }
            })
            .buffered(BILL_DETAIL_WORKERS)
            .collect()
            .await;

        for (bill_id, detail) in unknown_bills.iter().zip(details) {
            let Some(detail) = detail else {
                continue;
            };
            // First-seen wins when the same bill surfaced from two sessions
            if known_bills.contains_key(bill_id) {
                continue;
            }

            let internal_id = sessions_db::insert_bill(
                conn,
                &NewBill {
                    source_id: bill_id.clone(),
                    type_acronym: detail.sigla_tipo,
                    year: detail.ano,
                    summary: detail.ementa,
                    presented_at: detail.data_apresentacao,
                    status: detail
                        .status_proposicao
                        .and_then(|status| status.descricao_situacao),
                    full_text_uri: detail.url_inteiro_teor,
                },
            )
            .await?;
            known_bills.insert(bill_id.clone(), internal_id);
        }
    }

    progress.log(format!(
        "   - Adding {} new sessions and their links...",
        to_process.len()
    ));

    for (record, bill_ids) in to_process.iter().zip(&bill_id_lists) {
        let session_id = sessions_db::insert_session(conn, &record_to_new_session(record)).await?;

        let mut linked: HashSet<&str> = HashSet::new();
        for bill_source_id in bill_ids {
            if !linked.insert(bill_source_id.as_str()) {
                continue;
            }
            match known_bills.get(bill_source_id) {
                Some(&bill_id) => {
                    sessions_db::insert_session_bill_link(conn, session_id, bill_id).await?;
                }
                None => {
                    tracing::warn!(
                        session = %record.id,
                        bill_id = %bill_source_id,
                        "Bill unknown at link time, skipping link"
                    );
                }
            }
        }
    }

    progress.log("-> Voting-session processing complete.");
    Ok(())
}
