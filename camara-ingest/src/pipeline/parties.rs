//! Party ingestion stage
//!
//! Merges the party rosters of every supported legislative term,
//! deduplicates by source id, enriches new parties through the per-item XML
//! detail endpoint, and stages one row per successfully enriched party.

use crate::db::parties::{self, NewParty};
use crate::pipeline::dedup_by_key;
use crate::pipeline::xml::{dados_root, descendant_text, parse_int};
use crate::services::{Listing, OpenDataClient};
use anyhow::Result;
use camara_common::events::ProgressBus;
use camara_common::term::TARGET_TERMS;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sqlx::SqliteConnection;

const DETAIL_WORKERS: usize = 10;

/// One party entry of the term roster listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PartySummary {
    pub id: i64,
    pub sigla: String,
    pub nome: Option<String>,
    pub uri: Option<String>,
}

/// Enrichment fields from the party detail XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyDetail {
    pub logo_uri: Option<String>,
    pub term_id: Option<i64>,
    pub status: Option<String>,
    pub total_members: Option<i64>,
    pub total_sworn_in: Option<i64>,
}

/// Parse a party detail document. `None` when the document is malformed or
/// lacks the `<dados>` envelope.
pub(crate) fn parse_party_detail(xml: &str) -> Option<PartyDetail> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let dados = dados_root(&doc)?;

    Some(PartyDetail {
        logo_uri: descendant_text(dados, "urlLogo"),
        term_id: parse_int(descendant_text(dados, "idLegislatura").as_deref()),
        status: descendant_text(dados, "situacao"),
        total_members: parse_int(descendant_text(dados, "totalMembros").as_deref()),
        total_sworn_in: parse_int(descendant_text(dados, "totalPosse").as_deref()),
    })
}

/// Fetch and stage all parties for the supported terms.
pub async fn ingest_parties(
    conn: &mut SqliteConnection,
    client: &OpenDataClient,
    progress: &ProgressBus,
) -> Result<()> {
    progress.log("-> Fetching parties for the legislative terms from 2011 onward...");

    if parties::any_exists(conn).await? {
        progress.log("-> Parties already present in the store. Stage complete.");
        return Ok(());
    }

    // Merge the rosters of all four terms; one large page per term suffices
    let mut aggregated: Vec<PartySummary> = Vec::new();
    for term in TARGET_TERMS {
        progress.log(format!("   - Fetching parties of term {}...", term));
        let url = format!(
            "{}/partidos?idLegislatura={}&itens=1000&ordem=ASC&ordenarPor=sigla",
            client.api_base(),
            term
        );
        match client.get_json::<Listing<PartySummary>>(&url).await {
            Ok(page) => aggregated.extend(page.dados),
            Err(err) => {
                progress.log(format!(
                    "   - WARNING: failed to fetch parties of term {}. Continuing. Error: {}",
                    term, err
                ));
                tracing::warn!(term, error = %err, "Party roster fetch failed");
            }
        }
    }

    progress.log(format!(
        "   - Initial collection finished. {} party records found.",
        aggregated.len()
    ));

    let unique = dedup_by_key(aggregated, |party| party.id);
    progress.log(format!(
        "   - {} unique parties identified in the period.",
        unique.len()
    ));

    let existing = parties::existing_source_ids(conn).await?;
    let new_parties: Vec<PartySummary> = unique
        .into_iter()
        .filter(|party| !existing.contains(&party.id))
        .collect();

    if new_parties.is_empty() {
        progress.log("-> No new parties to add. Table is already up to date.");
        progress.log("-> Party processing complete.");
        return Ok(());
    }

    let targets: Vec<(PartySummary, String)> = new_parties
        .into_iter()
        .filter_map(|party| party.uri.clone().map(|uri| (party, uri)))
        .collect();

    progress.log(format!(
        "   - Fetching details for {} new parties concurrently...",
        targets.len()
    ));

    let details: Vec<Option<PartyDetail>> = stream::iter(targets.iter())
        .map(|(_, uri)| async move {
            match client.get_xml(uri).await {
                Ok(xml) => parse_party_detail(&xml),
                Err(err) => {
                    tracing::warn!(uri = %uri, error = %err, "Party detail fetch failed");
                    None
                }
            }
        })
        .buffered(DETAIL_WORKERS)
        .collect()
        .await;

    let mut staged = 0usize;
    for ((summary, _), detail) in targets.iter().zip(details) {
        match detail {
            Some(detail) => {
                parties::insert(
                    conn,
                    &NewParty {
                        source_id: summary.id,
                        acronym: summary.sigla.clone(),
                        name: summary.nome.clone(),
                        logo_uri: detail.logo_uri,
                        term_id: detail.term_id,
                        status: detail.status,
                        total_members: detail.total_members,
                        total_sworn_in: detail.total_sworn_in,
                    },
                )
                .await?;
                staged += 1;
            }
            None => {
                progress.log(format!(
                    "  - Failed to fetch details for party {}. Skipping.",
                    summary.sigla
                ));
            }
        }
    }

    tracing::info!(staged, "Party stage finished");
    progress.log("-> Party processing complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTY_XML: &str = r#"<?xml version="1.0"?>
        <xml>
          <dados>
            <id>36844</id>
            <sigla>PT</sigla>
            <urlLogo>https://www.camara.leg.br/internet/Deputado/img/partidos/PT.gif</urlLogo>
            <status>
              <idLegislatura>57</idLegislatura>
              <situacao>Ativo</situacao>
              <totalMembros>68</totalMembros>
              <totalPosse>69</totalPosse>
            </status>
          </dados>
        </xml>"#;

    #[test]
    fn parses_party_detail_fields() {
        let detail = parse_party_detail(PARTY_XML).unwrap();
        assert_eq!(
            detail.logo_uri.as_deref(),
            Some("https://www.camara.leg.br/internet/Deputado/img/partidos/PT.gif")
        );
        assert_eq!(detail.term_id, Some(57));
        assert_eq!(detail.status.as_deref(), Some("Ativo"));
        assert_eq!(detail.total_members, Some(68));
        assert_eq!(detail.total_sworn_in, Some(69));
    }

    #[test]
    fn missing_dados_envelope_yields_none() {
        assert!(parse_party_detail("<xml><outros/></xml>").is_none());
        assert!(parse_party_detail("not xml at all").is_none());
    }

    #[test]
    fn absent_fields_stay_none() {
        let detail = parse_party_detail("<xml><dados><sigla>NOVO</sigla></dados></xml>").unwrap();
        assert_eq!(detail.logo_uri, None);
        assert_eq!(detail.term_id, None);
        assert_eq!(detail.total_members, None);
    }
}
