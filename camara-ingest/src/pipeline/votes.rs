//! Individual-vote ingestion stage
//!
//! For every session already persisted for the year, fetches the per-session
//! vote roster, resolves the embedded legislator references, guards the
//! (session, legislator) pair uniqueness, and bulk-stages the survivors.

use crate::db::legislators::{self, LegislatorRef};
use crate::db::sessions::{self as sessions_db, SessionRow};
use crate::db::votes::{self, NewVote};
use crate::services::{Listing, OpenDataClient};
use anyhow::Result;
use camara_common::events::ProgressBus;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};

const ROSTER_WORKERS: usize = 10;

/// One vote of a session's vote roster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub tipo_voto: Option<String>,
    pub data_registro_voto: Option<String>,
    /// The upstream field really is named with a trailing underscore
    #[serde(rename = "deputado_")]
    pub legislator: Option<VoteLegislatorRef>,
}

/// Embedded legislator reference of a vote record.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteLegislatorRef {
    pub id: Option<i64>,
    pub uri: Option<String>,
}

/// Resolve rosters against the store maps, dropping votes whose legislator
/// is missing or unresolvable and any repeated (session, legislator) pair.
///
/// `known_pairs` starts as the persisted pair set and is updated as rows are
/// accepted, so repeats inside a single API response are also caught.
pub(crate) fn build_new_votes(
    sessions: &[SessionRow],
    rosters: &[Vec<VoteRecord>],
    legislators: &HashMap<i64, LegislatorRef>,
    known_pairs: &mut HashSet<(i64, i64)>,
) -> (Vec<NewVote>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (session, roster) in sessions.iter().zip(rosters) {
        for record in roster {
            let Some(reference) = &record.legislator else {
                skipped += 1;
                continue;
            };
            let Some(source_id) = reference.id else {
                skipped += 1;
                continue;
            };
            let Some(legislator) = legislators.get(&source_id) else {
                skipped += 1;
                continue;
            };
            if !known_pairs.insert((session.id, legislator.id)) {
                skipped += 1;
                continue;
            }

            rows.push(NewVote {
                session_id: session.id,
                legislator_id: legislator.id,
                vote_value: record.tipo_voto.clone(),
                recorded_at: record.data_registro_voto.clone(),
                party_acronym: legislator.party_acronym.clone(),
                legislator_uri: reference.uri.clone(),
                session_uri: session.source_uri.clone(),
            });
        }
    }

    (rows, skipped)
}

/// Fetch and stage the individual votes of every session of the year.
pub async fn ingest_votes(
    conn: &mut SqliteConnection,
    client: &OpenDataClient,
    year: i32,
    progress: &ProgressBus,
) -> Result<()> {
    progress.log(format!(
        "-> Starting individual-vote processing for year {}...",
        year
    ));

    if votes::any_exists(conn).await? {
        progress.log(format!(
            "-> Votes for year {} already present in the store. Stage complete.",
            year
        ));
        return Ok(());
    }

    progress.log("   - Loading store data for resolution...");

    let sessions = sessions_db::sessions_for_year(conn, year).await?;
    if sessions.is_empty() {
        progress.log("   - No voting sessions found in the store for this year.");
        return Ok(());
    }

    let legislator_map = legislators::source_id_to_ref_map(conn).await?;

    let session_ids: Vec<i64> = sessions.iter().map(|session| session.id).collect();
    let mut known_pairs = votes::existing_pairs(conn, &session_ids).await?;

    progress.log(format!(
        "   - Fetching votes for {} sessions concurrently...",
        sessions.len()
    ));

    let rosters: Vec<Vec<VoteRecord>> = stream::iter(sessions.iter())
        .map(|session| async move {
            match &session.source_uri {
                Some(uri) => {
                    let url = format!("{}/votos", uri);
                    match client.get_json::<Listing<VoteRecord>>(&url).await {
                        Ok(listing) => listing.dados,
                        Err(err) => {
                            tracing::warn!(
                                session_id = session.id,
                                error = %err,
                                "Vote roster fetch failed, session skipped"
                            );
                            Vec::new()
                        }
                    }
                }
                None => Vec::new(),
            }
        })
        .buffered(ROSTER_WORKERS)
        .collect()
        .await;

    progress.log("   - Processing and staging new votes...");

    let (rows, skipped) = build_new_votes(&sessions, &rosters, &legislator_map, &mut known_pairs);
    tracing::info!(year, staged = rows.len(), skipped, "Vote records resolved");

    if !rows.is_empty() {
        progress.log(format!(
            "   - Adding {} new vote records to the store...",
            rows.len()
        ));
        votes::insert_batch(conn, &rows).await?;
    }

    progress.log("-> Individual-vote processing complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(legislator_id: Option<i64>, value: &str) -> VoteRecord {
        VoteRecord {
            tipo_voto: Some(value.to_string()),
            data_registro_voto: Some("2012-05-15T19:40:00".to_string()),
            legislator: legislator_id.map(|id| VoteLegislatorRef {
                id: Some(id),
                uri: Some(format!("https://example.org/deputados/{}", id)),
            }),
        }
    }

    fn legislator_map(entries: &[(i64, i64)]) -> HashMap<i64, LegislatorRef> {
        entries
            .iter()
            .map(|&(source_id, id)| {
                (
                    source_id,
                    LegislatorRef {
                        id,
                        party_acronym: Some("PT".to_string()),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn resolves_votes_and_drops_unknown_legislators() {
        let sessions = vec![SessionRow { id: 1, source_uri: Some("uri-1".into()) }];
        let rosters = vec![vec![vote(Some(100), "Sim"), vote(Some(999), "Não"), vote(None, "Sim")]];
        let legislators = legislator_map(&[(100, 10)]);
        let mut pairs = HashSet::new();

        let (rows, skipped) = build_new_votes(&sessions, &rosters, &legislators, &mut pairs);

        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 2);
        assert_eq!(rows[0].session_id, 1);
        assert_eq!(rows[0].legislator_id, 10);
        assert_eq!(rows[0].party_acronym.as_deref(), Some("PT"));
    }

    #[test]
    fn duplicate_pairs_within_one_roster_are_dropped() {
        let sessions = vec![SessionRow { id: 1, source_uri: None }];
        let rosters = vec![vec![vote(Some(100), "Sim"), vote(Some(100), "Sim")]];
        let legislators = legislator_map(&[(100, 10)]);
        let mut pairs = HashSet::new();

        let (rows, skipped) = build_new_votes(&sessions, &rosters, &legislators, &mut pairs);

        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn preexisting_pairs_are_not_staged_again() {
        let sessions = vec![SessionRow { id: 1, source_uri: None }];
        let rosters = vec![vec![vote(Some(100), "Sim")]];
        let legislators = legislator_map(&[(100, 10)]);
        let mut pairs = HashSet::from([(1, 10)]);

        let (rows, skipped) = build_new_votes(&sessions, &rosters, &legislators, &mut pairs);

        assert!(rows.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn same_legislator_may_vote_in_different_sessions() {
        let sessions = vec![
            SessionRow { id: 1, source_uri: None },
            SessionRow { id: 2, source_uri: None },
        ];
        let rosters = vec![vec![vote(Some(100), "Sim")], vec![vote(Some(100), "Não")]];
        let legislators = legislator_map(&[(100, 10)]);
        let mut pairs = HashSet::new();

        let (rows, skipped) = build_new_votes(&sessions, &rosters, &legislators, &mut pairs);

        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn vote_record_deserializes_trailing_underscore_field() {
        let listing: Listing<VoteRecord> = serde_json::from_str(
            r#"{"dados": [{
                "tipoVoto": "Sim",
                "dataRegistroVoto": "2012-05-15T19:40:12",
                "deputado_": {"id": 204554, "uri": "https://example.org/deputados/204554"}
            }]}"#,
        )
        .unwrap();

        let record = &listing.dados[0];
        assert_eq!(record.tipo_voto.as_deref(), Some("Sim"));
        assert_eq!(record.legislator.as_ref().unwrap().id, Some(204554));
    }
}
