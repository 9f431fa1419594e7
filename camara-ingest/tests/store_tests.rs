//! Store-level properties: atomicity, foreign-key soundness, pair
//! uniqueness, and stage short-circuits that must hold without any network.

use camara_common::db::init_database;
use camara_common::events::ProgressBus;
use camara_ingest::db::{expenses, legislators, parties, sessions, votes};
use camara_ingest::pipeline;
use camara_ingest::services::OpenDataClient;
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;

async fn new_store(year: i32) -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = init_database(&tmp.path().join(format!("camara_{}.db", year)))
        .await
        .unwrap();
    (tmp, pool)
}

/// A client pointed at a dead endpoint; any attempt to use it fails fast.
fn unreachable_client() -> OpenDataClient {
    OpenDataClient::new()
        .unwrap()
        .with_base_url("http://127.0.0.1:1")
        .with_initial_backoff(Duration::from_millis(1))
}

fn sample_party() -> parties::NewParty {
    parties::NewParty {
        source_id: 36844,
        acronym: "PT".into(),
        name: Some("Partido dos Trabalhadores".into()),
        logo_uri: None,
        term_id: Some(54),
        status: Some("Ativo".into()),
        total_members: Some(68),
        total_sworn_in: Some(69),
    }
}

fn sample_legislator(source_id: i64) -> legislators::NewLegislator {
    legislators::NewLegislator {
        source_id,
        legal_name: Some("Maria da Silva Santos".into()),
        electoral_name: Some("Maria Santos".into()),
        party_acronym: Some("PT".into()),
        party_id: None,
        state_code: Some("SP".into()),
        term_id: Some(54),
        photo_uri: None,
        sex: Some("F".into()),
    }
}

#[tokio::test]
async fn rolled_back_run_leaves_no_rows_of_any_type() {
    let (_tmp, pool) = new_store(2012).await;

    {
        let mut tx = pool.begin().await.unwrap();
        parties::insert(&mut tx, &sample_party()).await.unwrap();
        legislators::insert(&mut tx, &sample_legislator(100)).await.unwrap();

        let session_id = sessions::insert_session(
            &mut tx,
            &sessions::NewSession {
                source_id: "123-45".into(),
                recorded_at: Some("2012-05-15T19:32:10".into()),
                description: None,
                organ_acronym: Some("PLEN".into()),
                source_uri: None,
                approval: Some("1".into()),
                last_opening_description: None,
            },
        )
        .await
        .unwrap();

        let bill_id = sessions::insert_bill(
            &mut tx,
            &sessions::NewBill {
                source_id: "604557".into(),
                type_acronym: Some("PL".into()),
                year: Some(2011),
                summary: None,
                presented_at: None,
                status: None,
                full_text_uri: None,
            },
        )
        .await
        .unwrap();
        sessions::insert_session_bill_link(&mut tx, session_id, bill_id)
            .await
            .unwrap();

        tx.rollback().await.unwrap();
    }

    let mut conn = pool.acquire().await.unwrap();
    assert!(!parties::any_exists(&mut conn).await.unwrap());
    assert!(!legislators::any_exists(&mut conn).await.unwrap());
    assert!(!sessions::any_exists(&mut conn).await.unwrap());
    assert!(!expenses::any_exists(&mut conn).await.unwrap());
    assert!(!votes::any_exists(&mut conn).await.unwrap());
}

#[tokio::test]
async fn committed_rows_survive_and_feed_the_lookup_maps() {
    let (_tmp, pool) = new_store(2013).await;
    let mut conn = pool.acquire().await.unwrap();

    parties::insert(&mut conn, &sample_party()).await.unwrap();
    let party_map = parties::acronym_to_id_map(&mut conn).await.unwrap();
    let party_id = *party_map.get("PT").unwrap();

    let mut legislator = sample_legislator(100);
    legislator.party_id = Some(party_id);
    legislators::insert(&mut conn, &legislator).await.unwrap();

    let map = legislators::source_id_to_id_map(&mut conn).await.unwrap();
    assert!(map.contains_key(&100));

    let refs = legislators::source_id_to_ref_map(&mut conn).await.unwrap();
    assert_eq!(refs.get(&100).unwrap().party_acronym.as_deref(), Some("PT"));
}

#[tokio::test]
async fn expense_foreign_keys_are_enforced() {
    let (_tmp, pool) = new_store(2014).await;
    let mut conn = pool.acquire().await.unwrap();

    legislators::insert(&mut conn, &sample_legislator(100)).await.unwrap();
    let map = legislators::source_id_to_id_map(&mut conn).await.unwrap();
    let legislator_id = *map.get(&100).unwrap();

    let valid = expenses::NewExpense {
        legislator_id,
        year: Some(2014),
        month: Some(3),
        category: Some("COMBUSTÍVEIS".into()),
        net_value: 150.0,
        document_type: None,
        document_uri: None,
        supplier_name: None,
    };
    expenses::insert_batch(&mut conn, &[valid.clone()]).await.unwrap();
    assert_eq!(expenses::count(&mut conn).await.unwrap(), 1);

    // A dangling legislator reference must be rejected by the store
    let dangling = expenses::NewExpense {
        legislator_id: 9999,
        ..valid
    };
    assert!(expenses::insert_batch(&mut conn, &[dangling]).await.is_err());
}

#[tokio::test]
async fn vote_pair_uniqueness_is_enforced_by_the_store() {
    let (_tmp, pool) = new_store(2015).await;
    let mut conn = pool.acquire().await.unwrap();

    legislators::insert(&mut conn, &sample_legislator(100)).await.unwrap();
    let legislator_id = *legislators::source_id_to_id_map(&mut conn)
        .await
        .unwrap()
        .get(&100)
        .unwrap();

    let session_id = sessions::insert_session(
        &mut conn,
        &sessions::NewSession {
            source_id: "200-1".into(),
            recorded_at: Some("2015-03-01T12:00:00".into()),
            description: None,
            organ_acronym: None,
            source_uri: None,
            approval: None,
            last_opening_description: None,
        },
    )
    .await
    .unwrap();

    let vote = votes::NewVote {
        session_id,
        legislator_id,
        vote_value: Some("Sim".into()),
        recorded_at: None,
        party_acronym: Some("PT".into()),
        legislator_uri: None,
        session_uri: None,
    };
    votes::insert_batch(&mut conn, &[vote.clone()]).await.unwrap();

    // Second insert of the same (session, legislator) pair must fail
    assert!(votes::insert_batch(&mut conn, &[vote]).await.is_err());
    assert_eq!(votes::count(&mut conn).await.unwrap(), 1);

    let pairs = votes::existing_pairs(&mut conn, &[session_id]).await.unwrap();
    assert!(pairs.contains(&(session_id, legislator_id)));
}

#[tokio::test]
async fn populated_stages_short_circuit_without_touching_the_network() {
    let (_tmp, pool) = new_store(2016).await;
    let mut conn = pool.acquire().await.unwrap();
    let client = unreachable_client();
    let bus = ProgressBus::new(64);

    parties::insert(&mut conn, &sample_party()).await.unwrap();
    legislators::insert(&mut conn, &sample_legislator(100)).await.unwrap();

    // Both stages find existing rows and return before any request
    pipeline::parties::ingest_parties(&mut conn, &client, &bus)
        .await
        .unwrap();
    pipeline::legislators::ingest_legislators(&mut conn, &client, 55, &bus)
        .await
        .unwrap();
}

#[tokio::test]
async fn vote_stage_is_a_noop_when_the_year_has_no_sessions() {
    let (_tmp, pool) = new_store(2017).await;
    let mut conn = pool.acquire().await.unwrap();
    let client = unreachable_client();
    let bus = ProgressBus::new(64);

    pipeline::votes::ingest_votes(&mut conn, &client, 2017, &bus)
        .await
        .unwrap();
    assert!(!votes::any_exists(&mut conn).await.unwrap());
}
