use chrono::Duration;
use learn_core::model::{ItemId, LearnerId, ProficiencyLevel, ProgressRecord};
use learn_core::time::fixed_now;
use storage::repository::{Projection, ProgressQuery, ProgressRepository, ProgressWriter};
use storage::sqlite::SqliteRepository;

fn learner(raw: &str) -> LearnerId {
    LearnerId::new(raw).unwrap()
}

fn item(raw: &str) -> ItemId {
    ItemId::new(raw).unwrap()
}

fn record(
    learner_id: &str,
    item_id: &str,
    level: ProficiencyLevel,
    hours_ago: i64,
) -> ProgressRecord {
    ProgressRecord::new(
        learner(learner_id),
        item(item_id),
        level,
        fixed_now() - Duration::hours(hours_ago),
    )
}

async fn open(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    SqliteRepository::open(&url).await.expect("open")
}

#[tokio::test]
async fn sqlite_roundtrip_persists_counters_and_timestamp() {
    let repo = open("memdb_progress_roundtrip").await;
    let rec = record("anna", "das-haus", ProficiencyLevel::Learning, 2).with_counts(7, 5);
    repo.upsert_progress(&rec).await.unwrap();

    let query = ProgressQuery::for_learner(learner("anna")).with_items([item("das-haus")]);
    let fetched = repo.fetch_progress(&query).await.expect("fetch");
    assert_eq!(fetched, vec![rec]);
}

#[tokio::test]
async fn sqlite_upsert_replaces_existing_pair() {
    let repo = open("memdb_progress_upsert").await;
    repo.upsert_progress(&record("anna", "hund", ProficiencyLevel::Learning, 5))
        .await
        .unwrap();
    repo.upsert_progress(&record("anna", "hund", ProficiencyLevel::Learned, 0).with_counts(4, 4))
        .await
        .unwrap();

    let fetched = repo
        .fetch_progress(&ProgressQuery::for_learner(learner("anna")))
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].level, ProficiencyLevel::Learned);
    assert_eq!(fetched[0].times_practiced, 4);
}

#[tokio::test]
async fn sqlite_filters_items_level_and_orders_newest_first() {
    let repo = open("memdb_progress_filters").await;
    for rec in [
        record("anna", "eins", ProficiencyLevel::Learned, 30),
        record("anna", "zwei", ProficiencyLevel::Learned, 3),
        record("anna", "drei", ProficiencyLevel::New, 1),
        record("ben", "eins", ProficiencyLevel::Learned, 0),
    ] {
        repo.upsert_progress(&rec).await.unwrap();
    }

    let status = repo
        .fetch_progress(
            &ProgressQuery::for_learner(learner("anna"))
                .with_items([item("eins"), item("drei"), item("vier")])
                .with_projection(Projection::Status),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = status.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["drei", "eins"]);

    let mastered = repo
        .fetch_progress(
            &ProgressQuery::for_learner(learner("anna"))
                .with_level(ProficiencyLevel::Learned)
                .order_by_last_practiced_desc(),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = mastered.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["zwei", "eins"]);
}

#[tokio::test]
async fn sqlite_empty_item_filter_returns_nothing() {
    let repo = open("memdb_progress_empty").await;
    repo.upsert_progress(&record("anna", "eins", ProficiencyLevel::Learned, 1))
        .await
        .unwrap();

    let fetched = repo
        .fetch_progress(&ProgressQuery::for_learner(learner("anna")).with_items(Vec::new()))
        .await
        .unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = open("memdb_progress_migrate").await;
    repo.migrate().await.expect("second migrate");
    repo.migrate().await.expect("third migrate");
}
