use chrono::Duration;
use learn_core::Clock;
use learn_core::model::{CefrLevel, ItemId, LearnerId, ProficiencyLevel, ProgressRecord};
use storage::repository::{ProgressWriter, StorageError};

/// Sample vocabulary per level, keyed by item id.
const SAMPLE_WORDS: &[(CefrLevel, &[&str])] = &[
    (CefrLevel::A1, &["hallo", "danke", "bitte", "das-haus", "der-hund", "die-katze"]),
    (CefrLevel::A2, &["gestern", "der-bahnhof", "das-wetter", "einkaufen"]),
    (CefrLevel::B1, &["obwohl", "trotzdem", "die-erfahrung", "die-entscheidung"]),
    (CefrLevel::B2, &["allerdings", "die-voraussetzung", "nachhaltig"]),
];

/// Level and (practiced, correct) counters cycled over the sample words.
const PATTERN: [(ProficiencyLevel, u32, u32); 4] = [
    (ProficiencyLevel::Learned, 6, 6),
    (ProficiencyLevel::Learning, 3, 1),
    (ProficiencyLevel::Learned, 8, 7),
    (ProficiencyLevel::New, 1, 0),
];

/// Build the demo records; easier levels are practiced further in the past.
pub fn sample_records(
    learner: &LearnerId,
    clock: Clock,
) -> Result<Vec<ProgressRecord>, StorageError> {
    let mut records = Vec::new();
    let mut hours_ago: i64 = i64::try_from(
        SAMPLE_WORDS.iter().map(|(_, words)| words.len()).sum::<usize>(),
    )
    .map_err(|e| StorageError::Serialization(e.to_string()))?;

    for (_, words) in SAMPLE_WORDS {
        for (idx, word) in words.iter().enumerate() {
            let (level, practiced, correct) = PATTERN[idx % PATTERN.len()];
            let item_id =
                ItemId::new(*word).map_err(|e| StorageError::Serialization(e.to_string()))?;
            records.push(
                ProgressRecord::new(
                    learner.clone(),
                    item_id,
                    level,
                    clock.ago(Duration::hours(hours_ago)),
                )
                .with_counts(practiced, correct),
            );
            hours_ago -= 1;
        }
    }
    Ok(records)
}

/// Write the demo records for `learner`, returning how many were stored.
pub async fn seed_progress(
    writer: &dyn ProgressWriter,
    learner: &LearnerId,
    clock: Clock,
) -> Result<usize, StorageError> {
    let records = sample_records(learner, clock)?;
    for record in &records {
        writer.upsert_progress(record).await?;
    }
    Ok(records.len())
}
