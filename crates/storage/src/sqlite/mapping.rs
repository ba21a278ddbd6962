use learn_core::model::{ItemId, LearnerId, ProficiencyLevel, ProgressRecord};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn counter_to_i64(v: u32) -> i64 {
    i64::from(v)
}

pub(crate) fn parse_level(s: &str) -> Result<ProficiencyLevel, StorageError> {
    ProficiencyLevel::parse(s).map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ProgressRecord, StorageError> {
    let learner_id = LearnerId::new(row.try_get::<String, _>("user_id").map_err(ser)?)
        .map_err(ser)?;
    let item_id = ItemId::new(row.try_get::<String, _>("word_id").map_err(ser)?).map_err(ser)?;

    let level_str: String = row.try_get("proficiency_level").map_err(ser)?;
    let level = parse_level(level_str.as_str())?;

    let times_practiced = i64_to_u32(
        "times_practiced",
        row.try_get::<i64, _>("times_practiced").map_err(ser)?,
    )?;
    let correct_count = i64_to_u32(
        "correct_count",
        row.try_get::<i64, _>("correct_count").map_err(ser)?,
    )?;

    Ok(ProgressRecord {
        learner_id,
        item_id,
        level,
        times_practiced,
        correct_count,
        last_practiced_at: row.try_get("last_practiced").map_err(ser)?,
    })
}
