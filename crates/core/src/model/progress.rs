use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ItemId, LearnerId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProficiencyError {
    #[error("invalid proficiency level: {0}")]
    InvalidLevel(String),
}

//
// ─── PROFICIENCY LEVEL ────────────────────────────────────────────────────────
//

/// How far a learner has progressed with a single vocabulary item.
///
/// Only `Learned` counts as mastered; the other levels are tracked by the
/// practice flows and read here as "not yet mastered".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    New,
    Learning,
    Learned,
}

impl ProficiencyLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Learned => "learned",
        }
    }

    /// Parses the stored lowercase representation.
    ///
    /// # Errors
    ///
    /// Returns `ProficiencyError::InvalidLevel` for unknown values.
    pub fn parse(value: &str) -> Result<Self, ProficiencyError> {
        match value {
            "new" => Ok(Self::New),
            "learning" => Ok(Self::Learning),
            "learned" => Ok(Self::Learned),
            other => Err(ProficiencyError::InvalidLevel(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_mastered(self) -> bool {
        matches!(self, Self::Learned)
    }
}

//
// ─── LEARNER ──────────────────────────────────────────────────────────────────
//

/// The authenticated end user whose progress is being read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    pub id: LearnerId,
    pub email: Option<String>,
}

impl Learner {
    #[must_use]
    pub fn new(id: LearnerId) -> Self {
        Self { id, email: None }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

//
// ─── PROGRESS RECORD ──────────────────────────────────────────────────────────
//

/// Persisted practice state for one (learner, item) pair.
///
/// `correct_count <= times_practiced` holds for records written by the
/// practice flows but is not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub learner_id: LearnerId,
    pub item_id: ItemId,
    pub level: ProficiencyLevel,
    pub times_practiced: u32,
    pub correct_count: u32,
    pub last_practiced_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Fresh record for an item that has just been practiced for the first time.
    #[must_use]
    pub fn new(
        learner_id: LearnerId,
        item_id: ItemId,
        level: ProficiencyLevel,
        last_practiced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id,
            item_id,
            level,
            times_practiced: 0,
            correct_count: 0,
            last_practiced_at,
        }
    }

    #[must_use]
    pub fn with_counts(mut self, times_practiced: u32, correct_count: u32) -> Self {
        self.times_practiced = times_practiced;
        self.correct_count = correct_count;
        self
    }

    #[must_use]
    pub fn is_mastered(&self) -> bool {
        self.level.is_mastered()
    }

    /// Share of correct answers, or `None` if the item was never practiced.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        if self.times_practiced == 0 {
            return None;
        }
        Some(f64::from(self.correct_count) / f64::from(self.times_practiced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn record(level: ProficiencyLevel) -> ProgressRecord {
        ProgressRecord::new(
            LearnerId::new("learner-1").unwrap(),
            ItemId::new("der-hund").unwrap(),
            level,
            fixed_now(),
        )
    }

    #[test]
    fn only_learned_counts_as_mastered() {
        assert!(!record(ProficiencyLevel::New).is_mastered());
        assert!(!record(ProficiencyLevel::Learning).is_mastered());
        assert!(record(ProficiencyLevel::Learned).is_mastered());
    }

    #[test]
    fn level_parse_matches_as_str() {
        for level in [
            ProficiencyLevel::New,
            ProficiencyLevel::Learning,
            ProficiencyLevel::Learned,
        ] {
            assert_eq!(ProficiencyLevel::parse(level.as_str()), Ok(level));
        }
        assert_eq!(
            ProficiencyLevel::parse("mastered"),
            Err(ProficiencyError::InvalidLevel("mastered".into()))
        );
    }

    #[test]
    fn level_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&ProficiencyLevel::Learned).unwrap();
        assert_eq!(json, "\"learned\"");
    }

    #[test]
    fn accuracy_is_none_before_first_practice() {
        let fresh = record(ProficiencyLevel::New);
        assert_eq!(fresh.accuracy(), None);

        let practiced = record(ProficiencyLevel::Learning).with_counts(4, 3);
        assert_eq!(practiced.accuracy(), Some(0.75));
    }
}
