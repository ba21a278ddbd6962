use thiserror::Error;

use crate::model::{ParseIdError, ParseLevelError, ProficiencyError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidId(#[from] ParseIdError),
    #[error(transparent)]
    InvalidLevel(#[from] ParseLevelError),
    #[error(transparent)]
    Proficiency(#[from] ProficiencyError),
}
