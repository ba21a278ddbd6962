mod ids;
mod level;
mod mastery;
mod progress;

pub use ids::{ItemId, LearnerId, ParseIdError};
pub use level::{CefrLevel, ParseLevelError};
pub use mastery::{MasteryMap, TopicProgress};
pub use progress::{Learner, ProficiencyError, ProficiencyLevel, ProgressRecord};
