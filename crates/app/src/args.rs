use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use learn_core::model::{CefrLevel, ItemId, LearnerId};
use storage::rest::RestConfig;

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    MissingCommand,
    MissingItems { command: &'static str },
    InvalidItemId { raw: String, source: learn_core::Error },
    InvalidLearnerId { raw: String, source: learn_core::Error },
    InvalidLevel { raw: String, source: learn_core::Error },
    InvalidLevelGroup { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
    MissingRestConfig,
    SeedNeedsLearner,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::MissingCommand => write!(f, "a subcommand is required"),
            ArgsError::MissingItems { command } => {
                write!(f, "{command} needs at least one item id")
            }
            ArgsError::InvalidItemId { raw, source } => {
                write!(f, "invalid item id {raw:?}: {source}")
            }
            ArgsError::InvalidLearnerId { raw, source } => {
                write!(f, "invalid --learner value {raw:?}: {source}")
            }
            ArgsError::InvalidLevel { raw, source } => {
                write!(f, "invalid level {raw:?}: {source}")
            }
            ArgsError::InvalidLevelGroup { raw } => {
                write!(f, "invalid level group (expected LEVEL=id,id): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
            ArgsError::MissingRestConfig => {
                write!(f, "--rest needs LEARN_REST_URL and LEARN_REST_KEY")
            }
            ArgsError::SeedNeedsLearner => write!(f, "seed needs --learner or LEARN_LEARNER_ID"),
        }
    }
}

impl std::error::Error for ArgsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArgsError::InvalidItemId { source, .. }
            | ArgsError::InvalidLearnerId { source, .. }
            | ArgsError::InvalidLevel { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status(Vec<ItemId>),
    Topic(Vec<ItemId>),
    Levels(BTreeMap<CefrLevel, Vec<ItemId>>),
    Mastered,
    Count,
    Seed,
}

#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite(String),
    Rest(RestConfig),
}

#[derive(Debug, Clone)]
pub struct Args {
    pub backend: Backend,
    pub learner: Option<LearnerId>,
    pub json: bool,
    pub now: Option<DateTime<Utc>>,
    pub command: Command,
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- status   [options] <item-id>...");
    eprintln!("  cargo run -p app -- topic    [options] <item-id>...");
    eprintln!("  cargo run -p app -- levels   [options] <LEVEL=id,id>...");
    eprintln!("  cargo run -p app -- mastered [options]");
    eprintln!("  cargo run -p app -- count    [options]");
    eprintln!("  cargo run -p app -- seed     [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite://dev.sqlite3)");
    eprintln!("  --rest                Use the hosted REST backend instead of SQLite");
    eprintln!("  --learner <id>        Learner to query (anonymous when absent)");
    eprintln!("  --json                Print results as JSON");
    eprintln!("  --now <rfc3339>       Fixed current time for deterministic seeding");
    eprintln!();
    let levels: Vec<&str> = CefrLevel::ALL.iter().map(|level| level.as_str()).collect();
    eprintln!("Levels: {}", levels.join(", "));
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_DB_URL, LEARN_LEARNER_ID, RUST_LOG");
    eprintln!("  LEARN_REST_URL, LEARN_REST_KEY, LEARN_REST_TABLE, LEARN_REST_TOKEN");
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_item(raw: &str) -> Result<ItemId, ArgsError> {
    raw.parse::<ItemId>()
        .map_err(|e| ArgsError::InvalidItemId {
            raw: raw.to_owned(),
            source: e.into(),
        })
}

fn parse_learner(raw: &str) -> Result<LearnerId, ArgsError> {
    raw.parse::<LearnerId>()
        .map_err(|e| ArgsError::InvalidLearnerId {
            raw: raw.to_owned(),
            source: e.into(),
        })
}

/// Parse `A1=hallo,danke` into a level and its item ids.
fn parse_level_group(raw: &str) -> Result<(CefrLevel, Vec<ItemId>), ArgsError> {
    let invalid = || ArgsError::InvalidLevelGroup {
        raw: raw.to_owned(),
    };
    let (level, items) = raw.split_once('=').ok_or_else(invalid)?;
    let level = level
        .parse::<CefrLevel>()
        .map_err(|e| ArgsError::InvalidLevel {
            raw: level.to_owned(),
            source: e.into(),
        })?;
    let items = items
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(parse_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((level, items))
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

impl Args {
    /// Parse process arguments, falling back to `LEARN_*` environment variables.
    pub fn parse() -> Result<Self, ArgsError> {
        Self::parse_from(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    pub fn parse_from(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter();
        let name = args.next().ok_or(ArgsError::MissingCommand)?;

        let mut db_url = env("LEARN_DB_URL")
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut learner = env("LEARN_LEARNER_ID")
            .filter(|value| !value.trim().is_empty())
            .map(|value| parse_learner(&value))
            .transpose()?;
        let mut use_rest = false;
        let mut json = false;
        let mut now = None;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner" => {
                    let value = require_value(&mut args, "--learner")?;
                    learner = Some(parse_learner(&value)?);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--rest" => use_rest = true,
                "--json" => json = true,
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let command = match name.as_str() {
            "status" | "topic" => {
                let items = positional
                    .iter()
                    .map(|raw| parse_item(raw))
                    .collect::<Result<Vec<_>, _>>()?;
                if items.is_empty() {
                    return Err(ArgsError::MissingItems {
                        command: if name == "status" { "status" } else { "topic" },
                    });
                }
                if name == "status" {
                    Command::Status(items)
                } else {
                    Command::Topic(items)
                }
            }
            "levels" => {
                let mut groups: BTreeMap<CefrLevel, Vec<ItemId>> = BTreeMap::new();
                for raw in &positional {
                    let (level, items) = parse_level_group(raw)?;
                    groups.entry(level).or_default().extend(items);
                }
                if groups.is_empty() {
                    return Err(ArgsError::MissingItems { command: "levels" });
                }
                Command::Levels(groups)
            }
            "mastered" | "count" | "seed" => {
                if let Some(extra) = positional.into_iter().next() {
                    return Err(ArgsError::UnknownArg(extra));
                }
                match name.as_str() {
                    "mastered" => Command::Mastered,
                    "count" => Command::Count,
                    _ => Command::Seed,
                }
            }
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        if command == Command::Seed && learner.is_none() {
            return Err(ArgsError::SeedNeedsLearner);
        }

        let backend = if use_rest {
            Backend::Rest(RestConfig::from_lookup(&env).ok_or(ArgsError::MissingRestConfig)?)
        } else {
            Backend::Sqlite(db_url)
        };

        Ok(Self {
            backend,
            learner,
            json,
            now,
            command,
        })
    }
}
