use std::sync::Arc;

use learn_core::model::{ItemId, Learner, MasteryMap, ProgressRecord, TopicProgress};
use services::{AuthProvider, Clock, HostedAuth, ProgressService, StaticAuth};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

mod args;
mod seed;

use args::{Args, ArgsError, Backend, Command, print_usage};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Open storage and pick the auth provider for the chosen backend.
async fn connect(
    args: &Args,
) -> Result<(Storage, Arc<dyn AuthProvider>), Box<dyn std::error::Error>> {
    let explicit: Option<Arc<dyn AuthProvider>> = args
        .learner
        .clone()
        .map(|id| Arc::new(StaticAuth::signed_in(Learner::new(id))) as Arc<dyn AuthProvider>);

    match &args.backend {
        Backend::Sqlite(db_url) => {
            prepare_sqlite_file(db_url)?;
            let storage = Storage::sqlite(db_url).await?;
            let auth = explicit.unwrap_or_else(|| Arc::new(StaticAuth::anonymous()));
            Ok((storage, auth))
        }
        Backend::Rest(config) => {
            let storage = Storage::rest(config.clone());
            let auth = explicit.unwrap_or_else(|| Arc::new(HostedAuth::new(config.clone())));
            Ok((storage, auth))
        }
    }
}

fn mastery_label(status: &MasteryMap, id: &ItemId) -> &'static str {
    match status.get(id) {
        Some(true) => "mastered",
        Some(false) => "in progress",
        None => "not started",
    }
}

fn print_status(status: &MasteryMap, requested: &[ItemId]) {
    let mut seen = std::collections::BTreeSet::new();
    for id in requested.iter().filter(|id| seen.insert(*id)) {
        println!("{id:<24} {}", mastery_label(status, id));
    }
    println!("{} of {} mastered", status.mastered_count(), seen.len());
}

fn print_topic(label: &str, topic: TopicProgress) {
    println!(
        "{label}{}/{} mastered ({:.0}%)",
        topic.mastered,
        topic.total,
        topic.ratio() * 100.0
    );
}

fn print_mastered(records: &[ProgressRecord]) {
    if records.is_empty() {
        println!("no mastered items");
        return;
    }
    for record in records {
        let accuracy = record
            .accuracy()
            .map_or_else(|| "-".to_owned(), |a| format!("{:.0}%", a * 100.0));
        println!(
            "{:<24} {}  practiced {:>3}x  accuracy {accuracy}",
            record.item_id,
            record.last_practiced_at.format("%Y-%m-%d %H:%M"),
            record.times_practiced,
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if matches!(
        std::env::args().nth(1).as_deref(),
        None | Some("--help" | "-h" | "help")
    ) {
        print_usage();
        return Ok(());
    }

    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let (storage, auth) = connect(&args).await?;

    if args.command == Command::Seed {
        let clock = args.now.map_or(Clock::System, Clock::fixed);
        // `parse` guarantees a learner for seeding.
        let learner = args.learner.clone().ok_or(ArgsError::SeedNeedsLearner)?;
        let written = seed::seed_progress(storage.writer.as_ref(), &learner, clock).await?;
        println!("Seeded {written} progress records for {learner}");
        return Ok(());
    }

    let service = ProgressService::new(auth, Arc::clone(&storage.progress));
    match &args.command {
        Command::Status(items) => {
            let status = service.mastery_status(items).await;
            if args.json {
                print_json(&status)?;
            } else {
                print_status(&status, items);
            }
        }
        Command::Topic(items) => {
            let topic = service.topic_progress(items).await;
            if args.json {
                print_json(&topic)?;
            } else {
                print_topic("", topic);
            }
        }
        Command::Levels(groups) => {
            let progress = service.level_progress(groups).await;
            if args.json {
                print_json(&progress)?;
            } else {
                for (level, topic) in progress {
                    print_topic(&format!("{level}  "), topic);
                }
            }
        }
        Command::Mastered => {
            let records = service.mastered_items().await;
            if args.json {
                print_json(&records)?;
            } else {
                print_mastered(&records);
            }
        }
        Command::Count => {
            let count = service.mastered_count().await;
            if args.json {
                print_json(&count)?;
            } else {
                println!("{count}");
            }
        }
        Command::Seed => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
