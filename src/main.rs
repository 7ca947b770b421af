use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vocab_srs::models::JsonOutput;
use vocab_srs::{Catalog, Config, Database, ProgressStore, Scheduler, VocabularyItem};

#[derive(Parser)]
#[command(name = "vocab-srs")]
#[command(about = "Spaced-repetition review scheduler for vocabulary learning")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to a config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Learner to act for
    #[arg(long, short, global = true, env = "VOCAB_SRS_LEARNER", default_value = "default")]
    learner: String,

    /// Treat this RFC 3339 instant as "now"
    #[arg(long, global = true, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage catalog items
    #[command(subcommand)]
    Item(ItemCommands),

    /// Build the next review session
    Session {
        /// Maximum number of items (defaults to the configured size)
        #[arg(long, short, allow_hyphen_values = true)]
        size: Option<i64>,
    },

    /// Record a recall rating for an item
    Review {
        /// Item ID
        item: String,

        /// Recall quality, 1 (blackout) to 5 (perfect)
        #[arg(long, short, allow_hyphen_values = true)]
        quality: i64,

        /// Time taken to answer, in milliseconds
        #[arg(long)]
        response_ms: Option<u64>,
    },

    /// List items due for review
    Due,

    /// Show mastery distribution
    Stats,

    /// Show the interval each rating would give an item
    Preview {
        /// Item ID
        item: String,
    },
}

#[derive(Subcommand)]
enum ItemCommands {
    /// List catalog items
    List {
        /// Filter by language code
        #[arg(long)]
        language: Option<String>,
    },

    /// Add an item to the catalog
    Add {
        /// Item ID
        id: String,

        /// Head word
        word: String,

        /// Translation
        translation: String,

        /// Part of speech
        #[arg(long)]
        pos: Option<String>,

        /// Example sentence
        #[arg(long, short)]
        example: Option<String>,

        /// Pronunciation hint
        #[arg(long, short)]
        pronunciation: Option<String>,

        /// Difficulty, 1 (easy) to 5 (hard)
        #[arg(long, short, default_value_t = 1)]
        difficulty: u8,

        /// Frequency rank (lower = more common)
        #[arg(long, default_value_t = 1000)]
        rank: u32,

        /// Language code
        #[arg(long, default_value = "it")]
        language: String,
    },

    /// Show an item and the learner's progress on it
    Show {
        /// Item ID
        id: String,
    },
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config.as_deref())?;
    let db_path = config.database_path()?;
    let db = Database::open(&db_path)?;
    db.init()?;

    let now = cli.at.unwrap_or_else(Utc::now);
    let learner = cli.learner.as_str();
    let scheduler = Scheduler::with_config(db, config.scheduler_config());

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Item(item_cmd) => match item_cmd {
            ItemCommands::List { language } => {
                let items = scheduler.store().list_items(language.as_deref())?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&items))?);
                } else if items.is_empty() {
                    println!("No items found.");
                } else {
                    println!("{:<12} {:<24} {:<30} LANG", "ID", "WORD", "TRANSLATION");
                    println!("{}", "-".repeat(72));
                    for item in items {
                        println!(
                            "{:<12} {:<24} {:<30} {}",
                            truncate(&item.id, 12),
                            truncate(&item.word, 24),
                            truncate(&item.translation, 30),
                            item.language_code
                        );
                    }
                }
            }

            ItemCommands::Add {
                id,
                word,
                translation,
                pos,
                example,
                pronunciation,
                difficulty,
                rank,
                language,
            } => {
                let item = VocabularyItem {
                    id,
                    word,
                    translation,
                    part_of_speech: pos.unwrap_or_default(),
                    example_sentence: example.unwrap_or_default(),
                    pronunciation: pronunciation.unwrap_or_default(),
                    difficulty,
                    frequency_rank: rank,
                    language_code: language,
                };
                scheduler.store().add_item(&item)?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&item))?);
                } else {
                    println!("Added item '{}' ({}).", item.id, item.word);
                }
            }

            ItemCommands::Show { id } => {
                if let Some(item) = scheduler.store().get_item(&id)? {
                    let progress = scheduler.store().get_progress(learner, &id)?;

                    if cli.json {
                        let mastery = progress.as_ref().map(|p| p.mastery_level());
                        println!(
                            "{}",
                            serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                                "item": item,
                                "progress": progress,
                                "mastery_level": mastery,
                            })))?
                        );
                    } else {
                        println!("Word: {} ({})", item.word, item.id);
                        println!("Translation: {}", item.translation);
                        if !item.part_of_speech.is_empty() {
                            println!("Part of speech: {}", item.part_of_speech);
                        }
                        if !item.pronunciation.is_empty() {
                            println!("Pronunciation: {}", item.pronunciation);
                        }
                        if !item.example_sentence.is_empty() {
                            println!("Example: {}", item.example_sentence);
                        }
                        println!("Difficulty: {}/5", item.difficulty);

                        println!();
                        match progress {
                            Some(p) => {
                                println!("--- Progress ({}) ---", learner);
                                println!("Mastery: {}", p.mastery_level().label());
                                println!(
                                    "Interval: {} day(s), ease {:.2}, streak {}",
                                    p.interval_days, p.ease_factor, p.repetitions
                                );
                                println!(
                                    "Reviews: {} ({:.0}% correct)",
                                    p.total_reviews,
                                    p.accuracy()
                                );
                                if let Some(last) = p.last_review_at {
                                    println!("Last reviewed: {}", last.to_rfc3339());
                                }
                                println!("Next review: {}", p.next_review_at.to_rfc3339());
                            }
                            None => println!("Not yet seen by {}.", learner),
                        }
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Item not found"))?
                    );
                } else {
                    println!("Item not found.");
                }
            }
        },

        Commands::Session { size } => {
            let size = size.unwrap_or(config.session.default_size);
            let session = scheduler.build_session(learner, size, now)?;
            let due_count = session.due_count();
            let new_count = session.new_count();
            let owner = session.learner_id().to_string();
            let as_of = session.as_of();

            let mut entries = Vec::with_capacity(session.len());
            for (i, item_id) in session.enumerate() {
                let item = scheduler.store().get_item(&item_id)?;
                entries.push((i < due_count, item_id, item));
            }

            if cli.json {
                let data: Vec<_> = entries
                    .iter()
                    .map(|(due, item_id, item)| {
                        let kind = if *due { "due" } else { "new" };
                        serde_json::json!({
                            "item_id": item_id,
                            "kind": kind,
                            "item": item,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "learner_id": owner,
                        "as_of": as_of,
                        "due_count": due_count,
                        "new_count": new_count,
                        "items": data,
                    })))?
                );
            } else if entries.is_empty() {
                println!("Nothing to review. Add some items first!");
            } else {
                println!(
                    "=== Review Session for {} ({} due, {} new) ===",
                    owner, due_count, new_count
                );
                println!("As of {}", as_of.to_rfc3339());
                for (i, (due, item_id, item)) in entries.iter().enumerate() {
                    let kind = if *due { "due" } else { "new" };
                    let word = item.as_ref().map(|it| it.word.as_str()).unwrap_or("?");
                    println!("{:>3}. [{}] {:<12} {}", i + 1, kind, truncate(item_id, 12), word);
                }
                println!();
                println!("Record each answer with:");
                println!("  vocab-srs review <item> --quality <1-5>");
            }
        }

        Commands::Review {
            item,
            quality,
            response_ms,
        } => {
            let updated = scheduler.submit_response(
                learner,
                &item,
                quality,
                response_ms.map(Duration::from_millis),
                now,
            )?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&updated))?);
            } else {
                println!("Review recorded for '{}'.", item);
                if updated.mastery_level != updated.previous_mastery_level {
                    println!(
                        "Mastery: {} -> {}",
                        updated.previous_mastery_level.label(),
                        updated.mastery_level.label()
                    );
                } else {
                    println!("Mastery: {}", updated.mastery_level.label());
                }
                println!(
                    "Next review in {} day(s): {}",
                    updated.progress.interval_days,
                    updated.progress.next_review_at.to_rfc3339()
                );
                println!("Ease factor: {:.2}", updated.progress.ease_factor);
            }
        }

        Commands::Due => {
            let due = scheduler.due_items(learner, now)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&due))?);
            } else if due.is_empty() {
                println!("Nothing due.");
            } else {
                for item_id in due {
                    println!("{}", item_id);
                }
            }
        }

        Commands::Stats => {
            let distribution = scheduler.mastery_distribution(learner)?;
            let due_now = scheduler.due_items(learner, now)?.len();
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "mastery_distribution": distribution,
                        "due_now": due_now,
                    })))?
                );
            } else {
                println!("=== Progress for {} ===", learner);
                for (level, count) in distribution.iter() {
                    println!("{:<10} {}", level.label(), count);
                }
                println!("Total items: {}", distribution.total());
                println!("Due now: {}", due_now);
            }
        }

        Commands::Preview { item } => {
            let previews = scheduler.preview(learner, &item, now)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&previews))?);
            } else {
                println!("{:<8} {:<10} {:<6} MASTERY", "QUALITY", "INTERVAL", "EASE");
                for p in previews {
                    println!(
                        "{:<8} {:<10} {:<6.2} {}",
                        p.quality,
                        format!("{}d", p.interval_days),
                        p.ease_factor,
                        p.mastery_level.label()
                    );
                }
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
