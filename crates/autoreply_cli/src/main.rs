use anyhow::{Context, Result};
use autoreply_core::{
    build_listing, evaluate_cases, Author, EmbeddingProvider, EvalCase, FaqService,
    HashEmbeddingProvider, Listing, MatchOutcome, MatcherConfig, MatcherSettings,
    MiniLmEmbeddingProvider, RemoveOutcome, SimilarityMatcher, SqliteQaStore,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const HASH_EMBEDDING_DIM: usize = 384;

#[derive(Debug, Parser)]
#[command(name = "autoreply")]
#[command(version, about = "Per-guild FAQ auto-reply with semantic matching")]
struct Cli {
    /// SQLite database holding one FAQ row per guild.
    #[arg(long, global = true, env = "AUTOREPLY_DB", default_value = "autoreply.db")]
    db: PathBuf,

    /// TOML matcher settings (threshold, chunking, embed_timeout, cache).
    #[arg(long, global = true, env = "AUTOREPLY_CONFIG")]
    config: Option<PathBuf>,

    /// Path to all-MiniLM-L6-v2 style .safetensors weights. Requires --tokenizer-path.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file. Required when --model-path is set.
    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Add a question/answer pair to a guild.
    Add {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
    },
    /// Remove a pair by id.
    Remove {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        id: u64,
    },
    /// Show a guild's pairs.
    List {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        json: bool,
    },
    /// Append pairs from a JSONL file (ids are reassigned).
    Import {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        input: PathBuf,
    },
    /// Write a guild's pairs to a JSONL file.
    Export {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        output: PathBuf,
    },
    /// Match one message as if it were posted in the guild.
    Ask {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        message: String,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, default_value = "cli")]
        author: String,
    },
    /// Run scripted cases against a guild's FAQ.
    Eval {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        cases: PathBuf,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, default_value_t = 0.85)]
        min_pass_rate: f32,
    },
}

fn load_settings(cli: &Cli, threshold: Option<f32>) -> Result<MatcherSettings> {
    let config = match &cli.config {
        Some(path) => MatcherConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => MatcherConfig::default(),
    };
    let settings = config.validate()?;
    match threshold {
        Some(t) => Ok(settings.with_threshold(t).context("--threshold")?),
        None => Ok(settings),
    }
}

fn make_embedder(cli: &Cli) -> Result<Arc<dyn EmbeddingProvider>> {
    match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            tracing::info!(model = %model.display(), "loading embedding model");
            Ok(Arc::new(MiniLmEmbeddingProvider::load(model, tokenizer)?))
        }
        (None, None) => Ok(Arc::new(HashEmbeddingProvider::new(HASH_EMBEDDING_DIM))),
        _ => anyhow::bail!("--model-path and --tokenizer-path must both be provided"),
    }
}

fn read_eval_cases_json(path: &Path) -> Result<Vec<EvalCase>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let cases: Vec<EvalCase> = serde_json::from_reader(file).context("parse eval cases json")?;
    Ok(cases)
}

fn open_store(cli: &Cli) -> Result<SqliteQaStore> {
    SqliteQaStore::open(&cli.db).with_context(|| format!("open database {}", cli.db.display()))
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Add {
            guild,
            question,
            answer,
        } => {
            let pair = FaqService::new(open_store(&cli)?).add(*guild, question, answer)?;
            println!("QA pair added with ID {}.", pair.id);
        }
        Commands::Remove { guild, id } => {
            match FaqService::new(open_store(&cli)?).remove(*guild, *id)? {
                RemoveOutcome::Removed => println!("QA pair with ID {id} has been removed."),
                RemoveOutcome::NotFound => println!("No QA pair found with ID {id}."),
                RemoveOutcome::Empty => println!("No QA pairs found."),
            }
        }
        Commands::List { guild, json } => {
            let pairs = FaqService::new(open_store(&cli)?).list(*guild)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&pairs)?);
                return Ok(());
            }
            match build_listing(&pairs) {
                Listing::Empty => println!("No QA pairs found."),
                Listing::Page(page) => {
                    println!("{}", page.title);
                    for field in page.fields {
                        println!("{}\n  {}", field.name, field.value.replace('\n', "\n  "));
                    }
                }
                Listing::Attachment { file_name, content } => {
                    std::fs::write(&file_name, content)
                        .with_context(|| format!("write {file_name}"))?;
                    println!("The QA list is too long; written to {file_name}.");
                }
            }
        }
        Commands::Import { guild, input } => {
            let report = FaqService::new(open_store(&cli)?)
                .import_jsonl(*guild, input)
                .with_context(|| format!("import {}", input.display()))?;
            println!(
                "imported={} skipped={} input={}",
                report.added.len(),
                report.skipped,
                input.display()
            );
        }
        Commands::Export { guild, output } => {
            let count = FaqService::new(open_store(&cli)?)
                .export_jsonl(*guild, output)
                .with_context(|| format!("export {}", output.display()))?;
            println!("exported={count} output={}", output.display());
        }
        Commands::Ask {
            guild,
            message,
            threshold,
            author,
        } => {
            let settings = load_settings(&cli, *threshold)?;
            let matcher =
                SimilarityMatcher::from_settings(open_store(&cli)?, make_embedder(&cli)?, &settings);
            let author = Author {
                id: 0,
                name: author.clone(),
            };
            let outcome = matcher.find_best_match(*guild, message, &author, settings.threshold);

            println!("decision={:?}", outcome.decision());
            match outcome {
                MatchOutcome::Hit(hit) => {
                    println!(
                        "score={:.4} pair_id={} chunk={:?}",
                        hit.score, hit.pair_id, hit.chunk
                    );
                    println!("answer={}", hit.answer);
                }
                MatchOutcome::Miss => {}
                MatchOutcome::Unavailable(err) => println!("error={err}"),
            }
        }
        Commands::Eval {
            guild,
            cases,
            threshold,
            min_pass_rate,
        } => {
            let settings = load_settings(&cli, *threshold)?;
            let matcher =
                SimilarityMatcher::from_settings(open_store(&cli)?, make_embedder(&cli)?, &settings);
            let cases = read_eval_cases_json(cases)?;
            let summary = evaluate_cases(&matcher, *guild, &cases, settings.threshold);

            for o in &summary.outcomes {
                println!(
                    "case={} passed={} decision={:?} score={} latency={:.1}ms",
                    o.case_id,
                    o.passed,
                    o.actual_decision,
                    o.score.map_or_else(|| "null".to_string(), |s| format!("{s:.4}")),
                    o.latency_ms
                );
            }
            println!(
                "total={} passed={} failed={} pass_rate={:.4} required={:.4} meets_threshold={}",
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate,
                min_pass_rate,
                summary.meets(*min_pass_rate)
            );
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
