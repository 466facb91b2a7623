//! Chainspark CLI
//!
//! Operator/dev tooling over the library crates:
//! - Turning concrete SPARQL into reusable templates and back (`normalize`, `restore`)
//! - Inspecting the cache fingerprint a question produces (`canon`)
//! - Ranking seeded cache entries against a question (`similar`)
//! - Exercising the INJECT expression evaluator and chain engine offline
//!   (`eval`, `chain` with canned step results)

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chainspark_cache::{CacheConfig, CacheEntry, MemoryStore, QueryCache};
use chainspark_exec::{
    evaluate, resolve_injections, ExecutionError, PreviousResults, QueryExecutor,
    SequentialEngine, SparqlOutcome, Value,
};
use chainspark_template::{normalize_query, restore_template, CategoryValues};

#[derive(Parser)]
#[command(name = "chainspark")]
#[command(
    author,
    version,
    about = "Chainspark: SPARQL template caching and sequential execution"
)]
struct Cli {
    /// Log cache decisions and tolerated malformations to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a concrete SPARQL query into a placeholder template.
    ///
    /// Reads the query from stdin when no argument is given. With `--json`
    /// the full bundle (template + placeholder map + extracted values) is
    /// written to stdout, ready for `restore`.
    Normalize {
        /// Query text (stdin when omitted).
        query: Option<String>,
        /// Emit the template bundle as JSON instead of a report.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild a concrete query from a template bundle and a question.
    ///
    /// Values are extracted from the question and override the cached
    /// literals positionally (cyclic indexing), the way a cache hit does.
    Restore {
        /// Template bundle JSON, as produced by `normalize --json`.
        bundle: PathBuf,
        /// Question supplying the current values.
        question: String,
    },

    /// Print the canonical cache fingerprint of a question.
    Canon {
        question: String,
    },

    /// Rank seeded cache entries against a question.
    Similar {
        /// Seed file: JSON array of cache entries.
        seed: PathBuf,
        question: String,
        #[arg(long, default_value_t = 5)]
        top_n: usize,
        #[arg(long, default_value_t = 0.3)]
        min_similarity: f64,
    },

    /// Evaluate an INJECT expression against explicit bindings.
    Eval {
        expression: String,
        /// Variable binding as name=value; repeatable.
        #[arg(short, long = "bind")]
        bindings: Vec<String>,
    },

    /// Run a query chain against canned step results.
    ///
    /// Each executed step is echoed with its INJECT sites already
    /// resolved, so the substitution a live endpoint would see is visible.
    Chain {
        /// Chain file: JSON array of SPARQL step strings.
        steps: PathBuf,
        /// Canned results: JSON array of SPARQL outcome objects, consumed
        /// one per step (missing entries read as empty bindings).
        #[arg(long)]
        replay: Option<PathBuf>,
    },
}

/// Template bundle: everything `restore` needs, serialized by `normalize`.
#[derive(Serialize, Deserialize)]
struct TemplateBundle {
    template: String,
    placeholders: BTreeMap<String, String>,
    values: CategoryValues,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Normalize { query, json } => cmd_normalize(query.as_deref(), json),
        Commands::Restore { bundle, question } => cmd_restore(&bundle, &question),
        Commands::Canon { question } => cmd_canon(&question),
        Commands::Similar {
            seed,
            question,
            top_n,
            min_similarity,
        } => cmd_similar(&seed, &question, top_n, min_similarity),
        Commands::Eval {
            expression,
            bindings,
        } => cmd_eval(&expression, &bindings),
        Commands::Chain { steps, replay } => cmd_chain(&steps, replay.as_deref()),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::filter::LevelFilter;
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

// ============================================================================
// Templates
// ============================================================================

fn cmd_normalize(query: Option<&str>, json: bool) -> Result<()> {
    let query = match query {
        Some(text) => text.to_string(),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading query from stdin")?;
            buffer
        }
    };

    let normalized = normalize_query(&query);

    if json {
        let bundle = TemplateBundle {
            template: normalized.template,
            placeholders: normalized.placeholders,
            values: normalized.values,
        };
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    println!("{}", normalized.template);
    if !normalized.placeholders.is_empty() {
        eprintln!();
        eprintln!("{}", "placeholders:".cyan().bold());
        for (tag, literal) in &normalized.placeholders {
            eprintln!("  {} {} {}", tag.bold(), "←".cyan(), literal);
        }
    }
    Ok(())
}

fn cmd_restore(bundle_path: &Path, question: &str) -> Result<()> {
    let text = fs::read_to_string(bundle_path)
        .with_context(|| format!("reading {}", bundle_path.display()))?;
    let bundle: TemplateBundle =
        serde_json::from_str(&text).context("parsing template bundle")?;

    let current = CategoryValues::from_question(question);
    if current.is_empty() {
        eprintln!(
            "{} no values extracted from the question; cached literals apply",
            "note:".yellow().bold()
        );
    }

    let restored = restore_template(&bundle.template, &bundle.placeholders, &current);
    println!("{restored}");
    Ok(())
}

fn cmd_canon(question: &str) -> Result<()> {
    println!("{}", chainspark_cache::canonicalize_question(question));
    Ok(())
}

// ============================================================================
// Cache
// ============================================================================

fn cmd_similar(seed: &Path, question: &str, top_n: usize, min_similarity: f64) -> Result<()> {
    let text =
        fs::read_to_string(seed).with_context(|| format!("reading {}", seed.display()))?;
    let entries: Vec<CacheEntry> = serde_json::from_str(&text).context("parsing seed entries")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move {
        let cache = QueryCache::new(MemoryStore::new(), CacheConfig::default());
        let mut seeded = 0usize;
        for entry in entries {
            let seed_question = entry.original_query.clone();
            cache.store_entry(&seed_question, entry).await?;
            seeded += 1;
        }
        eprintln!("{} {seeded} entries", "seeded".green().bold());

        let ranked = cache
            .find_similar_queries(question, top_n, min_similarity)
            .await?;
        if ranked.is_empty() {
            eprintln!(
                "{} nothing at or above {min_similarity}",
                "no matches:".yellow().bold()
            );
            return Ok(());
        }
        for similar in ranked {
            let marker = if similar.is_sequential { " [chain]" } else { "" };
            println!(
                "{:>6.3}  {}{}",
                similar.similarity_score,
                similar.original_query,
                marker.cyan()
            );
        }
        Ok(())
    })
}

// ============================================================================
// Execution
// ============================================================================

fn cmd_eval(expression: &str, bindings: &[String]) -> Result<()> {
    let env = parse_bindings(bindings)?;

    match evaluate(expression, &env) {
        Ok(value) => println!("{value}"),
        Err(e) => eprintln!("{} {e}", "eval failed:".yellow().bold()),
    }

    // What an INJECT site would substitute, defaults and clamping included.
    let injected = resolve_injections(&format!("INJECT({expression})"), &env);
    eprintln!("{} {injected}", "as injected literal:".cyan());
    Ok(())
}

fn cmd_chain(steps_path: &Path, replay: Option<&Path>) -> Result<()> {
    let text = fs::read_to_string(steps_path)
        .with_context(|| format!("reading {}", steps_path.display()))?;
    let steps: Vec<String> = serde_json::from_str(&text).context("parsing chain steps")?;

    let outcomes: Vec<SparqlOutcome> = match replay {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).context("parsing replay outcomes")?
        }
        None => Vec::new(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move {
        let executor = ReplayExecutor::new(outcomes);
        let engine = SequentialEngine::new(&executor);
        let outcome = engine.run_chain(&steps).await;

        eprintln!();
        if outcome.has_data {
            eprintln!(
                "{} {} step(s) run",
                "ok".green().bold(),
                outcome.steps_run
            );
        } else {
            eprintln!(
                "{} after {} step(s){}",
                "no data".yellow().bold(),
                outcome.steps_run,
                outcome
                    .error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
        }
        if let Some(result) = outcome.result {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(())
    })
}

fn parse_bindings(bindings: &[String]) -> Result<PreviousResults> {
    let mut env = PreviousResults::new();
    for binding in bindings {
        let (name, value) = binding
            .split_once('=')
            .ok_or_else(|| anyhow!("binding `{binding}` is not name=value"))?;
        env.insert(name.trim().to_string(), Value::parse_scalar(value.trim()));
    }
    Ok(env)
}

/// Executor that replays canned outcomes in order, echoing each step's
/// fully substituted query. Steps beyond the canned list read as empty.
struct ReplayExecutor {
    outcomes: Mutex<std::collections::VecDeque<SparqlOutcome>>,
    step: Mutex<usize>,
}

impl ReplayExecutor {
    fn new(outcomes: Vec<SparqlOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            step: Mutex::new(0),
        }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for ReplayExecutor {
    async fn execute(&self, sparql: &str) -> Result<SparqlOutcome, ExecutionError> {
        let step = {
            let mut step = self.step.lock();
            *step += 1;
            *step
        };
        eprintln!("{} {}", format!("step {step}:").cyan().bold(), sparql);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| SparqlOutcome::from_rows(Vec::new()));
        Ok(outcome)
    }
}
