//! Retrieval Benchmark CLI
//!
//! Scores embedding models on retrieval tasks: chunked exact search over a
//! corpus, then standard IR metrics against relevance judgments.
//!
//! ## Quick Start
//!
//! ```bash
//! # Search and score in one run
//! ./retrieval-benchmark run \
//!     --corpus ./corpus.json \
//!     --queries ./queries.json \
//!     --qrels ./qrels.json \
//!     --model bge-small
//!
//! # Re-score a previous run with a different cutoff set
//! ./retrieval-benchmark evaluate \
//!     --results ./results/run.json \
//!     --qrels ./qrels.json \
//!     --k-values 1,10,100
//! ```
//!
//! Engine knobs (chunk size, batch size, score function, cutoffs) come from
//! `eval.toml` when present; CLI flags override it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use retrieval_benchmark::benchmark::{
    evaluate, evaluate_custom, load_qrels, CustomMetric, RetrievalScores,
};
use retrieval_benchmark::config::EvalConfig;
use retrieval_benchmark::dataset::ItemCollection;
use retrieval_benchmark::embedders::{FastEmbedBackend, FastEmbedModel};
use retrieval_benchmark::search::{
    cached, load_previous_results, DenseExactSearch, ResultSet, ScoreFunction,
};

#[derive(Parser)]
#[command(name = "retrieval-benchmark")]
#[command(about = "Benchmark embedding models on dense-retrieval tasks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run chunked exact search over a corpus and score the ranking
    Run {
        /// Path to the corpus JSON (array of items)
        #[arg(short, long)]
        corpus: PathBuf,

        /// Path to the query JSON (array of items)
        #[arg(short, long)]
        queries: PathBuf,

        /// Path to the qrels JSON ({query_id: {corpus_id: grade}})
        #[arg(long)]
        qrels: PathBuf,

        /// Output file for scores (JSON)
        #[arg(short, long, default_value = "results/retrieval_scores.json")]
        output: PathBuf,

        /// Embedding model (see `list`)
        #[arg(short, long, default_value = "bge-small")]
        model: String,

        /// Path to eval config file (TOML); defaults to ./eval.toml
        #[arg(long)]
        config: Option<PathBuf>,

        /// Score function: cos_sim or dot
        #[arg(long)]
        score_function: Option<String>,

        /// Candidates kept per query (default: max of k-values)
        #[arg(long)]
        top_k: Option<usize>,

        /// Metric cutoffs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        k_values: Option<Vec<usize>>,

        /// Corpus items encoded and ranked per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Batch size forwarded to the embedding provider
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip search: load a previous results file or https URL instead
        #[arg(long)]
        previous_results: Option<String>,

        /// Drop (qid, pid) pairs with qid == pid before scoring
        #[arg(long)]
        ignore_identical_ids: bool,
    },

    /// Score an existing results file against qrels
    Evaluate {
        /// Path to the results JSON ({query_id: {corpus_id: score}})
        #[arg(short, long)]
        results: PathBuf,

        /// Path to the qrels JSON
        #[arg(long)]
        qrels: PathBuf,

        /// Metric cutoffs (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "1,3,5,10,20,100,1000")]
        k_values: Vec<usize>,

        /// Score a supplementary metric (mrr, r_cap, hole, accuracy)
        /// instead of the standard table
        #[arg(long)]
        metric: Option<String>,

        /// Drop (qid, pid) pairs with qid == pid before scoring
        #[arg(long)]
        ignore_identical_ids: bool,

        /// Optional output file (JSON); printed to stdout otherwise
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available embedding models
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            corpus,
            queries,
            qrels,
            output,
            model,
            config,
            score_function,
            top_k,
            k_values,
            chunk_size,
            batch_size,
            previous_results,
            ignore_identical_ids,
        } => {
            let mut cfg = match config {
                Some(path) => EvalConfig::load(&path)?,
                None => EvalConfig::load_default()?,
            };
            if let Some(function) = score_function {
                cfg.score_function = function;
            }
            if let Some(top_k) = top_k {
                cfg.top_k = Some(top_k);
            }
            if let Some(k_values) = k_values {
                cfg.k_values = k_values;
            }
            if let Some(chunk_size) = chunk_size {
                cfg.corpus_chunk_size = chunk_size;
            }
            if let Some(batch_size) = batch_size {
                cfg.batch_size = batch_size;
            }
            if previous_results.is_some() {
                cfg.previous_results = previous_results;
            }
            cfg.ignore_identical_ids |= ignore_identical_ids;

            run_benchmark(&corpus, &queries, &qrels, &output, &model, cfg).await?;
        }

        Commands::Evaluate {
            results,
            qrels,
            k_values,
            metric,
            ignore_identical_ids,
            output,
        } => {
            evaluate_results(&results, &qrels, &k_values, metric, ignore_identical_ids, output)?;
        }

        Commands::List => {
            list_models();
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct RunOutput {
    model: String,
    score_function: &'static str,
    top_k: usize,
    k_values: Vec<usize>,
    scores: RetrievalScores,
}

/// Search, evaluate and write the score tables
async fn run_benchmark(
    corpus_path: &PathBuf,
    queries_path: &PathBuf,
    qrels_path: &PathBuf,
    output: &PathBuf,
    model_name: &str,
    cfg: EvalConfig,
) -> Result<()> {
    // Fail on a bad score function before touching any data
    let score_function = cfg.score_function()?;
    let top_k = cfg.top_k();

    println!("Loading corpus from {corpus_path:?}...");
    let corpus = ItemCollection::load(corpus_path)?;
    println!("Loading queries from {queries_path:?}...");
    let queries = ItemCollection::load(queries_path)?;
    let qrels = load_qrels(qrels_path)?;
    println!(
        "  {} corpus items, {} queries, {} judged queries",
        corpus.len(),
        queries.len(),
        qrels.len()
    );

    let results = match &cfg.previous_results {
        Some(location) => {
            println!("Loading previous results from {location}...");
            load_previous_results(location).await?
        }
        None => {
            search_with_model(&corpus, &queries, model_name, &cfg, top_k, score_function).await?
        }
    };

    let scores = evaluate(&qrels, &results, &cfg.k_values, cfg.ignore_identical_ids)?;
    print_scores(&scores);

    let run_output = RunOutput {
        model: model_name.to_string(),
        score_function: score_function.key(),
        top_k,
        k_values: cfg.k_values.clone(),
        scores,
    };
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&run_output)?;
    std::fs::write(output, json)?;
    println!("\nScores written to {output:?}");
    Ok(())
}

async fn search_with_model(
    corpus: &ItemCollection,
    queries: &ItemCollection,
    model_name: &str,
    cfg: &EvalConfig,
    top_k: usize,
    score_function: ScoreFunction,
) -> Result<ResultSet> {
    let model = FastEmbedModel::parse(model_name)
        .ok_or_else(|| anyhow!("unknown model `{model_name}`; see `retrieval-benchmark list`"))?;
    let backend = FastEmbedBackend::new(model).context("Failed to initialize embedding backend")?;
    let engine = DenseExactSearch::with_config(Arc::new(backend), cfg.search_config());
    let results = engine
        .search(corpus, queries, top_k, score_function)
        .await?;
    Ok(results)
}

/// Score an existing results file
fn evaluate_results(
    results_path: &PathBuf,
    qrels_path: &PathBuf,
    k_values: &[usize],
    metric: Option<String>,
    ignore_identical_ids: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let results = cached::parse_results_file(results_path)?;
    let qrels = load_qrels(qrels_path)?;

    let json = match metric {
        Some(name) => {
            let metric = CustomMetric::parse(&name)
                .ok_or_else(|| anyhow!("unknown metric `{name}` (try mrr, r_cap, hole, accuracy)"))?;
            let (means, naucs) = evaluate_custom(&qrels, &results, k_values, metric)?;
            print_table(metric.label(), &means);
            serde_json::to_string_pretty(&serde_json::json!({
                "scores": means,
                "naucs": naucs,
            }))?
        }
        None => {
            let scores = evaluate(&qrels, &results, k_values, ignore_identical_ids)?;
            print_scores(&scores);
            serde_json::to_string_pretty(&scores)?
        }
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, json)?;
            println!("\nScores written to {path:?}");
        }
        None => println!("\n{json}"),
    }
    Ok(())
}

fn print_table(label: &str, table: &BTreeMap<String, f64>) {
    println!("\n{label}:");
    for (key, value) in table {
        println!("  {key}: {value:.5}");
    }
}

fn print_scores(scores: &RetrievalScores) {
    print_table("NDCG", &scores.ndcg);
    print_table("MAP", &scores.map);
    print_table("Recall", &scores.recall);
    print_table("Precision", &scores.precision);
    println!("\n  ({} abstention diagnostics computed)", scores.naucs.len());
}

fn list_models() {
    println!("Available embedding models:\n");
    for model in FastEmbedModel::all() {
        println!(
            "  {:10} {} ({} dims)",
            model.cli_name(),
            model.model_id(),
            model.dimensions()
        );
    }
    println!("\nUse with: retrieval-benchmark run --model <name> ...");
}
