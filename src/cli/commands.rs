//! CLI command definitions for ftlint.
//!
//! Every command loads the dataset, runs one engine through [`Analyzer`]
//! and prints either JSON (`--json`) or a short plain-text summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::analyzer::{Analyzer, ProfileReport};
use crate::config::{load_config, FtlintConfig, CONFIG_FILENAME};
use crate::contamination::{catalog, BenchmarkEntry, ContaminationResult};
use crate::dataset::{load_dataset, Dataset, DatasetFormat};
use crate::dedup::{DedupMethod, DedupResult};
use crate::diversity::DiversityResult;
use crate::profiling::TokenStats;
use crate::quality::QualityResult;

/// Lint and profile LLM fine-tuning datasets.
#[derive(Parser)]
#[command(name = "ftlint")]
#[command(about = "Profile and validate LLM fine-tuning datasets")]
#[command(version)]
#[command(
    long_about = "ftlint analyzes ChatML, Alpaca and ShareGPT datasets for duplicates, quality defects, PII, benchmark contamination and topic diversity.\n\nAnalysis is read-only: no dataset is rewritten.\n\nExample usage:\n  ftlint check data/train.jsonl\n  ftlint dedup --method minhash data/train.jsonl --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a .ftlint.yaml file (discovered from the working directory by default).
    #[arg(short, long, global = true, env = "FTLINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Dataset format, overriding detection and the config file.
    #[arg(short, long, global = true)]
    pub format: Option<DatasetFormat>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Full report: profile, dedup, quality, contamination and diversity.
    Profile(PathArgs),

    /// Quick length and turn statistics.
    Stats(PathArgs),

    /// Duplicate analysis.
    Dedup(DedupArgs),

    /// Quality rules, heuristics and PII checks. Exits non-zero on errors.
    Check(CheckArgs),

    /// N-gram overlap against benchmark test sets.
    Contamination(ContaminationArgs),

    /// Topic clustering and diversity score.
    Diversity(PathArgs),

    /// Write a default .ftlint.yaml.
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct PathArgs {
    /// Dataset file.
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct DedupArgs {
    /// Dataset file.
    pub path: PathBuf,

    /// Deduplication method (exact, minhash, semantic); defaults to the config.
    #[arg(short, long)]
    pub method: Option<DedupMethod>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Dataset file.
    pub path: PathBuf,

    /// Also score samples with the configured LLM judge.
    #[arg(long)]
    pub judge: bool,

    /// Number of samples sent to the judge.
    #[arg(long, requires = "judge")]
    pub judge_samples: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ContaminationArgs {
    /// Dataset file.
    pub path: PathBuf,

    /// Benchmark to check against (repeatable); defaults to the config.
    #[arg(short, long = "benchmark")]
    pub benchmarks: Vec<String>,

    /// N-gram size in words; defaults to the config.
    #[arg(short, long)]
    pub ngram_size: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the file.
    #[arg(short, long, default_value = CONFIG_FILENAME)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Parse CLI arguments without executing any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init(args) = &cli.command {
        return run_init_command(args);
    }

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.format.is_some() {
        config.format = cli.format;
    }
    let analyzer = Analyzer::from_config(&config).context("Failed to set up analyzer")?;
    let output = Output { json: cli.json };

    match cli.command {
        Commands::Profile(args) => run_profile_command(&analyzer, &config, &args.path, output).await,
        Commands::Stats(args) => run_stats_command(&analyzer, &config, &args.path, output),
        Commands::Dedup(args) => run_dedup_command(&analyzer, &config, args, output).await,
        Commands::Check(args) => run_check_command(&analyzer, &config, args, output).await,
        Commands::Contamination(args) => run_contamination_command(&analyzer, &config, args, output),
        Commands::Diversity(args) => {
            run_diversity_command(&analyzer, &config, &args.path, output).await
        }
        Commands::Init(_) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    /// Prints `value` as JSON, or runs `plain` for text output.
    fn emit<T: Serialize>(&self, value: &T, plain: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            let json_output = serde_json::to_string_pretty(value)
                .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
            println!("{}", json_output);
        } else {
            plain();
        }
        Ok(())
    }
}

fn load(config: &FtlintConfig, path: &Path) -> anyhow::Result<Dataset> {
    let dataset = load_dataset(path, config.format)
        .with_context(|| format!("Failed to load dataset {}", path.display()))?;
    info!(
        path = %path.display(),
        format = %dataset.format,
        samples = dataset.sample_count(),
        "Dataset loaded"
    );
    Ok(dataset)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_profile_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    path: &Path,
    output: Output,
) -> anyhow::Result<()> {
    let dataset = load(config, path)?;
    let report = analyzer.analyze(&dataset, config).await?;
    output.emit(&report, || print_report(&report))
}

#[derive(Debug, Serialize)]
struct StatsOutput<'a> {
    path: String,
    format: DatasetFormat,
    samples: usize,
    prompt_tokens: &'a TokenStats,
    response_tokens: &'a TokenStats,
    total_tokens: &'a TokenStats,
    turns: &'a crate::profiling::TurnProfile,
}

fn run_stats_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    path: &Path,
    output: Output,
) -> anyhow::Result<()> {
    let dataset = load(config, path)?;
    let profile = analyzer.profile(&dataset, config.profiling.top_k_tokens);
    let stats = StatsOutput {
        path: dataset.display_path(),
        format: dataset.format,
        samples: dataset.sample_count(),
        prompt_tokens: &profile.length.prompt_tokens,
        response_tokens: &profile.length.response_tokens,
        total_tokens: &profile.length.total_tokens,
        turns: &profile.turns,
    };
    output.emit(&stats, || {
        println!("{} ({}, {} samples)", stats.path, stats.format, stats.samples);
        print_token_stats("prompt tokens", stats.prompt_tokens);
        print_token_stats("response tokens", stats.response_tokens);
        print_token_stats("total tokens", stats.total_tokens);
        println!(
            "  {:<16} min {} / median {:.1} / mean {:.1} / max {}",
            "turns", stats.turns.min, stats.turns.median, stats.turns.mean, stats.turns.max
        );
    })
}

async fn run_dedup_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    args: DedupArgs,
    output: Output,
) -> anyhow::Result<()> {
    let dataset = load(config, &args.path)?;
    let method = args.method.unwrap_or(config.dedup.method);
    let result = analyzer
        .find_duplicates(&dataset, method, &config.dedup)
        .await?;
    output.emit(&result, || print_dedup(method, &result))
}

async fn run_check_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    args: CheckArgs,
    output: Output,
) -> anyhow::Result<()> {
    let dataset = load(config, &args.path)?;
    let mut result = analyzer.check_quality(&dataset, &config.quality, &config.dedup)?;
    if args.judge {
        let sample_size = args.judge_samples.or(config.providers.judge_sample_size);
        result.merge(
            analyzer
                .score_with_llm(&dataset, &config.providers.judge_model, sample_size)
                .await?,
        );
    }
    output.emit(&result, || print_quality(&result))?;

    if !result.passed() {
        bail!("Quality check failed with {} error(s)", result.error_count());
    }
    Ok(())
}

fn run_contamination_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    args: ContaminationArgs,
    output: Output,
) -> anyhow::Result<()> {
    let benchmarks = if args.benchmarks.is_empty() {
        config.contamination.benchmarks.clone()
    } else {
        args.benchmarks
    };
    if benchmarks.is_empty() {
        bail!(
            "No benchmarks given; pass --benchmark or set contamination.benchmarks\n{}",
            benchmark_listing(&catalog(analyzer.registry()))
        );
    }
    let dataset = load(config, &args.path)?;
    let ngram_size = args.ngram_size.unwrap_or(config.contamination.ngram_size);
    let result = analyzer.check_contamination(&dataset, &benchmarks, ngram_size)?;
    output.emit(&result, || print_contamination(&result))
}

async fn run_diversity_command(
    analyzer: &Analyzer,
    config: &FtlintConfig,
    path: &Path,
    output: Output,
) -> anyhow::Result<()> {
    let dataset = load(config, path)?;
    let result = analyzer
        .cluster_topics(&dataset, config.diversity.min_cluster_size)
        .await?;
    output.emit(&result, || print_diversity(&result))
}

fn run_init_command(args: &InitArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }
    let yaml = FtlintConfig::default().to_yaml()?;
    fs::write(&args.output, yaml)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

// ============================================================================
// Plain-text rendering
// ============================================================================

fn print_token_stats(label: &str, stats: &TokenStats) {
    println!(
        "  {:<16} min {} / median {:.1} / mean {:.1} / p95 {:.1} / p99 {:.1} / max {} (sum {})",
        label, stats.min, stats.median, stats.mean, stats.p95, stats.p99, stats.max, stats.total
    );
}

fn print_dedup(method: DedupMethod, result: &DedupResult) {
    println!(
        "{} dedup: {} duplicate samples in {} clusters ({:.1}%), {} removable",
        method,
        result.total_duplicates,
        result.clusters.len(),
        result.duplicate_percentage,
        result.estimated_savings()
    );
    for cluster in &result.clusters {
        println!("  {:?} similarity {:.3}", cluster.indices, cluster.similarity);
    }
}

fn print_quality(result: &QualityResult) {
    for issue in &result.issues {
        println!(
            "  #{:<6} {} {:<7} {}",
            issue.sample_index,
            issue.rule,
            issue.severity.as_str(),
            issue.message
        );
    }
    println!(
        "{}: {} error(s), {} warning(s), {} info",
        if result.passed() { "PASSED" } else { "FAILED" },
        result.error_count(),
        result.warning_count(),
        result.info_count()
    );
}

fn print_contamination(result: &ContaminationResult) {
    for (benchmark, count) in &result.benchmark_summary {
        println!("  {:<12} {} sample(s)", benchmark, count);
    }
    for m in &result.matches {
        println!(
            "  #{:<6} {} overlap {:.3}: {}",
            m.sample_index, m.benchmark_name, m.overlap_score, m.matched_text
        );
    }
    println!(
        "{}",
        if result.is_contaminated() {
            "Contamination found"
        } else {
            "No contamination found"
        }
    );
}

/// One line per benchmark; unavailable ones need a test set in
/// `contamination.benchmark_dir`.
fn benchmark_listing(entries: &[BenchmarkEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "  {:<12} {:<13} {}",
                entry.name,
                if entry.available { "available" } else { "not installed" },
                entry.description.unwrap_or("")
            )
            .trim_end()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_diversity(result: &DiversityResult) {
    println!(
        "Diversity score {:.3} over {} topic(s), {} unclustered",
        result.diversity_score,
        result.clusters.len(),
        result.noise_indices.len()
    );
    for cluster in &result.clusters {
        println!("  {:<40} {} sample(s)", cluster.label, cluster.size());
    }
}

fn print_report(report: &ProfileReport) {
    println!(
        "{} ({}, {} samples, {} tokens)",
        report.dataset_path, report.dataset_format, report.sample_count, report.profile.total_tokens
    );
    print_token_stats("prompt tokens", &report.profile.length.prompt_tokens);
    print_token_stats("response tokens", &report.profile.length.response_tokens);
    println!(
        "  vocabulary       {} unique, TTR {:.3}",
        report.profile.vocab.unique_tokens, report.profile.vocab.type_token_ratio
    );
    if let Some(lang) = &report.profile.language.primary_language {
        println!(
            "  language         {} ({:.1}%)",
            lang, report.profile.language.primary_percentage
        );
    }
    if let Some(dedup) = &report.dedup {
        println!(
            "  duplicates       {} ({:.1}%)",
            dedup.total_duplicates, dedup.duplicate_percentage
        );
    }
    if let Some(quality) = &report.quality {
        println!(
            "  quality          {} error(s), {} warning(s), {} info",
            quality.error_count(),
            quality.warning_count(),
            quality.info_count()
        );
    }
    if let Some(contamination) = &report.contamination {
        println!(
            "  contamination    {} match(es)",
            contamination.matches.len()
        );
    }
    if let Some(diversity) = &report.diversity {
        println!("  diversity        {:.3}", diversity.diversity_score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dedup_with_method() {
        let cli = Cli::try_parse_from(["ftlint", "--json", "dedup", "--method", "minhash", "data.jsonl"])
            .expect("parse");
        assert!(cli.json);
        match cli.command {
            Commands::Dedup(args) => {
                assert_eq!(args.method, Some(DedupMethod::MinHash));
                assert_eq!(args.path, PathBuf::from("data.jsonl"));
            }
            _ => panic!("expected dedup"),
        }
    }

    #[test]
    fn test_parse_repeated_benchmarks() {
        let cli = Cli::try_parse_from([
            "ftlint", "contamination", "-b", "gsm8k", "-b", "mmlu", "data.jsonl",
        ])
        .expect("parse");
        match cli.command {
            Commands::Contamination(args) => assert_eq!(args.benchmarks, vec!["gsm8k", "mmlu"]),
            _ => panic!("expected contamination"),
        }
    }

    #[test]
    fn test_benchmark_listing_marks_availability() {
        let registry = crate::contamination::InMemoryRegistry::new()
            .with_benchmark("gsm8k", ["How many apples?"])
            .with_benchmark("internal_eval", ["held out"]);
        let listing = benchmark_listing(&catalog(&registry));
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines
            .iter()
            .any(|l| l.contains("gsm8k") && l.contains("available") && l.ends_with("Grade School Math 8K")));
        assert!(lines
            .iter()
            .any(|l| l.contains("mmlu") && l.contains("not installed")));
        assert!(lines.iter().any(|l| l.trim_end() == "  internal_eval available"));
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let target = dir.path().join(CONFIG_FILENAME);
        let args = InitArgs {
            output: target.clone(),
            force: false,
        };
        run_init_command(&args).expect("first write");
        assert!(FtlintConfig::from_yaml(&fs::read_to_string(&target).expect("read")).is_ok());
        assert!(run_init_command(&args).is_err());
    }
}
