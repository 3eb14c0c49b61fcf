//! End-to-end checks over datasets written to disk.
//!
//! Run with: cargo test --test scenarios

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use ftlint::config::{DedupConfig, QualityConfig};
use ftlint::contamination::InMemoryRegistry;
use ftlint::dedup::{find_exact_duplicates, find_minhash_duplicates, DedupMethod};
use ftlint::quality::{self, QualityIssue, QualityResult, QualityRule, Severity};
use ftlint::{load_dataset, Analyzer, DatasetFormat, FtlintConfig};
use serde_json::json;
use tempfile::TempDir;

const BENCHMARK_QUESTION: &str = "which of the following statements best describes the primary \
    function of mitochondria in eukaryotic cells and how does this relate to cellular respiration";

fn chat(user: &str, assistant: &str) -> serde_json::Value {
    json!({
        "messages": [
            {"role": "user", "content": user},
            {"role": "assistant", "content": assistant}
        ]
    })
}

fn write_jsonl(dir: &Path, name: &str, records: &[serde_json::Value]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create dataset");
    for record in records {
        writeln!(file, "{}", record).expect("write record");
    }
    path
}

#[test]
fn test_exact_duplicates_in_loaded_file() {
    let dir = TempDir::new().expect("tempdir");
    let repeated = chat("Name a primary colour.", "Red is a primary colour.");
    let path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[
            chat("What is Rust?", "A systems programming language."),
            repeated.clone(),
            chat("What is a borrow?", "A reference to a value owned elsewhere."),
            repeated,
            chat("What is a crate?", "The unit of compilation in Rust."),
        ],
    );

    let dataset = load_dataset(&path, None).expect("load");
    assert_eq!(dataset.format, DatasetFormat::ChatMl);
    assert_eq!(dataset.sample_count(), 5);

    let result = find_exact_duplicates(&dataset);
    assert_eq!(result.clusters.len(), 1);
    assert_eq!(result.clusters[0].indices, vec![1, 3]);
    assert_eq!(result.clusters[0].similarity, 1.0);
    assert_eq!(result.total_duplicates, 2);
    assert_eq!(result.estimated_savings(), 1);
    assert!((result.duplicate_percentage - 40.0).abs() < 1e-9);
}

#[test]
fn test_empty_response_fails_quality() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[
            chat("Explain ownership.", "Each value has a single owner at a time."),
            chat("Explain borrowing.", "   "),
        ],
    );
    let dataset = load_dataset(&path, None).expect("load");

    let result = quality::check_quality(&dataset, &QualityConfig::default(), &DedupConfig::default())
        .expect("quality");
    let empty: Vec<&QualityIssue> = result.issues_with(QualityRule::EmptyResponse).collect();
    assert_eq!(empty.len(), 1);
    assert_eq!(empty[0].sample_index, 1);
    assert_eq!(empty[0].severity, Severity::Error);
    assert!(!result.passed());
}

#[test]
fn test_warnings_alone_still_pass() {
    let result = QualityResult::new(vec![
        QualityIssue::new(QualityRule::HighRepetition, 0, "repeats itself")
            .with_severity(Severity::Warning),
        QualityIssue::new(QualityRule::MissingSystem, 1, "no system message")
            .with_severity(Severity::Info),
    ]);
    assert_eq!(result.warning_count(), 1);
    assert!(result.passed());
}

#[test]
fn test_verbatim_benchmark_span_is_contamination() {
    let dir = TempDir::new().expect("tempdir");
    let leaked: Vec<&str> = BENCHMARK_QUESTION.split_whitespace().take(20).collect();
    let path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[
            chat("Tell me about cells.", &format!("Consider this: {}.", leaked.join(" "))),
            chat("What is photosynthesis?", "Plants turn light into chemical energy."),
        ],
    );
    let dataset = load_dataset(&path, None).expect("load");

    let registry = InMemoryRegistry::new().with_benchmark("mmlu", [BENCHMARK_QUESTION]);
    let analyzer = Analyzer::new(Arc::new(registry));
    let result = analyzer
        .check_contamination(&dataset, &["mmlu"], 13)
        .expect("contamination");

    assert!(result.is_contaminated());
    assert_eq!(result.contaminated_samples(), vec![0]);
    assert_eq!(result.benchmark_summary["mmlu"], 1);
    let hit = &result.matches[0];
    assert!(hit.overlap_score > 0.0 && hit.overlap_score <= 1.0);
    assert!(hit.matched_text.starts_with("which of the following"));
}

#[test]
fn test_turn_count_outlier_is_flagged() {
    let mut long = Vec::new();
    for _ in 0..10 {
        long.push(json!({"role": "user", "content": "hi"}));
        long.push(json!({"role": "assistant", "content": "hello"}));
    }
    let dir = TempDir::new().expect("tempdir");
    let path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[chat("hi", "hello"), chat("hi", "hello"), json!({ "messages": long })],
    );
    let dataset = load_dataset(&path, None).expect("load");

    let flagged: Vec<usize> = quality::check_turn_balance(&dataset)
        .iter()
        .filter(|issue| issue.rule == QualityRule::ImbalancedTurns)
        .map(|issue| issue.sample_index)
        .collect();
    assert_eq!(flagged, vec![2]);
}

#[test]
fn test_lower_minhash_threshold_never_finds_fewer() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[
            chat(
                "Summarize the plot of the novel in a few sentences.",
                "A young sailor leaves home, survives a storm and returns a changed man.",
            ),
            chat(
                "Summarize the plot of the novel in a few short sentences.",
                "A young sailor leaves home, survives a storm and returns a different man.",
            ),
            chat("List three prime numbers.", "Two, three and five."),
            chat("Translate hello into French.", "Bonjour."),
        ],
    );
    let dataset = load_dataset(&path, None).expect("load");

    let mut previous = usize::MAX;
    for threshold in [0.3, 0.5, 0.7, 0.9] {
        let found = find_minhash_duplicates(&dataset, threshold, 128).total_duplicates;
        assert!(found <= previous, "threshold {threshold} found {found} > {previous}");
        previous = found;
    }
}

#[tokio::test]
async fn test_analyze_with_config_and_benchmark_dir() {
    let dir = TempDir::new().expect("tempdir");
    let bench_dir = dir.path().join("benchmarks");
    std::fs::create_dir(&bench_dir).expect("benchmark dir");
    write_jsonl(&bench_dir, "mmlu.jsonl", &[json!({ "question": BENCHMARK_QUESTION })]);

    let dataset_path = write_jsonl(
        dir.path(),
        "train.jsonl",
        &[
            chat("Tell me about cells.", BENCHMARK_QUESTION),
            chat("What is Rust?", "A systems programming language."),
            chat("What is Rust?", "A systems programming language."),
        ],
    );
    let yaml = format!(
        "dedup:\n  method: exact\ncontamination:\n  benchmarks: [mmlu]\n  benchmark_dir: {}\n",
        bench_dir.display()
    );
    let config = FtlintConfig::from_yaml(&yaml).expect("config");
    assert_eq!(config.dedup.method, DedupMethod::Exact);

    let dataset = load_dataset(&dataset_path, config.format).expect("load");
    let analyzer = Analyzer::from_config(&config).expect("analyzer");
    let report = analyzer.analyze(&dataset, &config).await.expect("report");

    assert_eq!(report.sample_count, 3);
    let dedup = report.dedup.as_ref().expect("dedup section");
    assert_eq!(dedup.clusters[0].indices, vec![1, 2]);
    let contamination = report.contamination.as_ref().expect("contamination section");
    assert_eq!(contamination.contaminated_samples(), vec![0]);
    assert!(report.diversity.is_some());

    let summary = report.summary();
    assert_eq!(summary["duplicates"], 2);
    assert_eq!(summary["contaminated"], true);
}
