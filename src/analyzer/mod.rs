//! Analysis façade with capability injection.
//!
//! [`Analyzer`] owns the optional external capabilities (embedding, topic
//! clustering, LLM judge, language detection) and a benchmark registry. Each
//! operation checks for the capability it needs before touching the
//! dataset, so a missing provider fails fast instead of mid-run.

mod report;

use std::sync::Arc;
use std::time::Duration;

pub use report::ProfileReport;

use crate::config::{DedupConfig, FtlintConfig, QualityConfig};
use crate::contamination::{self, BenchmarkRegistry, ContaminationResult, DirectoryRegistry, InMemoryRegistry};
use crate::dataset::Dataset;
use crate::dedup::{self, DedupMethod, DedupResult, MinHashDeduplicator};
use crate::diversity::{self, DiversityResult, EmbeddingProvider, GreedyCosineClusterer, HashEmbedder, TopicClusterer};
use crate::error::Result;
use crate::llm::{ChatJudge, JudgeProvider};
use crate::profiling::{self, LanguageDetector, ProfileResult, StopwordDetector};
use crate::quality::{self, JudgeSettings, QualityResult, QualityRule, RuleFilter};

/// Limits applied to external capability calls.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Per-call timeout for embedding and judge calls.
    pub timeout: Duration,
    /// Maximum judge calls in flight.
    pub max_concurrency: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_concurrency: 4,
        }
    }
}

/// Runs the analysis engines with injected capabilities.
pub struct Analyzer {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    clusterer: Option<Arc<dyn TopicClusterer>>,
    judge: Option<Arc<dyn JudgeProvider>>,
    language_detector: Option<Arc<dyn LanguageDetector>>,
    registry: Arc<dyn BenchmarkRegistry>,
    settings: AnalysisSettings,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryRegistry::new()))
    }
}

impl Analyzer {
    /// Creates an analyzer with no optional capabilities.
    pub fn new(registry: Arc<dyn BenchmarkRegistry>) -> Self {
        Self {
            embedder: None,
            clusterer: None,
            judge: None,
            language_detector: None,
            registry,
            settings: AnalysisSettings::default(),
        }
    }

    /// Builds an analyzer from configuration.
    ///
    /// Installs the hash embedder, the greedy clusterer, the stop-word
    /// detector when language detection is on, a directory registry when
    /// `benchmark_dir` is set and a chat judge when `judge_api_base` is set.
    pub fn from_config(config: &FtlintConfig) -> Result<Self> {
        config.validate()?;
        let registry: Arc<dyn BenchmarkRegistry> = match &config.contamination.benchmark_dir {
            Some(dir) => Arc::new(DirectoryRegistry::new(dir)),
            None => Arc::new(InMemoryRegistry::new()),
        };
        let settings = AnalysisSettings {
            timeout: Duration::from_secs(config.providers.timeout_secs),
            max_concurrency: config.providers.max_concurrency,
        };

        let mut analyzer = Self::new(registry)
            .with_settings(settings.clone())
            .with_embedder(Arc::new(HashEmbedder::new(
                config.providers.embedding_dimension,
            )))
            .with_clusterer(Arc::new(GreedyCosineClusterer::new(
                config.diversity.join_similarity,
            )));
        if config.profiling.language_detection {
            analyzer = analyzer.with_language_detector(Arc::new(StopwordDetector::new()));
        }
        if let Some(api_base) = &config.providers.judge_api_base {
            let api_key = std::env::var("FTLINT_JUDGE_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
            analyzer = analyzer.with_judge(Arc::new(ChatJudge::new(
                api_base.as_str(),
                api_key,
                settings.timeout,
            )?));
        }
        Ok(analyzer)
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_clusterer(mut self, clusterer: Arc<dyn TopicClusterer>) -> Self {
        self.clusterer = Some(clusterer);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgeProvider>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_language_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.language_detector = Some(detector);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn BenchmarkRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn registry(&self) -> &dyn BenchmarkRegistry {
        self.registry.as_ref()
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Length, turn, vocabulary and (with a detector) language profiles.
    pub fn profile(&self, dataset: &Dataset, top_k: usize) -> ProfileResult {
        profiling::profile_dataset(dataset, self.language_detector.as_deref(), top_k)
    }

    /// Runs the dedup strategy named by `method`.
    pub async fn find_duplicates(
        &self,
        dataset: &Dataset,
        method: DedupMethod,
        settings: &DedupConfig,
    ) -> Result<DedupResult> {
        match method {
            DedupMethod::Exact => Ok(dedup::find_exact_duplicates(dataset)),
            DedupMethod::MinHash => Ok(MinHashDeduplicator::with_params(
                settings.minhash_threshold,
                settings.minhash_num_perm,
                settings.shingle_size,
            )
            .find_duplicates(dataset)),
            DedupMethod::Semantic => {
                dedup::find_semantic_duplicates(
                    dataset,
                    self.embedder.as_deref(),
                    settings.semantic_threshold,
                    self.settings.timeout,
                )
                .await
            }
        }
    }

    /// Rules, heuristics, PII and, with a detector, language consistency.
    pub fn check_quality(
        &self,
        dataset: &Dataset,
        config: &QualityConfig,
        dedup: &DedupConfig,
    ) -> Result<QualityResult> {
        let mut result = quality::check_quality(dataset, config, dedup)?;
        let filter = RuleFilter::parse(&config.disabled_rules)?;
        if let Some(detector) = &self.language_detector {
            if filter.is_enabled(QualityRule::LanguageMismatch) {
                result.merge(quality::check_language_consistency(dataset, detector.as_ref()));
            }
        }
        Ok(result)
    }

    /// Scores samples with the injected judge.
    pub async fn score_with_llm(
        &self,
        dataset: &Dataset,
        model: &str,
        sample_size: Option<usize>,
    ) -> Result<QualityResult> {
        let settings = JudgeSettings {
            model: model.to_string(),
            sample_size,
            max_concurrency: self.settings.max_concurrency,
            timeout: self.settings.timeout,
            ..Default::default()
        };
        quality::score_with_llm(dataset, self.judge.clone(), &settings).await
    }

    pub fn check_contamination<S: AsRef<str>>(
        &self,
        dataset: &Dataset,
        benchmarks: &[S],
        ngram_size: usize,
    ) -> Result<ContaminationResult> {
        contamination::check_contamination(dataset, self.registry.as_ref(), benchmarks, ngram_size)
    }

    /// Topic clusters and diversity score. Without an injected clusterer the
    /// greedy cosine clusterer is used.
    pub async fn cluster_topics(
        &self,
        dataset: &Dataset,
        min_cluster_size: usize,
    ) -> Result<DiversityResult> {
        let fallback = GreedyCosineClusterer::default();
        let clusterer: &dyn TopicClusterer = match &self.clusterer {
            Some(c) => c.as_ref(),
            None => &fallback,
        };
        diversity::cluster_topics(
            dataset,
            self.embedder.as_deref(),
            clusterer,
            min_cluster_size,
            self.settings.timeout,
        )
        .await
    }

    /// Runs every configured analysis.
    ///
    /// Contamination runs when benchmarks are configured; diversity runs
    /// when both an embedder and a clusterer are present.
    pub async fn analyze(&self, dataset: &Dataset, config: &FtlintConfig) -> Result<ProfileReport> {
        let profile = self.profile(dataset, config.profiling.top_k_tokens);
        let mut report = ProfileReport::new(dataset, profile);

        report.dedup = Some(
            self.find_duplicates(dataset, config.dedup.method, &config.dedup)
                .await?,
        );
        report.quality = Some(self.check_quality(dataset, &config.quality, &config.dedup)?);
        if !config.contamination.benchmarks.is_empty() {
            report.contamination = Some(self.check_contamination(
                dataset,
                &config.contamination.benchmarks,
                config.contamination.ngram_size,
            )?);
        }
        if self.embedder.is_some() && self.clusterer.is_some() {
            report.diversity = Some(
                self.cluster_topics(dataset, config.diversity.min_cluster_size)
                    .await?,
            );
        }

        tracing::info!(
            path = %report.dataset_path,
            samples = report.sample_count,
            "Analysis finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, Message, Sample};
    use crate::error::FtlintError;

    fn dataset() -> Dataset {
        let make = |q: &str, a: &str| {
            let raw = format!("{{\"q\":\"{q}\"}}");
            Sample::new(
                vec![Message::user(q), Message::assistant(a)],
                DatasetFormat::ChatMl,
                raw,
                0,
            )
        };
        Dataset::new(
            vec![
                make("What is the capital of France?", "Paris is the capital of France."),
                make("What is two plus two?", "Two plus two is four."),
                make("What is the capital of France?", "Paris is the capital of France."),
            ],
            DatasetFormat::ChatMl,
            None,
        )
    }

    #[tokio::test]
    async fn test_semantic_dedup_requires_embedder() {
        let analyzer = Analyzer::default();
        let err = analyzer
            .find_duplicates(&dataset(), DedupMethod::Semantic, &DedupConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FtlintError::SemanticUnavailable));
    }

    #[tokio::test]
    async fn test_judge_requires_provider() {
        let err = Analyzer::default()
            .score_with_llm(&dataset(), "any-model", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FtlintError::LlmUnavailable));
    }

    #[tokio::test]
    async fn test_dispatch_exact_and_semantic() {
        let analyzer = Analyzer::default().with_embedder(Arc::new(HashEmbedder::default()));
        let config = DedupConfig::default();
        let exact = analyzer
            .find_duplicates(&dataset(), DedupMethod::Exact, &config)
            .await
            .expect("exact");
        assert_eq!(exact.clusters.len(), 1);
        assert_eq!(exact.clusters[0].indices, vec![0, 2]);

        let semantic = analyzer
            .find_duplicates(&dataset(), DedupMethod::Semantic, &config)
            .await
            .expect("semantic");
        assert_eq!(semantic.clusters[0].indices, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_analyze_from_default_config() {
        let config = FtlintConfig::default();
        let analyzer = Analyzer::from_config(&config).expect("analyzer");
        let report = analyzer.analyze(&dataset(), &config).await.expect("report");
        assert_eq!(report.sample_count, 3);
        assert_eq!(report.dedup.as_ref().map(|d| d.total_duplicates), Some(2));
        assert!(report.quality.is_some());
        assert!(report.contamination.is_none());
        assert!(report.diversity.is_some());
        assert_eq!(report.profile.language.primary_language.as_deref(), Some("en"));
    }

    #[test]
    fn test_contamination_unknown_benchmark() {
        let err = Analyzer::default()
            .check_contamination(&dataset(), &["mmlu"], 13)
            .unwrap_err();
        assert!(matches!(err, FtlintError::BenchmarkNotFound { .. }));
    }
}
