//! Aggregate analysis report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::contamination::ContaminationResult;
use crate::dataset::{Dataset, DatasetFormat};
use crate::dedup::DedupResult;
use crate::diversity::DiversityResult;
use crate::profiling::ProfileResult;
use crate::quality::QualityResult;

/// Every result produced for one dataset. Sections that were not run are
/// `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub dataset_path: String,
    pub dataset_format: DatasetFormat,
    pub sample_count: usize,
    pub profile: ProfileResult,
    pub dedup: Option<DedupResult>,
    pub quality: Option<QualityResult>,
    pub contamination: Option<ContaminationResult>,
    pub diversity: Option<DiversityResult>,
    pub generated_at: DateTime<Utc>,
}

impl ProfileReport {
    /// Report holding only the profile of `dataset`.
    pub fn new(dataset: &Dataset, profile: ProfileResult) -> Self {
        Self {
            dataset_path: dataset.display_path(),
            dataset_format: dataset.format,
            sample_count: dataset.sample_count(),
            profile,
            dedup: None,
            quality: None,
            contamination: None,
            diversity: None,
            generated_at: Utc::now(),
        }
    }

    /// Key metrics, one entry per section that ran.
    pub fn summary(&self) -> Map<String, Value> {
        let mut summary = Map::new();
        summary.insert("path".into(), json!(self.dataset_path));
        summary.insert("format".into(), json!(self.dataset_format.as_str()));
        summary.insert("samples".into(), json!(self.sample_count));
        summary.insert("total_tokens".into(), json!(self.profile.total_tokens));
        if let Some(dedup) = &self.dedup {
            summary.insert("duplicates".into(), json!(dedup.total_duplicates));
        }
        if let Some(quality) = &self.quality {
            summary.insert("quality_errors".into(), json!(quality.error_count()));
            summary.insert("quality_warnings".into(), json!(quality.warning_count()));
        }
        if let Some(contamination) = &self.contamination {
            summary.insert("contaminated".into(), json!(contamination.is_contaminated()));
        }
        if let Some(diversity) = &self.diversity {
            summary.insert("diversity_score".into(), json!(diversity.diversity_score));
        }
        summary
    }
}
