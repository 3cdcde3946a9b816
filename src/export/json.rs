// 🧾 JSON summary - run metadata, validation report, metrics, warnings

use super::{ExportCapability, Exporter, GeneratedFile};
use crate::error::Result;
use crate::metrics::MetricSet;
use crate::pipeline::PipelineRun;
use crate::quality::{DataQualityWarning, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SUMMARY_FILE: &str = "analysis_results.json";

/// The analysis_results.json document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub source_path: PathBuf,
    pub source_sha256: String,
    pub outlier_threshold: f64,
    pub outlier_count: usize,
    pub validation: ValidationReport,
    pub metrics: Vec<MetricSet>,
    /// Human-readable findings keyed by region code
    pub insights: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<DataQualityWarning>,
    pub generated_files: Vec<GeneratedFile>,
}

impl RunSummary {
    pub fn from_run(run: &PipelineRun, generated_files: Vec<GeneratedFile>) -> Self {
        RunSummary {
            run_id: run.run_id,
            generated_at: run.generated_at,
            version: crate::VERSION.to_string(),
            source_path: run.source_path.clone(),
            source_sha256: run.source_sha256.clone(),
            outlier_threshold: run.cleaned.threshold,
            outlier_count: run.cleaned.outlier_count(),
            validation: run.report.clone(),
            metrics: run.metrics.clone(),
            insights: run
                .metrics
                .iter()
                .map(|m| (m.region_code.clone(), m.insights()))
                .collect(),
            warnings: run.warnings.clone(),
            generated_files,
        }
    }
}

/// Always runs, after the other exporters, so it can list their files
pub struct JsonExporter {
    generated: Vec<GeneratedFile>,
}

impl JsonExporter {
    pub fn new(generated: Vec<GeneratedFile>) -> Self {
        JsonExporter { generated }
    }
}

impl Exporter for JsonExporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Summary
    }

    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let path = out_dir.join(SUMMARY_FILE);
        let summary = RunSummary::from_run(run, self.generated.clone());

        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;

        Ok(vec![GeneratedFile::new(self, path)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::sample_run;

    #[test]
    fn test_summary_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let run = sample_run();
        let earlier = vec![GeneratedFile {
            exporter: "csv".to_string(),
            capability: ExportCapability::Table,
            path: dir.path().join("income_data_processed.csv"),
        }];

        let files = JsonExporter::new(earlier.clone()).export(&run, dir.path()).unwrap();
        let text = fs::read_to_string(&files[0].path).unwrap();
        let summary: RunSummary = serde_json::from_str(&text).unwrap();

        assert_eq!(summary.run_id, run.run_id);
        assert_eq!(summary.validation, run.report);
        assert_eq!(summary.metrics.len(), run.metrics.len());
        assert_eq!(summary.generated_files, earlier);
        assert!(summary.insights["CHL14"]
            .iter()
            .any(|line| line.starts_with("Gender gap 2022: 35.6%")));
    }

    #[test]
    fn test_summary_json_shape() {
        let run = sample_run();
        let value = serde_json::to_value(RunSummary::from_run(&run, vec![])).unwrap();

        let gaps = &value["metrics"][0]["gender_gaps"];
        assert_eq!(gaps[2]["year"], 2022);
        assert_eq!(gaps[2]["gap_absolute"], 200749.0);
        assert_eq!(value["metrics"][0]["categories"]["ALL"]["trend_direction"], "increasing");
    }
}
