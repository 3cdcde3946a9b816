// 🔄 Pipeline - load → validate → clean → metrics → exporters
// Single linear pass; every stage hands the next a fresh collection

use crate::cleaner::{CleanedDataset, Cleaner};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::export::{exporters_for, GeneratedFile, JsonExporter, Exporter};
use crate::loader::{CsvLoader, LoadedSource};
use crate::metrics::{MetricSet, MetricsEngine};
use crate::quality::{DataQualityWarning, ValidationReport};
use crate::validator::Validator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// PIPELINE RUN
// ============================================================================

/// Everything one run produced, handed to the exporters
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source_path: PathBuf,
    pub source_sha256: String,
    pub report: ValidationReport,
    pub cleaned: CleanedDataset,
    /// One MetricSet per region, first-seen order
    pub metrics: Vec<MetricSet>,
    /// Validation, cleaning and metric warnings, in stage order
    pub warnings: Vec<DataQualityWarning>,
}

impl PipelineRun {
    /// The region the headline figures come from (first in the file)
    pub fn primary_metrics(&self) -> Option<&MetricSet> {
        self.metrics.first()
    }

    pub fn metrics_for(&self, region_code: &str) -> Option<&MetricSet> {
        self.metrics.iter().find(|m| m.region_code == region_code)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, validate, clean and compute metrics for one input file
    pub fn run(&self, source_path: &Path) -> Result<PipelineRun> {
        let span = info_span!("pipeline", source = %source_path.display());
        let _enter = span.enter();

        let source = CsvLoader::from_config(&self.config).load(source_path)?;
        self.run_loaded(source_path, source)
    }

    /// Stages after loading; used directly when rows come from memory
    pub fn run_loaded(&self, source_path: &Path, source: LoadedSource) -> Result<PipelineRun> {
        let validated = Validator::from_config(&self.config).validate(&source.rows)?;
        info!(summary = %validated.report.summary(), "Validation finished");

        let cleaned = Cleaner::from_config(&self.config).clean(&validated.records);

        let metrics = MetricsEngine::from_config(&self.config).compute_all(&cleaned)?;

        let mut warnings = validated.report.warnings.clone();
        warnings.extend(cleaned.warnings.iter().cloned());
        for set in &metrics {
            warnings.extend(set.warnings.iter().cloned());
        }

        let run = PipelineRun {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            source_path: source_path.to_path_buf(),
            source_sha256: source.sha256,
            report: validated.report,
            cleaned,
            metrics,
            warnings,
        };

        info!(
            run_id = %run.run_id,
            records = run.cleaned.records.len(),
            regions = run.metrics.len(),
            warnings = run.warnings.len(),
            "Pipeline run complete"
        );

        Ok(run)
    }

    /// Run every configured exporter, then write the JSON summary listing
    /// what was generated. Any exporter failure aborts.
    pub fn export(&self, run: &PipelineRun) -> Result<Vec<GeneratedFile>> {
        let span = info_span!("export", run_id = %run.run_id);
        let _enter = span.enter();

        let out_dir = &self.config.output_dir;
        fs::create_dir_all(out_dir).map_err(|e| {
            EtlError::Export(format!("Cannot create {}: {}", out_dir.display(), e))
        })?;

        let mut generated = Vec::new();
        for exporter in exporters_for(&self.config) {
            let files = exporter.export(run, out_dir).map_err(|e| {
                warn!(exporter = exporter.name(), error = %e, "Exporter failed");
                e
            })?;
            for file in &files {
                info!(exporter = exporter.name(), path = %file.path.display(), "Generated");
            }
            generated.extend(files);
        }

        let summary = JsonExporter::new(generated.clone()).export(run, out_dir)?;
        generated.extend(summary);

        info!(files = generated.len(), "Export complete");
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fingerprint;

    const SAMPLE: &str = "\
Indicador,DTI_CL_ANO,Año,DTI_CL_REGION,Región,DTI_CL_SEXO,Sexo,Value
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,_T,Ambos sexos,500000
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,M,Hombres,550000
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,F,Mujeres,450000
Ingreso medio,2021,2021,CHL14,Región de Los Ríos,_T,Ambos sexos,520000
Ingreso medio,2021,2021,CHL14,Región de Los Ríos,M,Hombres,575000
Ingreso medio,2021,2021,CHL14,Región de Los Ríos,F,Mujeres,
";

    fn loaded(text: &str) -> LoadedSource {
        let loader = CsvLoader::new(crate::config::Encoding::Utf8, ',');
        LoadedSource {
            rows: loader.parse_str(text).unwrap(),
            sha256: fingerprint(text.as_bytes()),
        }
    }

    #[test]
    fn test_run_collects_warnings_from_every_stage() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let run = pipeline
            .run_loaded(Path::new("sample.csv"), loaded(SAMPLE))
            .unwrap();

        assert_eq!(run.report.total_rows, 6);
        assert_eq!(run.report.accepted_rows, 5);
        assert_eq!(run.metrics.len(), 1);

        // Missing FEMALE value in 2021: malformed row + skipped gap year
        assert!(run
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::MalformedRow { .. })));
        assert!(run
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::SkippedGapYear { year: 2021, .. })));

        let primary = run.primary_metrics().unwrap();
        assert_eq!(primary.gender_gaps.len(), 1);
        assert!(run.metrics_for("CHL14").is_some());
    }

    #[test]
    fn test_run_is_idempotent() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let first = pipeline
            .run_loaded(Path::new("sample.csv"), loaded(SAMPLE))
            .unwrap();
        let second = pipeline
            .run_loaded(Path::new("sample.csv"), loaded(SAMPLE))
            .unwrap();

        assert_eq!(first.report, second.report);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.source_sha256, second.source_sha256);
        assert_ne!(first.run_id, second.run_id);
    }

    #[test]
    fn test_empty_input_is_a_validation_error() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let header_only = "Año,Región,Sexo,Value\n";

        let err = pipeline
            .run_loaded(Path::new("empty.csv"), loaded(header_only))
            .unwrap_err();
        assert!(matches!(err, EtlError::Validation(_)));
    }
}
