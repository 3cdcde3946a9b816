// 📤 Exporters - thin I/O adapters over a finished PipelineRun
//
// Core trait (required): Exporter
// Adding an output = implement Exporter + register it in exporters_for()

pub mod chart;
pub mod csv;
pub mod dashboard;
pub mod json;
pub mod sqlite;
pub mod xlsx;

pub use self::chart::SvgChartExporter;
pub use self::csv::CsvExporter;
pub use self::dashboard::DashboardExporter;
pub use self::json::{JsonExporter, RunSummary};
pub use self::sqlite::SqliteExporter;
pub use self::xlsx::XlsxExporter;

use crate::config::{OutputFormat, PipelineConfig};
use crate::error::Result;
use crate::pipeline::PipelineRun;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// CORE TYPES
// ============================================================================

/// What kind of artifact an exporter produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportCapability {
    Table,
    Spreadsheet,
    Chart,
    Summary,
    Database,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub exporter: String,
    pub capability: ExportCapability,
    pub path: PathBuf,
}

impl GeneratedFile {
    pub fn new(exporter: &dyn Exporter, path: PathBuf) -> Self {
        GeneratedFile {
            exporter: exporter.name().to_string(),
            capability: exporter.capability(),
            path,
        }
    }
}

// ============================================================================
// EXPORTER TRAIT
// ============================================================================

pub trait Exporter {
    fn name(&self) -> &'static str;

    fn capability(&self) -> ExportCapability;

    /// Write artifacts for `run` under `out_dir`; returns what was written
    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>>;
}

// ============================================================================
// FACTORY
// ============================================================================

/// Exporters selected by the configured output formats. The JSON summary is
/// not included: it always runs last, after these.
pub fn exporters_for(config: &PipelineConfig) -> Vec<Box<dyn Exporter>> {
    let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();

    if config.wants(OutputFormat::Table) {
        exporters.push(Box::new(CsvExporter));
    }
    if config.wants(OutputFormat::Spreadsheet) {
        exporters.push(Box::new(XlsxExporter));
    }
    if config.wants(OutputFormat::Chart) {
        exporters.push(Box::new(SvgChartExporter::new(
            config.figure_width,
            config.figure_height,
        )));
        exporters.push(Box::new(DashboardExporter::new(
            config.figure_width,
            config.figure_height,
        )));
    }
    if let Some(path) = &config.database_path {
        exporters.push(Box::new(SqliteExporter::new(path.clone())));
    }

    exporters
}
