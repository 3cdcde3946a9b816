// Income ETL - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod cleaner;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod stats;
pub mod validator;

// Re-export commonly used types
pub use cleaner::{CleanRecord, CleanedDataset, Cleaner, SeriesOutliers};
pub use config::{parse_output_formats, Encoding, OutputFormat, PipelineConfig};
pub use db::{
    get_all_records, get_records_by_category, get_records_by_year_range, get_runs,
    insert_records, insert_run, open_database, setup_database, verify_count, RunRecord,
};
pub use error::{EtlError, Result};
pub use export::{exporters_for, ExportCapability, Exporter, GeneratedFile, RunSummary};
pub use loader::{CsvLoader, LoadedSource};
pub use metrics::{
    CategoryMetrics, GenderGap, MetricSet, MetricsEngine, SummaryStats, TrendDirection,
    YearRange,
};
pub use pipeline::{Pipeline, PipelineRun};
pub use quality::{DataQualityWarning, FieldRef, ValidationReport, YearGap};
pub use record::{format_currency, Category, IncomeRecord, RawRow, RecordKey};
pub use validator::{Validated, Validator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
