// ⚙️ Pipeline configuration
// Layering: defaults <- TOML file <- INCOME_ETL_* environment <- CLI flags

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "INCOME_ETL_";

// ============================================================================
// OUTPUT FORMATS
// ============================================================================

/// Optional output families. The JSON summary is always written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Cleaned CSV table
    Table,
    /// XLSX workbook
    Spreadsheet,
    /// SVG charts + HTML dashboard
    Chart,
}

impl OutputFormat {
    pub fn all() -> BTreeSet<OutputFormat> {
        [OutputFormat::Table, OutputFormat::Spreadsheet, OutputFormat::Chart]
            .into_iter()
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Spreadsheet => "spreadsheet",
            OutputFormat::Chart => "chart",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "table" => Ok(OutputFormat::Table),
            "excel" | "xlsx" | "spreadsheet" => Ok(OutputFormat::Spreadsheet),
            "charts" | "chart" | "svg" => Ok(OutputFormat::Chart),
            other => Err(EtlError::Config(format!("Unknown output format: {}", other))),
        }
    }
}

/// Parse a comma separated list; "all" expands to every format
pub fn parse_output_formats(value: &str) -> Result<BTreeSet<OutputFormat>> {
    let mut formats = BTreeSet::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("all") {
            return Ok(OutputFormat::all());
        }
        formats.insert(part.parse()?);
    }
    Ok(formats)
}

// ============================================================================
// INPUT ENCODING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl FromStr for Encoding {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(EtlError::Config(format!("Unsupported encoding: {}", other))),
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Standard-deviation multiplier for outlier flagging
    pub outlier_threshold: f64,

    pub output_formats: BTreeSet<OutputFormat>,

    pub output_dir: PathBuf,

    /// Chart dimensions in pixels
    pub figure_width: u32,
    pub figure_height: u32,

    /// SQLite export target (None = skip persistence)
    pub database_path: Option<PathBuf>,

    pub encoding: Encoding,
    pub delimiter: char,

    /// Plausible year range (inclusive)
    pub min_year: i32,
    pub max_year: i32,

    /// Leave flagged outlier years out of the metric series
    pub exclude_outliers: bool,

    pub log_level: String,
    pub log_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            outlier_threshold: 2.0,
            output_formats: OutputFormat::all(),
            output_dir: PathBuf::from("outputs"),
            figure_width: 1200,
            figure_height: 800,
            database_path: Some(PathBuf::from("data/processed/income.db")),
            encoding: Encoding::Utf8,
            delimiter: ',',
            min_year: 1950,
            max_year: 2100,
            exclude_outliers: false,
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the TOML file (if any), then the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply INCOME_ETL_* overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(value) = var("OUTLIER_THRESHOLD") {
            self.outlier_threshold = value.trim().parse().map_err(|_| {
                EtlError::Config(format!("Invalid OUTLIER_THRESHOLD: {}", value))
            })?;
        }
        if let Some(value) = var("OUTPUT_FORMATS") {
            self.output_formats = parse_output_formats(&value)?;
        }
        if let Some(value) = var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = var("DATABASE_PATH") {
            self.database_path = if value.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        if let Some(value) = var("ENCODING") {
            self.encoding = value.parse()?;
        }
        if let Some(value) = var("DELIMITER") {
            self.delimiter = single_char(&value)?;
        }
        if let Some(value) = var("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = var("LOG_DIR") {
            self.log_dir = PathBuf::from(value);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.outlier_threshold <= 0.0 || !self.outlier_threshold.is_finite() {
            return Err(EtlError::Config(format!(
                "outlier_threshold must be a positive number, got {}",
                self.outlier_threshold
            )));
        }
        if self.figure_width == 0 || self.figure_height == 0 {
            return Err(EtlError::Config(
                "figure dimensions must be non-zero".to_string(),
            ));
        }
        if self.min_year > self.max_year {
            return Err(EtlError::Config(format!(
                "min_year {} is after max_year {}",
                self.min_year, self.max_year
            )));
        }
        if !self.delimiter.is_ascii() {
            return Err(EtlError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }

    pub fn wants(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }
}

fn single_char(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(EtlError::Config(format!(
            "delimiter must be exactly one character, got {:?}",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.outlier_threshold, 2.0);
        assert_eq!(config.output_formats.len(), 3);
    }

    #[test]
    fn test_parse_output_formats() {
        let formats = parse_output_formats("csv, excel").unwrap();
        assert!(formats.contains(&OutputFormat::Table));
        assert!(formats.contains(&OutputFormat::Spreadsheet));
        assert!(!formats.contains(&OutputFormat::Chart));

        assert_eq!(parse_output_formats("charts,all").unwrap(), OutputFormat::all());
        assert!(parse_output_formats("pdf").is_err());
    }

    #[test]
    fn test_toml_partial_overrides() {
        let config = PipelineConfig::from_toml_str(
            r#"
            outlier_threshold = 1.5
            output_formats = ["table"]
            delimiter = ";"
            encoding = "latin-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.outlier_threshold, 1.5);
        assert_eq!(config.delimiter, ';');
        assert_eq!(config.encoding, Encoding::Latin1);
        assert_eq!(config.output_formats.len(), 1);
        // Untouched fields keep defaults
        assert_eq!(config.figure_width, 1200);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<String, String> = [
            ("INCOME_ETL_OUTLIER_THRESHOLD", "3"),
            ("INCOME_ETL_DATABASE_PATH", ""),
            ("INCOME_ETL_OUTPUT_FORMATS", "excel"),
            ("INCOME_ETL_DELIMITER", "\t"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env(|key| env.get(key).cloned()).unwrap();

        assert_eq!(config.outlier_threshold, 3.0);
        assert_eq!(config.database_path, None);
        assert!(config.wants(OutputFormat::Spreadsheet));
        assert!(!config.wants(OutputFormat::Table));
        assert_eq!(config.delimiter, '\t');
    }

    #[test]
    fn test_env_invalid_threshold() {
        let mut config = PipelineConfig::default();
        let result = config.apply_env(|key| {
            (key == "INCOME_ETL_OUTLIER_THRESHOLD").then(|| "two".to_string())
        });
        assert!(matches!(result, Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.outlier_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.min_year = 2030;
        config.max_year = 2000;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.figure_height = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.delimiter = 'ñ';
        assert!(config.validate().is_err());
    }
}
