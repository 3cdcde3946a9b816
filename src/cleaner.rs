// 🧹 Cleaner - canonical labels and advisory outlier flags
// Produces a new sequence; validated records are never mutated

use crate::config::PipelineConfig;
use crate::quality::DataQualityWarning;
use crate::record::{Category, IncomeRecord};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

// ============================================================================
// CLEANED TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub record: IncomeRecord,

    /// Signed deviation from the series mean in standard deviations
    pub z_score: f64,

    /// Advisory only: consumers decide whether to exclude the year
    pub is_outlier: bool,
}

/// Outlier years of one (region, category) series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesOutliers {
    pub region_code: String,
    pub category: Category,
    pub years: BTreeSet<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedDataset {
    pub records: Vec<CleanRecord>,
    pub threshold: f64,
    pub outliers: Vec<SeriesOutliers>,
    pub warnings: Vec<DataQualityWarning>,
}

impl CleanedDataset {
    pub fn outlier_years(&self, region_code: &str, category: Category) -> BTreeSet<i32> {
        self.outliers
            .iter()
            .find(|s| s.region_code == region_code && s.category == category)
            .map(|s| s.years.clone())
            .unwrap_or_default()
    }

    /// Distinct regions in first-seen order
    pub fn regions(&self) -> Vec<(String, String)> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.record.region_code.clone()))
            .map(|r| (r.record.region_code.clone(), r.record.region_name.clone()))
            .collect()
    }

    pub fn for_region<'a>(&'a self, region_code: &'a str) -> impl Iterator<Item = &'a CleanRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.record.region_code == region_code)
    }

    pub fn outlier_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_outlier).count()
    }
}

// ============================================================================
// CLEANER
// ============================================================================

pub struct Cleaner {
    /// Standard-deviation multiplier (default 2.0)
    pub threshold: f64,
}

impl Cleaner {
    pub fn new(threshold: f64) -> Self {
        Cleaner { threshold }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.outlier_threshold)
    }

    pub fn clean(&self, records: &[IncomeRecord]) -> CleanedDataset {
        // Series statistics per (region, category)
        let mut series: BTreeMap<(String, Category), Vec<f64>> = BTreeMap::new();
        for record in records {
            series
                .entry((record.region_code.clone(), record.category))
                .or_default()
                .push(record.income);
        }

        let moments: BTreeMap<(String, Category), (f64, f64)> = series
            .iter()
            .filter_map(|(key, values)| {
                Some((key.clone(), (stats::mean(values)?, stats::std_dev(values)?)))
            })
            .collect();

        let mut outliers: BTreeMap<(String, Category), BTreeSet<i32>> = BTreeMap::new();
        let mut warnings = Vec::new();

        let cleaned: Vec<CleanRecord> = records
            .iter()
            .map(|record| {
                let key = (record.region_code.clone(), record.category);
                let (mean, std_dev) = moments.get(&key).copied().unwrap_or((record.income, 0.0));

                let z_score = if std_dev > 0.0 {
                    (record.income - mean) / std_dev
                } else {
                    0.0
                };
                let is_outlier = z_score.abs() > self.threshold;

                if is_outlier {
                    outliers.entry(key).or_default().insert(record.year);
                    warnings.push(DataQualityWarning::Outlier {
                        region_code: record.region_code.clone(),
                        category: record.category,
                        year: record.year,
                        income: record.income,
                        z_score,
                    });
                    debug!(year = record.year, category = %record.category, z_score, "Outlier flagged");
                }

                CleanRecord {
                    record: normalize(record),
                    z_score,
                    is_outlier,
                }
            })
            .collect();

        let outliers: Vec<SeriesOutliers> = outliers
            .into_iter()
            .map(|((region_code, category), years)| SeriesOutliers {
                region_code,
                category,
                years,
            })
            .collect();

        info!(
            records = cleaned.len(),
            outliers = warnings.len(),
            threshold = self.threshold,
            "Cleaning complete"
        );

        CleanedDataset {
            records: cleaned,
            threshold: self.threshold,
            outliers,
            warnings,
        }
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// Canonical label, whitespace-collapsed free text
fn normalize(record: &IncomeRecord) -> IncomeRecord {
    IncomeRecord {
        indicator: collapse_whitespace(&record.indicator),
        region_name: collapse_whitespace(&record.region_name),
        category_label: record.category.label().to_string(),
        ..record.clone()
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
