// 📊 Metrics Engine - growth, volatility, gender gap per region
//
// ALL is reported as its own series. It is never recomputed from MALE and
// FEMALE: the source publishes it as an independently measured category.

use crate::cleaner::{CleanRecord, CleanedDataset};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::quality::DataQualityWarning;
use crate::record::Category;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

// ============================================================================
// METRIC TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

impl TrendDirection {
    pub fn from_growth(growth: f64) -> Self {
        if growth > 0.0 {
            TrendDirection::Increasing
        } else if growth < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Flat
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "Increasing",
            TrendDirection::Decreasing => "Decreasing",
            TrendDirection::Flat => "Flat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub category: Category,
    pub start_year: i32,
    pub end_year: i32,
    pub first_value: f64,
    pub last_value: f64,
    pub growth_rate_percent: Option<f64>,
    pub average_annual_growth: Option<f64>,
    pub trend_direction: Option<TrendDirection>,
    /// Std deviation of year-over-year percent changes
    pub volatility: Option<f64>,
    pub stats: SummaryStats,
    pub outlier_years: BTreeSet<i32>,
}

/// Gender gap for one year with both MALE and FEMALE values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderGap {
    pub year: i32,
    pub male: f64,
    pub female: f64,
    /// ALL value for the year, reported as published
    pub total: Option<f64>,
    pub gap_absolute: f64,
    /// Gap relative to FEMALE income, in percent
    pub gap_percent: Option<f64>,
    /// Gap as a share of MALE income, in percent
    pub gap_share_of_male: Option<f64>,
}

impl GenderGap {
    pub fn favors(&self) -> Option<Category> {
        if self.gap_absolute > 0.0 {
            Some(Category::Male)
        } else if self.gap_absolute < 0.0 {
            Some(Category::Female)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

/// Everything computed for one region. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub region_code: String,
    pub region_name: String,
    pub year_range: YearRange,
    pub categories: BTreeMap<Category, CategoryMetrics>,
    pub gender_gaps: Vec<GenderGap>,
    pub skipped_gap_years: Vec<i32>,
    pub warnings: Vec<DataQualityWarning>,
}

impl MetricSet {
    pub fn category(&self, category: Category) -> Option<&CategoryMetrics> {
        self.categories.get(&category)
    }

    pub fn latest_gap(&self) -> Option<&GenderGap> {
        self.gender_gaps.iter().max_by_key(|g| g.year)
    }

    /// Short human-readable findings for logs and the dashboard
    pub fn insights(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(gap) = self.latest_gap() {
            if let Some(percent) = gap.gap_percent {
                lines.push(format!("Gender gap {}: {:.1}%", gap.year, percent));
            }
            match gap.favors() {
                Some(Category::Male) => lines.push("Men earn more than women".to_string()),
                Some(Category::Female) => lines.push("Women earn more than men".to_string()),
                _ => lines.push("No gender gap".to_string()),
            }
        }

        if let Some(total) = self.category(Category::All) {
            if let Some(growth) = total.growth_rate_percent {
                lines.push(format!(
                    "Total growth {}-{}: {:.1}%",
                    total.start_year, total.end_year, growth
                ));
            }
            if let Some(annual) = total.average_annual_growth {
                lines.push(format!("Average annual growth: {:.1}%", annual));
            }
            if let Some(trend) = total.trend_direction {
                lines.push(format!("Overall trend: {}", trend.name()));
            }
            lines.push(format!(
                "Historical mean income: {}",
                crate::record::format_currency(total.stats.mean)
            ));
            lines.push(format!(
                "Range: {} - {}",
                crate::record::format_currency(total.stats.min),
                crate::record::format_currency(total.stats.max)
            ));
        }

        lines
    }
}

/// (year, value) points sorted by year
pub type Series = Vec<(i32, f64)>;

// ============================================================================
// METRICS ENGINE
// ============================================================================

pub struct MetricsEngine {
    /// Drop flagged outlier years from every series before computing
    pub exclude_outliers: bool,
}

impl MetricsEngine {
    pub fn new(exclude_outliers: bool) -> Self {
        MetricsEngine { exclude_outliers }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.exclude_outliers)
    }

    /// `(last - first) / first * 100` over the years actually present
    pub fn growth_rate(category: Category, series: &[(i32, f64)]) -> Result<f64> {
        let (first, last) = match (series.first(), series.last()) {
            (Some(first), Some(last)) if series.len() >= 2 => (first.1, last.1),
            _ => {
                return Err(EtlError::insufficient(
                    category,
                    format!("growth rate needs two years, found {}", series.len()),
                ))
            }
        };

        if first == 0.0 {
            return Err(EtlError::insufficient(
                category,
                "growth rate undefined for a zero first value",
            ));
        }

        Ok((last - first) / first * 100.0)
    }

    /// Population std deviation of year-over-year percent changes
    pub fn volatility(category: Category, series: &[(i32, f64)]) -> Result<f64> {
        if series.len() < 2 {
            return Err(EtlError::insufficient(
                category,
                format!("volatility needs two years, found {}", series.len()),
            ));
        }

        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        let changes = stats::percent_changes(&values).ok_or_else(|| {
            EtlError::insufficient(category, "volatility undefined across a zero value")
        })?;

        stats::std_dev(&changes)
            .ok_or_else(|| EtlError::insufficient(category, "no year-over-year changes"))
    }

    /// Gaps for years with both MALE and FEMALE; one-sided years are
    /// returned separately, never as a zero gap
    pub fn gender_gaps(
        male: &[(i32, f64)],
        female: &[(i32, f64)],
        total: &[(i32, f64)],
    ) -> (Vec<GenderGap>, Vec<(i32, Category)>) {
        let male: BTreeMap<i32, f64> = male.iter().copied().collect();
        let female: BTreeMap<i32, f64> = female.iter().copied().collect();
        let total: BTreeMap<i32, f64> = total.iter().copied().collect();

        let years: BTreeSet<i32> = male.keys().chain(female.keys()).copied().collect();

        let mut gaps = Vec::new();
        let mut skipped = Vec::new();

        for year in years {
            match (male.get(&year), female.get(&year)) {
                (Some(&m), Some(&f)) => {
                    let gap_absolute = m - f;
                    gaps.push(GenderGap {
                        year,
                        male: m,
                        female: f,
                        total: total.get(&year).copied(),
                        gap_absolute,
                        gap_percent: (f != 0.0).then(|| gap_absolute / f * 100.0),
                        gap_share_of_male: (m != 0.0).then(|| gap_absolute / m * 100.0),
                    });
                }
                (Some(_), None) => skipped.push((year, Category::Male)),
                (None, Some(_)) => skipped.push((year, Category::Female)),
                (None, None) => {}
            }
        }

        (gaps, skipped)
    }

    /// Metrics for one category series. Growth/volatility failures are
    /// returned alongside instead of aborting.
    pub fn category_metrics(
        category: Category,
        series: &[(i32, f64)],
        outlier_years: BTreeSet<i32>,
    ) -> Result<(CategoryMetrics, Vec<EtlError>)> {
        let (Some(&(start_year, first_value)), Some(&(end_year, last_value))) =
            (series.first(), series.last())
        else {
            return Err(EtlError::insufficient(category, "no records"));
        };

        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        let stats = SummaryStats {
            mean: stats::mean(&values).unwrap_or(first_value),
            min: stats::min(&values).unwrap_or(first_value),
            max: stats::max(&values).unwrap_or(first_value),
            count: values.len(),
        };

        let mut failures = Vec::new();

        let growth_rate_percent = match Self::growth_rate(category, series) {
            Ok(growth) => Some(growth),
            Err(e) => {
                failures.push(e);
                None
            }
        };
        let volatility = match Self::volatility(category, series) {
            Ok(v) => Some(v),
            Err(e) => {
                failures.push(e);
                None
            }
        };

        let span = end_year - start_year;
        let average_annual_growth = growth_rate_percent
            .filter(|_| span > 0)
            .map(|g| g / span as f64);

        let metrics = CategoryMetrics {
            category,
            start_year,
            end_year,
            first_value,
            last_value,
            growth_rate_percent,
            average_annual_growth,
            trend_direction: growth_rate_percent.map(TrendDirection::from_growth),
            volatility,
            stats,
            outlier_years,
        };

        Ok((metrics, failures))
    }

    /// Full MetricSet for one region's cleaned records
    pub fn compute(
        &self,
        region_code: &str,
        region_name: &str,
        records: &[&CleanRecord],
    ) -> Result<MetricSet> {
        let mut series: BTreeMap<Category, Series> = BTreeMap::new();
        let mut outliers: BTreeMap<Category, BTreeSet<i32>> = BTreeMap::new();

        for clean in records {
            let record = &clean.record;
            if clean.is_outlier {
                outliers.entry(record.category).or_default().insert(record.year);
                if self.exclude_outliers {
                    continue;
                }
            }
            series
                .entry(record.category)
                .or_default()
                .push((record.year, record.income));
        }
        for points in series.values_mut() {
            points.sort_by_key(|(year, _)| *year);
        }

        let mut categories = BTreeMap::new();
        let mut warnings = Vec::new();

        for category in Category::ALL_CATEGORIES {
            let points = series.get(&category).map(Vec::as_slice).unwrap_or(&[]);
            let outlier_years = outliers.remove(&category).unwrap_or_default();

            let (metrics, failures) = match Self::category_metrics(category, points, outlier_years) {
                Ok(result) => result,
                Err(e) => {
                    warnings.push(insufficient_warning(region_code, e));
                    continue;
                }
            };

            warnings.extend(
                failures
                    .into_iter()
                    .map(|e| insufficient_warning(region_code, e)),
            );
            categories.insert(category, metrics);
        }

        let empty: Series = Vec::new();
        let (gender_gaps, skipped) = Self::gender_gaps(
            series.get(&Category::Male).unwrap_or(&empty),
            series.get(&Category::Female).unwrap_or(&empty),
            series.get(&Category::All).unwrap_or(&empty),
        );

        for (year, present) in &skipped {
            warnings.push(DataQualityWarning::SkippedGapYear {
                region_code: region_code.to_string(),
                year: *year,
                present: *present,
            });
        }

        let year_range = YearRange {
            start: categories.values().map(|m| m.start_year).min().unwrap_or_default(),
            end: categories.values().map(|m| m.end_year).max().unwrap_or_default(),
        };

        for warning in &warnings {
            warn!(%warning, "Metric warning");
        }

        let metric_set = MetricSet {
            region_code: region_code.to_string(),
            region_name: region_name.to_string(),
            year_range,
            categories,
            gender_gaps,
            skipped_gap_years: skipped.into_iter().map(|(year, _)| year).collect(),
            warnings,
        };

        info!(
            region = region_code,
            categories = metric_set.categories.len(),
            gap_years = metric_set.gender_gaps.len(),
            "Metrics computed"
        );

        Ok(metric_set)
    }

    /// One MetricSet per region, in first-seen region order
    pub fn compute_all(&self, dataset: &CleanedDataset) -> Result<Vec<MetricSet>> {
        dataset
            .regions()
            .iter()
            .map(|(code, name)| {
                let records: Vec<&CleanRecord> = dataset.for_region(code).collect();
                self.compute(code, name, &records)
            })
            .collect()
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(false)
    }
}

fn insufficient_warning(region_code: &str, error: EtlError) -> DataQualityWarning {
    match error {
        EtlError::InsufficientData { category, reason } => DataQualityWarning::InsufficientData {
            region_code: region_code.to_string(),
            category,
            reason,
        },
        other => DataQualityWarning::InsufficientData {
            region_code: region_code.to_string(),
            category: Category::All,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::Cleaner;
    use crate::record::IncomeRecord;

    fn record(year: i32, category: Category, income: f64) -> IncomeRecord {
        IncomeRecord {
            indicator: "Ingreso medio".to_string(),
            year,
            region_code: "CHL14".to_string(),
            region_name: "Región de Los Ríos".to_string(),
            category,
            category_label: category.label().to_string(),
            income,
            line: 0,
        }
    }

    fn compute(records: &[IncomeRecord]) -> Result<MetricSet> {
        let cleaned = Cleaner::default().clean(records);
        let refs: Vec<&CleanRecord> = cleaned.records.iter().collect();
        MetricsEngine::default().compute("CHL14", "Región de Los Ríos", &refs)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_growth_rate_first_to_last_year() {
        let growth =
            MetricsEngine::growth_rate(Category::All, &[(2010, 100.0), (2022, 252.9)]).unwrap();
        assert!(approx(growth, 152.9));
    }

    #[test]
    fn test_growth_rate_uses_years_present() {
        // 2011 and 2012 missing: still first=2010, last=2013
        let growth = MetricsEngine::growth_rate(
            Category::Male,
            &[(2010, 200.0), (2013, 300.0)],
        )
        .unwrap();
        assert!(approx(growth, 50.0));
    }

    #[test]
    fn test_growth_rate_insufficient_data() {
        let err = MetricsEngine::growth_rate(Category::Female, &[(2020, 1.0)]).unwrap_err();
        assert!(matches!(
            err,
            EtlError::InsufficientData { category: Category::Female, .. }
        ));

        let err = MetricsEngine::growth_rate(Category::All, &[(2019, 0.0), (2020, 5.0)]).unwrap_err();
        assert!(matches!(err, EtlError::InsufficientData { .. }));
    }

    #[test]
    fn test_volatility_of_yoy_changes() {
        // +10%, -10%: population std dev = 10
        let v = MetricsEngine::volatility(
            Category::All,
            &[(2010, 100.0), (2011, 110.0), (2012, 99.0)],
        )
        .unwrap();
        assert!(approx(v, 10.0));

        // Single change: zero spread
        let v = MetricsEngine::volatility(Category::All, &[(2010, 100.0), (2011, 150.0)]).unwrap();
        assert!(approx(v, 0.0));

        assert!(MetricsEngine::volatility(Category::All, &[(2010, 100.0)]).is_err());
    }

    #[test]
    fn test_gender_gap_reference_figures() {
        let (gaps, skipped) =
            MetricsEngine::gender_gaps(&[(2022, 765130.0)], &[(2022, 564381.0)], &[]);

        assert!(skipped.is_empty());
        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.gap_absolute, 200749.0);
        assert!((gap.gap_percent.unwrap() - 35.6).abs() < 0.05);
        assert!((gap.gap_share_of_male.unwrap() - 26.24).abs() < 0.01);
        assert_eq!(gap.total, None);
        assert_eq!(gap.favors(), Some(Category::Male));
    }

    #[test]
    fn test_one_sided_years_are_skipped() {
        let (gaps, skipped) = MetricsEngine::gender_gaps(
            &[(2020, 10.0), (2021, 12.0)],
            &[(2021, 9.0), (2022, 10.0)],
            &[(2021, 11.0)],
        );

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].year, 2021);
        assert_eq!(gaps[0].gap_absolute, 3.0);
        assert_eq!(gaps[0].total, Some(11.0));
        assert_eq!(skipped, vec![(2020, Category::Male), (2022, Category::Female)]);
    }

    #[test]
    fn test_zero_female_income_has_no_percent() {
        let (gaps, _) = MetricsEngine::gender_gaps(&[(2020, 10.0)], &[(2020, 0.0)], &[]);
        assert_eq!(gaps[0].gap_percent, None);
        assert_eq!(gaps[0].gap_absolute, 10.0);
    }

    #[test]
    fn test_metric_set_full_dataset() {
        let records = vec![
            record(2020, Category::All, 500000.0),
            record(2020, Category::Male, 550000.0),
            record(2020, Category::Female, 450000.0),
            record(2021, Category::All, 520000.0),
            record(2021, Category::Male, 570000.0),
            record(2021, Category::Female, 470000.0),
        ];

        let set = compute(&records).unwrap();

        assert_eq!(set.year_range, YearRange { start: 2020, end: 2021 });
        assert_eq!(set.categories.len(), 3);
        assert_eq!(set.gender_gaps.len(), 2);
        assert_eq!(set.gender_gaps[0].gap_absolute, 100000.0);
        assert!(set.skipped_gap_years.is_empty());
        assert!(set.warnings.is_empty());

        let total = set.category(Category::All).unwrap();
        assert!(approx(total.growth_rate_percent.unwrap(), 4.0));
        assert!(approx(total.average_annual_growth.unwrap(), 4.0));
        assert_eq!(total.trend_direction, Some(TrendDirection::Increasing));
        assert_eq!(total.stats.count, 2);
        assert!(approx(total.stats.mean, 510000.0));
        assert_eq!(set.latest_gap().unwrap().year, 2021);
        assert!(!set.insights().is_empty());
    }

    #[test]
    fn test_all_is_not_derived_from_male_and_female() {
        // ALL deliberately not the mean or sum of the other two
        let records = vec![
            record(2020, Category::All, 100.0),
            record(2020, Category::Male, 300.0),
            record(2020, Category::Female, 200.0),
            record(2021, Category::All, 110.0),
            record(2021, Category::Male, 330.0),
            record(2021, Category::Female, 220.0),
        ];

        let set = compute(&records).unwrap();
        let total = set.category(Category::All).unwrap();

        assert_eq!(total.first_value, 100.0);
        assert_eq!(total.last_value, 110.0);
        assert_eq!(set.gender_gaps[0].total, Some(100.0));
    }

    #[test]
    fn test_single_year_keeps_gap_and_warns() {
        let records = vec![
            record(2022, Category::All, 650000.0),
            record(2022, Category::Male, 765130.0),
            record(2022, Category::Female, 564381.0),
        ];

        let set = compute(&records).unwrap();

        let total = set.category(Category::All).unwrap();
        assert_eq!(total.growth_rate_percent, None);
        assert_eq!(total.average_annual_growth, None);
        assert_eq!(total.trend_direction, None);
        assert_eq!(total.volatility, None);
        assert_eq!(total.stats.count, 1);
        assert_eq!(set.year_range, YearRange { start: 2022, end: 2022 });

        assert_eq!(set.gender_gaps.len(), 1);
        assert_eq!(set.latest_gap().unwrap().gap_absolute, 200749.0);

        assert!(set.warnings.iter().any(|w| matches!(
            w,
            DataQualityWarning::InsufficientData { category: Category::All, .. }
        )));
    }

    #[test]
    fn test_region_without_all_is_reported_not_aborted() {
        let records = vec![
            record(2020, Category::Male, 110.0),
            record(2020, Category::Female, 90.0),
        ];

        let set = compute(&records).unwrap();

        assert!(set.category(Category::All).is_none());
        assert_eq!(set.gender_gaps.len(), 1);
        assert!(set.warnings.iter().any(|w| matches!(
            w,
            DataQualityWarning::InsufficientData { category: Category::All, .. }
        )));
    }

    #[test]
    fn test_insufficient_male_data_is_a_warning() {
        let records = vec![
            record(2020, Category::All, 100.0),
            record(2021, Category::All, 110.0),
            record(2021, Category::Male, 120.0),
        ];

        let set = compute(&records).unwrap();

        let male = set.category(Category::Male).unwrap();
        assert_eq!(male.growth_rate_percent, None);
        assert_eq!(male.volatility, None);
        assert!(set.category(Category::Female).is_none());
        assert_eq!(set.skipped_gap_years, vec![2021]);

        let insufficient = set
            .warnings
            .iter()
            .filter(|w| matches!(w, DataQualityWarning::InsufficientData { .. }))
            .count();
        // MALE growth + MALE volatility + FEMALE missing
        assert_eq!(insufficient, 3);
        assert!(set
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::SkippedGapYear { year: 2021, present: Category::Male, .. })));
    }

    #[test]
    fn test_exclude_outliers_drops_flagged_years() {
        let mut records: Vec<IncomeRecord> = (2010..2019)
            .map(|y| record(y, Category::All, 100.0))
            .collect();
        records.push(record(2019, Category::All, 1000.0));

        let cleaned = Cleaner::new(2.0).clean(&records);
        let refs: Vec<&CleanRecord> = cleaned.records.iter().collect();

        let kept = MetricsEngine::new(false).compute("CHL14", "Los Ríos", &refs).unwrap();
        let dropped = MetricsEngine::new(true).compute("CHL14", "Los Ríos", &refs).unwrap();

        let kept_all = kept.category(Category::All).unwrap();
        let dropped_all = dropped.category(Category::All).unwrap();

        assert_eq!(kept_all.end_year, 2019);
        assert!(approx(kept_all.growth_rate_percent.unwrap(), 900.0));
        assert_eq!(dropped_all.end_year, 2018);
        assert!(approx(dropped_all.growth_rate_percent.unwrap(), 0.0));
        assert_eq!(dropped_all.trend_direction, Some(TrendDirection::Flat));
        // Flag is reported either way
        assert!(kept_all.outlier_years.contains(&2019));
        assert!(dropped_all.outlier_years.contains(&2019));
    }

    #[test]
    fn test_metrics_are_idempotent() {
        let records = vec![
            record(2010, Category::All, 100.0),
            record(2012, Category::All, 130.0),
            record(2010, Category::Male, 120.0),
            record(2010, Category::Female, 80.0),
        ];

        assert_eq!(compute(&records).unwrap(), compute(&records).unwrap());
    }

    #[test]
    fn test_compute_all_per_region() {
        let mut records = vec![
            record(2020, Category::All, 100.0),
            record(2021, Category::All, 110.0),
        ];
        for (year, income) in [(2020, 200.0), (2021, 180.0)] {
            let mut other = record(year, Category::All, income);
            other.region_code = "CHL13".to_string();
            other.region_name = "Metropolitana".to_string();
            records.push(other);
        }

        let cleaned = Cleaner::default().clean(&records);
        let sets = MetricsEngine::default().compute_all(&cleaned).unwrap();

        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].region_code, "CHL14");
        assert_eq!(sets[1].region_name, "Metropolitana");
        assert_eq!(
            sets[1].category(Category::All).unwrap().trend_direction,
            Some(TrendDirection::Decreasing)
        );
    }
}
