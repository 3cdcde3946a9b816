// ✅ Data Quality - validation report and non-fatal warnings
// Warnings are collected and reported alongside results, never dropped

use crate::record::{Category, RecordKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// DATA QUALITY WARNING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Row rejected for missing cells, bad types or out-of-range values
    MalformedRow { line: usize, reason: String },

    /// Later occurrence of an already seen (year, region, category)
    Duplicate {
        line: usize,
        first_line: usize,
        year: i32,
        region_code: String,
        category: Category,
    },

    /// Years missing inside a series' observed range
    YearGap {
        region_code: String,
        category: Category,
        missing_years: Vec<i32>,
    },

    ZeroIncome {
        line: usize,
        year: i32,
        category: Category,
    },

    Outlier {
        region_code: String,
        category: Category,
        year: i32,
        income: f64,
        z_score: f64,
    },

    /// Year with only one of MALE/FEMALE, left out of the gender gap
    SkippedGapYear {
        region_code: String,
        year: i32,
        present: Category,
    },

    /// Metric not computable for a non-mandatory category
    InsufficientData {
        region_code: String,
        category: Category,
        reason: String,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::MalformedRow { line, reason } => {
                write!(f, "line {}: {}", line, reason)
            }
            DataQualityWarning::Duplicate {
                line,
                first_line,
                year,
                region_code,
                category,
            } => write!(
                f,
                "line {}: duplicate {} {} {} (first seen on line {})",
                line, year, region_code, category, first_line
            ),
            DataQualityWarning::YearGap {
                region_code,
                category,
                missing_years,
            } => write!(
                f,
                "{} {}: missing years {:?}",
                region_code, category, missing_years
            ),
            DataQualityWarning::ZeroIncome {
                line,
                year,
                category,
            } => write!(f, "line {}: zero income for {} {}", line, category, year),
            DataQualityWarning::Outlier {
                region_code,
                category,
                year,
                income,
                z_score,
            } => write!(
                f,
                "{} {} {}: outlier {:.2} (z = {:.2})",
                region_code, category, year, income, z_score
            ),
            DataQualityWarning::SkippedGapYear {
                region_code,
                year,
                present,
            } => write!(
                f,
                "{} {}: only {} present, gender gap skipped",
                region_code, year, present
            ),
            DataQualityWarning::InsufficientData {
                region_code,
                category,
                reason,
            } => write!(f, "{} {}: {}", region_code, category, reason),
        }
    }
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

/// Reference to a missing cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub line: usize,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearGap {
    pub region_code: String,
    pub category: Category,
    pub missing_years: Vec<i32>,
}

/// Outcome of one validation pass. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub missing_fields: Vec<FieldRef>,
    pub duplicate_keys: BTreeSet<RecordKey>,
    pub type_errors: Vec<String>,
    pub invalid_values: Vec<String>,
    pub gaps: Vec<YearGap>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ValidationReport {
    pub fn rejected_rows(&self) -> usize {
        self.total_rows - self.accepted_rows
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} accepted, {} rejected | {} missing fields, {} type errors, {} invalid values, {} duplicates, {} gaps",
            self.total_rows,
            self.accepted_rows,
            self.rejected_rows(),
            self.missing_fields.len(),
            self.type_errors.len(),
            self.invalid_values.len(),
            self.duplicate_keys.len(),
            self.gaps.len()
        )
    }
}
