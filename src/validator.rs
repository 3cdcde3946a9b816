// 🔍 Validator - structural and semantic checks over raw rows
// One pass: type every row, drop malformed ones, keep first of duplicates,
// then report year gaps per series

use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::quality::{DataQualityWarning, FieldRef, ValidationReport, YearGap};
use crate::record::{Category, IncomeRecord, RawRow, RecordKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Validator output: the report and the records that passed
#[derive(Debug, Clone)]
pub struct Validated {
    pub report: ValidationReport,
    pub records: Vec<IncomeRecord>,
}

pub struct Validator {
    min_year: i32,
    max_year: i32,
}

/// Per-row outcome before duplicate detection
enum RowCheck {
    Valid(IncomeRecord),
    Missing(Vec<&'static str>),
    TypeErrors(Vec<String>),
    Invalid(Vec<String>),
}

impl Validator {
    pub fn new(min_year: i32, max_year: i32) -> Self {
        Validator { min_year, max_year }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_year, config.max_year)
    }

    /// Validate rows in order. Fails only when nothing valid remains or a
    /// region has no rows of the mandatory ALL category.
    pub fn validate(&self, rows: &[RawRow]) -> Result<Validated> {
        let mut report = ValidationReport {
            total_rows: rows.len(),
            ..Default::default()
        };
        let mut records: Vec<IncomeRecord> = Vec::new();
        let mut first_seen: HashMap<RecordKey, usize> = HashMap::new();

        for row in rows {
            match self.check_row(row) {
                RowCheck::Missing(fields) => {
                    for field in &fields {
                        report.missing_fields.push(FieldRef {
                            line: row.line,
                            field: field.to_string(),
                        });
                    }
                    report.warnings.push(DataQualityWarning::MalformedRow {
                        line: row.line,
                        reason: format!("missing {}", fields.join(", ")),
                    });
                }
                RowCheck::TypeErrors(errors) => {
                    for error in errors {
                        report.warnings.push(DataQualityWarning::MalformedRow {
                            line: row.line,
                            reason: error.clone(),
                        });
                        report.type_errors.push(format!("line {}: {}", row.line, error));
                    }
                }
                RowCheck::Invalid(errors) => {
                    for error in errors {
                        report.warnings.push(DataQualityWarning::MalformedRow {
                            line: row.line,
                            reason: error.clone(),
                        });
                        report
                            .invalid_values
                            .push(format!("line {}: {}", row.line, error));
                    }
                }
                RowCheck::Valid(record) => {
                    let key = record.key();
                    if let Some(&first_line) = first_seen.get(&key) {
                        report.warnings.push(DataQualityWarning::Duplicate {
                            line: record.line,
                            first_line,
                            year: key.year,
                            region_code: key.region_code.clone(),
                            category: key.category,
                        });
                        report.duplicate_keys.insert(key);
                        continue;
                    }

                    if record.income == 0.0 {
                        report.warnings.push(DataQualityWarning::ZeroIncome {
                            line: record.line,
                            year: record.year,
                            category: record.category,
                        });
                    }

                    first_seen.insert(key, record.line);
                    records.push(record);
                }
            }
        }

        report.accepted_rows = records.len();

        if records.is_empty() {
            return Err(EtlError::Validation(format!(
                "No valid records: {} rows read, all rejected or file empty",
                report.total_rows
            )));
        }

        let lacking = regions_without_total(&records);
        if !lacking.is_empty() {
            return Err(EtlError::Validation(format!(
                "Required category {} is absent for region(s) {} ({} valid records)",
                Category::All,
                lacking.join(", "),
                records.len()
            )));
        }

        report.gaps = find_year_gaps(&records);
        for gap in &report.gaps {
            report.warnings.push(DataQualityWarning::YearGap {
                region_code: gap.region_code.clone(),
                category: gap.category,
                missing_years: gap.missing_years.clone(),
            });
        }

        for warning in &report.warnings {
            warn!(%warning, "Data quality issue");
        }
        info!(summary = %report.summary(), "Validation complete");

        Ok(Validated { report, records })
    }

    fn check_row(&self, row: &RawRow) -> RowCheck {
        let mut missing = Vec::new();
        if row.year.is_none() {
            missing.push("year");
        }
        if row.region().is_none() {
            missing.push("region");
        }
        if row.category().is_none() {
            missing.push("category");
        }
        if row.value.is_none() {
            missing.push("income");
        }

        let (Some(year_cell), Some(region), Some(category_cell), Some(value_cell)) = (
            row.year.as_deref(),
            row.region(),
            row.category(),
            row.value.as_deref(),
        ) else {
            return RowCheck::Missing(missing);
        };

        let mut type_errors = Vec::new();
        let year = parse_year(year_cell);
        if year.is_none() {
            type_errors.push(format!("year is not an integer: {:?}", year_cell));
        }
        let category = Category::parse(category_cell);
        if category.is_none() {
            type_errors.push(format!("unknown category: {:?}", category_cell));
        }
        let income = parse_income(value_cell);
        if income.is_none() {
            type_errors.push(format!("income is not a number: {:?}", value_cell));
        }

        let (Some(year), Some(category), Some(income)) = (year, category, income) else {
            return RowCheck::TypeErrors(type_errors);
        };

        let mut invalid = Vec::new();
        if year < self.min_year || year > self.max_year {
            invalid.push(format!(
                "year {} outside {}..={}",
                year, self.min_year, self.max_year
            ));
        }
        if income < 0.0 {
            invalid.push(format!("negative income {}", income));
        }
        if !invalid.is_empty() {
            return RowCheck::Invalid(invalid);
        }

        debug!(line = row.line, year, %category, income, "Row accepted");

        RowCheck::Valid(IncomeRecord {
            indicator: row.indicator.clone().unwrap_or_default(),
            year,
            region_code: region.to_string(),
            region_name: row
                .region_name
                .clone()
                .unwrap_or_else(|| region.to_string()),
            category,
            category_label: row
                .category_label
                .clone()
                .unwrap_or_else(|| category_cell.to_string()),
            income,
            line: row.line,
        })
    }
}

/// Accepts "2020" and "2020.0"
fn parse_year(cell: &str) -> Option<i32> {
    if let Ok(year) = cell.parse::<i32>() {
        return Some(year);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

fn parse_income(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Missing years inside each (region, category) observed min..=max range
pub fn find_year_gaps(records: &[IncomeRecord]) -> Vec<YearGap> {
    let mut series: BTreeMap<(String, Category), BTreeSet<i32>> = BTreeMap::new();
    for record in records {
        series
            .entry((record.region_code.clone(), record.category))
            .or_default()
            .insert(record.year);
    }

    series
        .into_iter()
        .filter_map(|((region_code, category), years)| {
            let first = *years.iter().next()?;
            let last = *years.iter().next_back()?;
            let missing_years: Vec<i32> = (first..=last).filter(|y| !years.contains(y)).collect();

            (!missing_years.is_empty()).then_some(YearGap {
                region_code,
                category,
                missing_years,
            })
        })
        .collect()
}

/// Region codes with no ALL record, in first-seen order
fn regions_without_total(records: &[IncomeRecord]) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut has_total: HashMap<&str, bool> = HashMap::new();

    for record in records {
        let code = record.region_code.as_str();
        let seen = has_total.entry(code).or_insert_with(|| {
            order.push(code);
            false
        });
        *seen |= record.category == Category::All;
    }

    order
        .into_iter()
        .filter(|code| !has_total[code])
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(line: usize, year: &str, category: &str, value: &str) -> RawRow {
        let cell = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RawRow {
            line,
            indicator: Some("Ingreso medio".to_string()),
            year: cell(year),
            region_code: Some("CHL14".to_string()),
            region_name: Some("Región de Los Ríos".to_string()),
            category_code: cell(category),
            category_label: None,
            value: cell(value),
        }
    }

    fn validator() -> Validator {
        Validator::new(1950, 2100)
    }

    #[test]
    fn test_valid_rows_pass() {
        let rows = vec![
            raw(2, "2020", "_T", "500000"),
            raw(3, "2020", "M", "550000"),
            raw(4, "2020", "F", "450000"),
        ];

        let validated = validator().validate(&rows).unwrap();

        assert_eq!(validated.records.len(), 3);
        assert_eq!(validated.report.accepted_rows, 3);
        assert!(validated.report.is_clean());
        assert_eq!(validated.records[1].category, Category::Male);
        assert_eq!(validated.records[1].income, 550000.0);
    }

    #[test]
    fn test_empty_input_is_validation_error() {
        let result = validator().validate(&[]);
        assert!(matches!(result, Err(EtlError::Validation(_))));
    }

    #[test]
    fn test_missing_all_category_is_validation_error() {
        let rows = vec![raw(2, "2020", "M", "550000"), raw(3, "2020", "F", "450000")];

        let result = validator().validate(&rows);
        match result {
            Err(EtlError::Validation(msg)) => assert!(msg.contains("ALL")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_region_without_all_is_validation_error() {
        let mut other_m = raw(4, "2020", "M", "600000");
        other_m.region_code = Some("CHL13".to_string());
        let mut other_f = raw(5, "2020", "F", "500000");
        other_f.region_code = Some("CHL13".to_string());

        let rows = vec![
            raw(2, "2020", "_T", "500000"),
            raw(3, "2021", "_T", "520000"),
            other_m,
            other_f,
        ];

        match validator().validate(&rows) {
            Err(EtlError::Validation(msg)) => {
                assert!(msg.contains("CHL13"));
                assert!(!msg.contains("CHL14"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_rows_malformed_is_validation_error() {
        let rows = vec![raw(2, "", "_T", "1"), raw(3, "2020", "X", "1")];
        assert!(matches!(
            validator().validate(&rows),
            Err(EtlError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_fields_are_reported_in_order() {
        let rows = vec![
            raw(2, "2020", "_T", "500000"),
            raw(3, "", "M", ""),
            raw(4, "2021", "", "1"),
        ];

        let validated = validator().validate(&rows).unwrap();
        let report = &validated.report;

        assert_eq!(validated.records.len(), 1);
        assert_eq!(
            report.missing_fields,
            vec![
                FieldRef { line: 3, field: "year".to_string() },
                FieldRef { line: 3, field: "income".to_string() },
                FieldRef { line: 4, field: "category".to_string() },
            ]
        );
        assert_eq!(report.rejected_rows(), 2);
    }

    #[test]
    fn test_type_errors_and_invalid_values() {
        let rows = vec![
            raw(2, "2020", "_T", "500000"),
            raw(3, "twenty", "M", "abc"),
            raw(4, "2020", "Otro", "1"),
            raw(5, "1800", "F", "1"),
            raw(6, "2021", "F", "-5"),
            raw(7, "2022.0", "_T", "NaN"),
        ];

        let validated = validator().validate(&rows).unwrap();
        let report = &validated.report;

        assert_eq!(validated.records.len(), 1);
        assert_eq!(report.type_errors.len(), 4);
        assert!(report.type_errors[0].starts_with("line 3: year"));
        assert!(report.type_errors[1].starts_with("line 3: income"));
        assert!(report.type_errors[2].contains("unknown category"));
        assert!(report.type_errors[3].starts_with("line 7: income"));
        assert_eq!(report.invalid_values.len(), 2);
        assert!(report.invalid_values[0].contains("1800"));
        assert!(report.invalid_values[1].contains("negative"));
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let rows = vec![
            raw(2, "2020", "_T", "100"),
            raw(3, "2020", "_T", "999"),
            raw(4, "2020", "Ambos sexos", "555"),
            raw(5, "2021", "_T", "110"),
        ];

        let validated = validator().validate(&rows).unwrap();
        let report = &validated.report;

        assert_eq!(validated.records.len(), 2);
        assert_eq!(validated.records[0].income, 100.0);
        assert_eq!(report.duplicate_keys.len(), 1);
        let key = report.duplicate_keys.iter().next().unwrap();
        assert_eq!((key.year, key.category), (2020, Category::All));

        let duplicate_lines: Vec<usize> = report
            .warnings
            .iter()
            .filter_map(|w| match w {
                DataQualityWarning::Duplicate { line, first_line, .. } => {
                    assert_eq!(*first_line, 2);
                    Some(*line)
                }
                _ => None,
            })
            .collect();
        assert_eq!(duplicate_lines, vec![3, 4]);
    }

    #[test]
    fn test_duplicates_follow_input_order() {
        let forward = vec![raw(2, "2020", "_T", "100"), raw(3, "2020", "_T", "200")];
        let reversed = vec![raw(2, "2020", "_T", "200"), raw(3, "2020", "_T", "100")];

        let a = validator().validate(&forward).unwrap();
        let b = validator().validate(&reversed).unwrap();

        assert_eq!(a.records[0].income, 100.0);
        assert_eq!(b.records[0].income, 200.0);
        assert_eq!(a.report.duplicate_keys, b.report.duplicate_keys);
    }

    #[test]
    fn test_year_gaps_are_warnings() {
        let rows = vec![
            raw(2, "2010", "_T", "100"),
            raw(3, "2013", "_T", "130"),
            raw(4, "2011", "M", "100"),
        ];

        let validated = validator().validate(&rows).unwrap();

        assert_eq!(validated.records.len(), 3);
        assert_eq!(
            validated.report.gaps,
            vec![YearGap {
                region_code: "CHL14".to_string(),
                category: Category::All,
                missing_years: vec![2011, 2012],
            }]
        );
        assert!(validated
            .report
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::YearGap { .. })));
    }

    #[test]
    fn test_zero_income_is_accepted_with_warning() {
        let rows = vec![raw(2, "2020", "_T", "0")];

        let validated = validator().validate(&rows).unwrap();

        assert_eq!(validated.records.len(), 1);
        assert!(matches!(
            validated.report.warnings[0],
            DataQualityWarning::ZeroIncome { line: 2, .. }
        ));
    }

    #[test]
    fn test_region_and_label_fallbacks() {
        let row = RawRow {
            line: 2,
            indicator: None,
            year: Some("2020".to_string()),
            region_code: None,
            region_name: Some("Los Ríos".to_string()),
            category_code: None,
            category_label: Some("Ambos sexos".to_string()),
            value: Some("1".to_string()),
        };

        let validated = validator().validate(&[row]).unwrap();
        let record = &validated.records[0];

        assert_eq!(record.region_code, "Los Ríos");
        assert_eq!(record.region_name, "Los Ríos");
        assert_eq!(record.category, Category::All);
        assert_eq!(record.category_label, "Ambos sexos");
        assert_eq!(record.indicator, "");
    }

    #[test]
    fn test_validation_is_deterministic() {
        let rows = vec![
            raw(2, "2010", "_T", "100"),
            raw(3, "2010", "_T", "100"),
            raw(4, "2012", "_T", "120"),
            raw(5, "x", "F", "1"),
        ];

        let a = validator().validate(&rows).unwrap();
        let b = validator().validate(&rows).unwrap();

        assert_eq!(a.report, b.report);
        assert_eq!(a.records, b.records);
    }
}
