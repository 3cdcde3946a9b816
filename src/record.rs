// 📄 Income records - raw rows and typed records
// RawRow is what the loader reads; IncomeRecord is what survives validation

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CATEGORY
// ============================================================================

/// Category - demographic partition of an income record
///
/// ALL is an independently measured series in the source data. It is never
/// derived from MALE and FEMALE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    All,
    Male,
    Female,
}

impl Category {
    pub const ALL_CATEGORIES: [Category; 3] = [Category::All, Category::Male, Category::Female];

    /// Source dataset code (DTI_CL_SEXO column)
    pub fn code(&self) -> &'static str {
        match self {
            Category::All => "_T",
            Category::Male => "M",
            Category::Female => "F",
        }
    }

    /// Canonical display label
    pub fn label(&self) -> &'static str {
        match self {
            Category::All => "Ambos sexos",
            Category::Male => "Hombres",
            Category::Female => "Mujeres",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::All => "ALL",
            Category::Male => "MALE",
            Category::Female => "FEMALE",
        }
    }

    /// Parse a code, label or English name (case-insensitive)
    pub fn parse(value: &str) -> Option<Category> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "_t" | "t" | "all" | "total" | "both" | "ambos sexos" | "ambos" => Some(Category::All),
            "m" | "male" | "hombres" | "hombre" => Some(Category::Male),
            "f" | "female" | "mujeres" | "mujer" => Some(Category::Female),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// RAW ROW (Loader output)
// ============================================================================

/// RawRow - one data row as read from the file, before any typing
/// Empty cells are None; `line` is the 1-based line in the source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub line: usize,
    pub indicator: Option<String>,
    pub year: Option<String>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub category_code: Option<String>,
    pub category_label: Option<String>,
    pub value: Option<String>,
}

impl RawRow {
    /// Region identifier: code when present, otherwise the name
    pub fn region(&self) -> Option<&str> {
        self.region_code.as_deref().or(self.region_name.as_deref())
    }

    /// Category cell: code when present, otherwise the label
    pub fn category(&self) -> Option<&str> {
        self.category_code
            .as_deref()
            .or(self.category_label.as_deref())
    }
}

// ============================================================================
// INCOME RECORD
// ============================================================================

/// IncomeRecord - validated, strongly typed data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub indicator: String,
    pub year: i32,
    pub region_code: String,
    pub region_name: String,
    pub category: Category,
    pub category_label: String,
    pub income: f64,
    pub line: usize,
}

/// Unique key of a record within a dataset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub year: i32,
    pub region_code: String,
    pub category: Category,
}

impl IncomeRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            year: self.year,
            region_code: self.region_code.clone(),
            category: self.category,
        }
    }

    pub fn formatted_income(&self) -> String {
        format_currency(self.income)
    }
}

/// Format as currency with thousands separators: 1234567.5 -> "$1,234,567.50"
pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}${}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_codes_and_labels() {
        assert_eq!(Category::parse("_T"), Some(Category::All));
        assert_eq!(Category::parse("Ambos sexos"), Some(Category::All));
        assert_eq!(Category::parse("all"), Some(Category::All));
        assert_eq!(Category::parse(" M "), Some(Category::Male));
        assert_eq!(Category::parse("Hombres"), Some(Category::Male));
        assert_eq!(Category::parse("FEMALE"), Some(Category::Female));
        assert_eq!(Category::parse("mujeres"), Some(Category::Female));
        assert_eq!(Category::parse("X"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn test_category_codes_round_trip() {
        for category in Category::ALL_CATEGORIES {
            assert_eq!(Category::parse(category.code()), Some(category));
            assert_eq!(Category::parse(category.label()), Some(category));
        }
    }

    #[test]
    fn test_category_serializes_uppercase() {
        let json = serde_json::to_string(&Category::Female).unwrap();
        assert_eq!(json, "\"FEMALE\"");
    }

    #[test]
    fn test_raw_row_fallbacks() {
        let row = RawRow {
            line: 2,
            region_name: Some("Región de Los Ríos".to_string()),
            category_label: Some("Hombres".to_string()),
            ..Default::default()
        };

        assert_eq!(row.region(), Some("Región de Los Ríos"));
        assert_eq!(row.category(), Some("Hombres"));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.5), "$999.50");
        assert_eq!(format_currency(1000.0), "$1,000.00");
        assert_eq!(format_currency(765130.0), "$765,130.00");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-200749.0), "-$200,749.00");
    }
}
