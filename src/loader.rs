// 📂 Loader - delimited file -> ordered RawRows
// Header lookup by name with aliases, so the official dataset layout
// (Año, DTI_CL_SEXO, Value, ...) and a plain English layout both load

use crate::config::{Encoding, PipelineConfig};
use crate::error::{EtlError, Result};
use crate::record::RawRow;
use csv::{ReaderBuilder, StringRecord};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// COLUMN ALIASES
// ============================================================================

const YEAR_ALIASES: &[&str] = &["año", "ano", "year", "dti_cl_ano"];
const REGION_CODE_ALIASES: &[&str] = &["dti_cl_region", "region_code", "código_región"];
const REGION_NAME_ALIASES: &[&str] = &["región", "region", "region_name"];
const CATEGORY_CODE_ALIASES: &[&str] = &["dti_cl_sexo", "category", "category_code"];
const CATEGORY_LABEL_ALIASES: &[&str] = &["sexo", "sex", "gender"];
const VALUE_ALIASES: &[&str] = &["value", "valor", "income"];
const INDICATOR_ALIASES: &[&str] = &["indicador", "indicator"];

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq)]
struct ColumnMap {
    year: usize,
    region_code: Option<usize>,
    region_name: Option<usize>,
    category_code: Option<usize>,
    category_label: Option<usize>,
    value: usize,
    indicator: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

        let find = |aliases: &[&str]| -> Option<usize> {
            // Alias order wins over column order: "Año" beats "DTI_CL_ANO"
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        let year = find(YEAR_ALIASES);
        let value = find(VALUE_ALIASES);
        let region_code = find(REGION_CODE_ALIASES);
        let region_name = find(REGION_NAME_ALIASES);
        let category_code = find(CATEGORY_CODE_ALIASES);
        let category_label = find(CATEGORY_LABEL_ALIASES);

        let mut missing = Vec::new();
        if year.is_none() {
            missing.push("year");
        }
        if value.is_none() {
            missing.push("value");
        }
        if region_code.is_none() && region_name.is_none() {
            missing.push("region");
        }
        if category_code.is_none() && category_label.is_none() {
            missing.push("category");
        }

        match (year, value) {
            (Some(year), Some(value)) if missing.is_empty() => Ok(ColumnMap {
                year,
                region_code,
                region_name,
                category_code,
                category_label,
                value,
                indicator: find(INDICATOR_ALIASES),
            }),
            _ => Err(EtlError::Input(format!(
                "Missing required columns: {} (found: {})",
                missing.join(", "),
                headers.iter().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    fn to_row(&self, line: usize, record: &StringRecord) -> RawRow {
        let cell = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        RawRow {
            line,
            indicator: cell(self.indicator),
            year: cell(Some(self.year)),
            region_code: cell(self.region_code),
            region_name: cell(self.region_name),
            category_code: cell(self.category_code),
            category_label: cell(self.category_label),
            value: cell(Some(self.value)),
        }
    }
}

// ============================================================================
// LOADED SOURCE
// ============================================================================

/// Rows plus a fingerprint of the bytes they came from
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub rows: Vec<RawRow>,
    pub sha256: String,
}

// ============================================================================
// CSV LOADER
// ============================================================================

pub struct CsvLoader {
    encoding: Encoding,
    delimiter: u8,
}

impl CsvLoader {
    pub fn new(encoding: Encoding, delimiter: char) -> Self {
        CsvLoader {
            encoding,
            // Config validation guarantees ASCII
            delimiter: delimiter as u8,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.encoding, config.delimiter)
    }

    /// Single scoped read of the whole file
    pub fn load(&self, path: &Path) -> Result<LoadedSource> {
        info!(path = %path.display(), "Loading income data");

        let bytes = fs::read(path).map_err(|e| {
            EtlError::Input(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let sha256 = fingerprint(&bytes);
        let text = decode(bytes, self.encoding)?;
        let rows = self.parse_str(&text)?;

        info!(rows = rows.len(), sha256 = %sha256, "Loaded raw rows");
        Ok(LoadedSource { rows, sha256 })
    }

    pub fn parse_str(&self, text: &str) -> Result<Vec<RawRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| EtlError::Input(format!("Failed to read header row: {}", e)))?
            .clone();
        let columns = ColumnMap::resolve(&headers)?;
        debug!(?columns, "Resolved columns");

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                EtlError::Input(format!("Failed to parse CSV line {}: {}", idx + 2, e))
            })?;

            // Blank lines are skipped by the reader; all-empty rows are not
            if record.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);
            rows.push(columns.to_row(line, &record));
        }

        Ok(rows)
    }
}

fn decode(bytes: Vec<u8>, encoding: Encoding) -> Result<String> {
    match encoding {
        Encoding::Utf8 => {
            let mut text = String::from_utf8(bytes)
                .map_err(|e| EtlError::Input(format!("Input is not valid UTF-8: {}", e)))?;
            if text.starts_with('\u{feff}') {
                text.remove(0);
            }
            Ok(text)
        }
        // Latin-1 maps every byte to the code point of the same value
        Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
    }
}

/// SHA-256 of the raw input bytes (hex)
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const OFFICIAL_CSV: &str = "\
Indicador,DTI_CL_ANO,Año,DTI_CL_REGION,Región,DTI_CL_SEXO,Sexo,Value
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,_T,Ambos sexos,500000.0
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,M,Hombres,550000.0
Ingreso medio,2020,2020,CHL14,Región de Los Ríos,F,Mujeres,450000.0
";

    fn loader() -> CsvLoader {
        CsvLoader::new(Encoding::Utf8, ',')
    }

    #[test]
    fn test_parse_official_layout() {
        let rows = loader().parse_str(OFFICIAL_CSV).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].year.as_deref(), Some("2020"));
        assert_eq!(rows[0].region_code.as_deref(), Some("CHL14"));
        assert_eq!(rows[0].region_name.as_deref(), Some("Región de Los Ríos"));
        assert_eq!(rows[0].category_code.as_deref(), Some("_T"));
        assert_eq!(rows[1].category_label.as_deref(), Some("Hombres"));
        assert_eq!(rows[2].value.as_deref(), Some("450000.0"));
        assert_eq!(rows[2].line, 4);
    }

    #[test]
    fn test_parse_english_layout_with_empty_cells() {
        let csv = "year,region,category,income\n2010,Los Rios,ALL,100\n2011,Los Rios,,\n";
        let rows = loader().parse_str(csv).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region(), Some("Los Rios"));
        assert_eq!(rows[1].category_code, None);
        assert_eq!(rows[1].value, None);
    }

    #[test]
    fn test_missing_required_column_is_input_error() {
        let csv = "year,region,income\n2010,Los Rios,100\n";
        let err = loader().parse_str(csv).unwrap_err();

        match err {
            EtlError::Input(msg) => assert!(msg.contains("category")),
            other => panic!("expected input error, got {:?}", other),
        }
    }

    #[test]
    fn test_semicolon_delimiter() {
        let csv = "year;region;category;income\n2010;Los Rios;F;100,5\n";
        let rows = CsvLoader::new(Encoding::Utf8, ';').parse_str(csv).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value.as_deref(), Some("100,5"));
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let csv = "year,region,category,income\n2010,Los Rios\n";
        let rows = loader().parse_str(csv).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_code, None);
        assert_eq!(rows[0].value, None);
    }

    #[test]
    fn test_load_strips_bom_and_fingerprints() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\u{feff}{}", OFFICIAL_CSV).unwrap();

        let source = loader().load(file.path()).unwrap();

        assert_eq!(source.rows.len(), 3);
        assert_eq!(source.sha256.len(), 64);
    }

    #[test]
    fn test_load_latin1() {
        // "Año" and "Región" encoded as ISO-8859-1
        let mut bytes = b"A\xf1o,Regi\xf3n,Sexo,Value\n".to_vec();
        bytes.extend_from_slice(b"2015,Los R\xedos,Mujeres,300\n");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let utf8 = loader().load(file.path());
        assert!(matches!(utf8, Err(EtlError::Input(_))));

        let source = CsvLoader::new(Encoding::Latin1, ',').load(file.path()).unwrap();
        assert_eq!(source.rows[0].region_name.as_deref(), Some("Los Ríos"));
        assert_eq!(source.rows[0].category_label.as_deref(), Some("Mujeres"));
    }

    #[test]
    fn test_unreadable_path_is_input_error() {
        let err = loader()
            .load(Path::new("/definitely/not/here/income.csv"))
            .unwrap_err();
        assert!(matches!(err, EtlError::Input(_)));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
