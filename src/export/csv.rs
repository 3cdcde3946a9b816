// 📄 CSV table export - cleaned records with formatted values

use super::{ExportCapability, Exporter, GeneratedFile};
use crate::error::Result;
use crate::pipeline::PipelineRun;
use std::path::Path;
use tracing::debug;

pub const CSV_FILE: &str = "income_data_processed.csv";

pub const CSV_HEADERS: [&str; 8] = [
    "Indicador",
    "Año",
    "Código_Región",
    "Región",
    "Sexo",
    "Valor",
    "Valor_Formateado",
    "Outlier",
];

pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Table
    }

    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let path = out_dir.join(CSV_FILE);
        let mut writer = ::csv::Writer::from_path(&path)?;

        writer.write_record(CSV_HEADERS)?;
        for clean in &run.cleaned.records {
            let record = &clean.record;
            writer.write_record([
                record.indicator.clone(),
                record.year.to_string(),
                record.region_code.clone(),
                record.region_name.clone(),
                record.category_label.clone(),
                record.income.to_string(),
                record.formatted_income(),
                clean.is_outlier.to_string(),
            ])?;
        }
        writer.flush()?;

        debug!(rows = run.cleaned.records.len(), "CSV written");
        Ok(vec![GeneratedFile::new(self, path)])
    }
}
