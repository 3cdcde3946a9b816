// 📗 Spreadsheet export - records, gender gap and metrics sheets

use super::{ExportCapability, Exporter, GeneratedFile};
use crate::error::Result;
use crate::pipeline::PipelineRun;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;
use tracing::debug;

pub const XLSX_FILE: &str = "income_data_processed.xlsx";

pub const RECORDS_SHEET: &str = "Datos_Ingreso";
pub const GAP_SHEET: &str = "Brecha_Genero";
pub const METRICS_SHEET: &str = "Metricas";

pub struct XlsxExporter;

impl Exporter for XlsxExporter {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Spreadsheet
    }

    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let path = out_dir.join(XLSX_FILE);

        let header = Format::new().set_bold();
        let money = Format::new().set_num_format("$#,##0.00");
        let percent = Format::new().set_num_format("0.00");

        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet();
        sheet.set_name(RECORDS_SHEET)?;
        write_records(sheet, run, &header, &money)?;

        let sheet = workbook.add_worksheet();
        sheet.set_name(GAP_SHEET)?;
        write_gaps(sheet, run, &header, &money, &percent)?;

        let sheet = workbook.add_worksheet();
        sheet.set_name(METRICS_SHEET)?;
        write_metrics(sheet, run, &header, &money, &percent)?;

        workbook.save(&path)?;

        debug!(path = %path.display(), "Workbook saved");
        Ok(vec![GeneratedFile::new(self, path)])
    }
}

fn write_header(sheet: &mut Worksheet, columns: &[&str], header: &Format) -> Result<()> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, header)?;
        sheet.set_column_width(col as u16, 16)?;
    }
    Ok(())
}

fn write_records(
    sheet: &mut Worksheet,
    run: &PipelineRun,
    header: &Format,
    money: &Format,
) -> Result<()> {
    write_header(
        sheet,
        &["Indicador", "Año", "Código_Región", "Región", "Sexo", "Valor", "Outlier"],
        header,
    )?;
    sheet.set_column_width(3, 28)?;

    for (i, clean) in run.cleaned.records.iter().enumerate() {
        let row = i as u32 + 1;
        let record = &clean.record;
        sheet.write_string(row, 0, &record.indicator)?;
        sheet.write_number(row, 1, record.year)?;
        sheet.write_string(row, 2, &record.region_code)?;
        sheet.write_string(row, 3, &record.region_name)?;
        sheet.write_string(row, 4, &record.category_label)?;
        sheet.write_number_with_format(row, 5, record.income, money)?;
        sheet.write_boolean(row, 6, clean.is_outlier)?;
    }
    Ok(())
}

fn write_gaps(
    sheet: &mut Worksheet,
    run: &PipelineRun,
    header: &Format,
    money: &Format,
    percent: &Format,
) -> Result<()> {
    write_header(
        sheet,
        &[
            "Código_Región",
            "Año",
            "Hombres",
            "Mujeres",
            "Ambos sexos",
            "Brecha",
            "Brecha_%",
            "Brecha_%_Hombres",
        ],
        header,
    )?;

    let mut row = 1u32;
    for set in &run.metrics {
        for gap in &set.gender_gaps {
            sheet.write_string(row, 0, &set.region_code)?;
            sheet.write_number(row, 1, gap.year)?;
            sheet.write_number_with_format(row, 2, gap.male, money)?;
            sheet.write_number_with_format(row, 3, gap.female, money)?;
            if let Some(total) = gap.total {
                sheet.write_number_with_format(row, 4, total, money)?;
            }
            sheet.write_number_with_format(row, 5, gap.gap_absolute, money)?;
            if let Some(p) = gap.gap_percent {
                sheet.write_number_with_format(row, 6, p, percent)?;
            }
            if let Some(p) = gap.gap_share_of_male {
                sheet.write_number_with_format(row, 7, p, percent)?;
            }
            row += 1;
        }
    }
    Ok(())
}

fn write_metrics(
    sheet: &mut Worksheet,
    run: &PipelineRun,
    header: &Format,
    money: &Format,
    percent: &Format,
) -> Result<()> {
    write_header(
        sheet,
        &[
            "Código_Región",
            "Sexo",
            "Año_Inicial",
            "Año_Final",
            "Crecimiento_%",
            "Crecimiento_Anual_%",
            "Tendencia",
            "Volatilidad",
            "Media",
            "Mínimo",
            "Máximo",
            "Observaciones",
        ],
        header,
    )?;

    let mut row = 1u32;
    for set in &run.metrics {
        for metrics in set.categories.values() {
            sheet.write_string(row, 0, &set.region_code)?;
            sheet.write_string(row, 1, metrics.category.label())?;
            sheet.write_number(row, 2, metrics.start_year)?;
            sheet.write_number(row, 3, metrics.end_year)?;
            if let Some(g) = metrics.growth_rate_percent {
                sheet.write_number_with_format(row, 4, g, percent)?;
            }
            if let Some(g) = metrics.average_annual_growth {
                sheet.write_number_with_format(row, 5, g, percent)?;
            }
            if let Some(trend) = metrics.trend_direction {
                sheet.write_string(row, 6, trend.name())?;
            }
            if let Some(v) = metrics.volatility {
                sheet.write_number_with_format(row, 7, v, percent)?;
            }
            sheet.write_number_with_format(row, 8, metrics.stats.mean, money)?;
            sheet.write_number_with_format(row, 9, metrics.stats.min, money)?;
            sheet.write_number_with_format(row, 10, metrics.stats.max, money)?;
            sheet.write_number(row, 11, metrics.stats.count as u32)?;
            row += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::sample_run;

    #[test]
    fn test_xlsx_export_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let run = sample_run();

        let files = XlsxExporter.export(&run, dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with(XLSX_FILE));
        // xlsx is a zip container
        let bytes = std::fs::read(&files[0].path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
