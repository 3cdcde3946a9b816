// 🖥️ Static HTML dashboard - tabbed shell with key figures and inline charts

use super::chart::{comparison_chart, escape as html_escape, gap_chart, trend_chart};
use super::{ExportCapability, Exporter, GeneratedFile};
use crate::error::Result;
use crate::pipeline::PipelineRun;
use crate::record::{format_currency, Category};
use std::fs;
use std::path::Path;

pub const DASHBOARD_FILE: &str = "dashboard.html";

const SECTIONS: [(&str, &str); 4] = [
    ("summary", "Resumen"),
    ("trend", "Tendencia"),
    ("gap", "Brecha de Género"),
    ("comparison", "Comparación"),
];

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0; background: #f5f6fa; color: #2c3e50; }
header { background: #2c3e50; color: white; padding: 16px 24px; }
nav { display: flex; gap: 8px; padding: 12px 24px; background: white; border-bottom: 1px solid #ddd; }
nav button { border: none; background: #ecf0f1; padding: 8px 16px; cursor: pointer; border-radius: 4px; }
nav button.active { background: #3498db; color: white; }
section { display: none; padding: 24px; }
section.active { display: block; }
.cards { display: flex; flex-wrap: wrap; gap: 16px; }
.card { background: white; border-radius: 6px; padding: 16px 20px; min-width: 200px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.card .label { font-size: 13px; color: #7f8c8d; }
.card .value { font-size: 24px; font-weight: bold; margin-top: 4px; }
ul.insights { background: white; padding: 16px 32px; border-radius: 6px; }
svg { max-width: 100%; height: auto; background: white; border-radius: 6px; }
"#;

const SCRIPT: &str = r#"
function show(id) {
  document.querySelectorAll('section').forEach(s => s.classList.toggle('active', s.id === id));
  document.querySelectorAll('nav button').forEach(b => b.classList.toggle('active', b.dataset.target === id));
}
document.querySelectorAll('nav button').forEach(b => b.addEventListener('click', () => show(b.dataset.target)));
"#;

pub struct DashboardExporter {
    width: u32,
    height: u32,
}

impl DashboardExporter {
    pub fn new(width: u32, height: u32) -> Self {
        DashboardExporter { width, height }
    }

    pub fn render(&self, run: &PipelineRun) -> String {
        let region = run
            .primary_metrics()
            .map(|m| m.region_name.as_str())
            .unwrap_or("Sin datos");

        let nav: String = SECTIONS
            .iter()
            .enumerate()
            .map(|(i, (id, label))| {
                let active = if i == 0 { " class=\"active\"" } else { "" };
                format!("<button data-target=\"{}\"{}>{}</button>", id, active, label)
            })
            .collect();

        let charts = [
            ("trend", trend_chart(run, self.width, self.height)),
            ("gap", gap_chart(run, self.width, self.height)),
            ("comparison", comparison_chart(run, self.width, self.height)),
        ];
        let chart_sections: String = charts
            .iter()
            .map(|(id, svg)| format!("<section id=\"{}\">\n{}</section>\n", id, svg))
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<title>Dashboard de Ingresos - {region}</title>
<style>{style}</style>
</head>
<body>
<header><h1>Dashboard de Ingresos</h1><div>{region} · generado {generated}</div></header>
<nav>{nav}</nav>
<section id="summary" class="active">
{summary}
</section>
{charts}<script>{script}</script>
</body>
</html>
"#,
            region = html_escape(region),
            style = STYLE,
            generated = run.generated_at.format("%Y-%m-%d %H:%M UTC"),
            nav = nav,
            summary = summary_section(run),
            charts = chart_sections,
            script = SCRIPT,
        )
    }
}

fn card(label: &str, value: &str) -> String {
    format!(
        "<div class=\"card\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
        html_escape(label),
        html_escape(value)
    )
}

fn summary_section(run: &PipelineRun) -> String {
    let mut cards = vec![
        card("Registros válidos", &run.report.accepted_rows.to_string()),
        card("Filas rechazadas", &run.report.rejected_rows().to_string()),
        card("Outliers", &run.cleaned.outlier_count().to_string()),
        card("Advertencias", &run.warnings.len().to_string()),
    ];

    let mut insights = String::new();
    if let Some(primary) = run.primary_metrics() {
        if let Some(total) = primary.category(Category::All) {
            cards.push(card(
                &format!("Ingreso medio {}", total.end_year),
                &format_currency(total.last_value),
            ));
        }
        if let Some(gap) = primary.latest_gap() {
            cards.push(card(
                &format!("Brecha de género {}", gap.year),
                &gap.gap_percent
                    .map(|p| format!("{:.1}%", p))
                    .unwrap_or_else(|| format_currency(gap.gap_absolute)),
            ));
        }
        if let Some(growth) = primary
            .category(Category::All)
            .and_then(|m| m.growth_rate_percent)
        {
            cards.push(card("Crecimiento total", &format!("{:.1}%", growth)));
        }

        let items: String = primary
            .insights()
            .iter()
            .map(|line| format!("<li>{}</li>", html_escape(line)))
            .collect();
        insights = format!("<h2>Hallazgos</h2>\n<ul class=\"insights\">{}</ul>", items);
    }

    format!("<div class=\"cards\">{}</div>\n{}", cards.join(""), insights)
}

impl Exporter for DashboardExporter {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Chart
    }

    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let path = out_dir.join(DASHBOARD_FILE);
        fs::write(&path, self.render(run))?;
        Ok(vec![GeneratedFile::new(self, path)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::export::fixtures::{run_with, sample_run};

    #[test]
    fn test_dashboard_has_all_sections() {
        let html = DashboardExporter::new(800, 600).render(&sample_run());

        for (id, label) in SECTIONS {
            assert!(html.contains(&format!("<section id=\"{}\"", id)));
            assert!(html.contains(label));
        }
        assert_eq!(html.matches("<svg").count(), 3);
        assert!(html.contains("35.6%"));
        assert!(html.contains("Región de Los Ríos"));
    }

    #[test]
    fn test_income_card_uses_last_year_of_all() {
        let csv = "\
Año,DTI_CL_REGION,Región,DTI_CL_SEXO,Value
2021,CHL14,Los Ríos,_T,500000
2022,CHL14,Los Ríos,_T,520000
2021,CHL14,Los Ríos,M,550000
2021,CHL14,Los Ríos,F,450000
2023,CHL14,Los Ríos,M,600000
2023,CHL14,Los Ríos,F,480000
";
        let run = run_with(
            csv,
            PipelineConfig {
                database_path: None,
                ..Default::default()
            },
        );
        assert_eq!(run.primary_metrics().unwrap().year_range.end, 2023);

        let html = DashboardExporter::new(800, 600).render(&run);

        assert!(html.contains("Ingreso medio 2022"));
        assert!(!html.contains("Ingreso medio 2023"));
    }

    #[test]
    fn test_labels_are_escaped() {
        assert_eq!(card("a<b", "1 & 2").matches("&lt;").count(), 1);
        assert!(card("a<b", "1 & 2").contains("1 &amp; 2"));
    }
}
