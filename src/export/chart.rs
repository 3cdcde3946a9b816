// 📈 SVG charts - trend, gender gap, latest-year comparison
// Plain SVG text, no JS; each data point carries a <title> tooltip

use super::{ExportCapability, Exporter, GeneratedFile};
use crate::error::Result;
use crate::pipeline::PipelineRun;
use crate::record::{format_currency, Category};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const TREND_FILE: &str = "income_trend.svg";
pub const GAP_FILE: &str = "gender_gap.svg";
pub const COMPARISON_FILE: &str = "income_comparison.svg";

const MARGIN_LEFT: f64 = 110.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_BOTTOM: f64 = 70.0;
const Y_TICKS: usize = 5;

pub fn category_color(category: Category) -> &'static str {
    match category {
        Category::All => "#2c3e50",
        Category::Male => "#3498db",
        Category::Female => "#e74c3c",
    }
}

// ============================================================================
// SVG DOCUMENT
// ============================================================================

pub struct SvgDocument {
    width: f64,
    height: f64,
    body: String,
}

impl SvgDocument {
    pub fn new(width: u32, height: u32) -> Self {
        SvgDocument {
            width: width as f64,
            height: height as f64,
            body: String::new(),
        }
    }

    fn plot_width(&self) -> f64 {
        (self.width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0)
    }

    fn plot_height(&self) -> f64 {
        (self.height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0)
    }

    fn plot_bottom(&self) -> f64 {
        MARGIN_TOP + self.plot_height()
    }

    pub fn title(&mut self, text: &str) {
        let x = self.width / 2.0;
        self.text(x, MARGIN_TOP / 2.0, "middle", 20, "bold", text);
    }

    pub fn text(&mut self, x: f64, y: f64, anchor: &str, size: u32, weight: &str, content: &str) {
        self.body.push_str(&format!(
            r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-size="{}" font-weight="{}" font-family="sans-serif">{}</text>"#,
            x,
            y,
            anchor,
            size,
            weight,
            escape(content)
        ));
        self.body.push('\n');
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, dashed: bool) {
        let dash = if dashed { r#" stroke-dasharray="4 4""# } else { "" };
        self.body.push_str(&format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}"{}/>"#,
            x1, y1, x2, y2, stroke, dash
        ));
        self.body.push('\n');
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], stroke: &str) {
        let coords: Vec<String> = points
            .iter()
            .map(|(x, y)| format!("{:.1},{:.1}", x, y))
            .collect();
        self.body.push_str(&format!(
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2.5"/>"#,
            coords.join(" "),
            stroke
        ));
        self.body.push('\n');
    }

    pub fn point(&mut self, x: f64, y: f64, fill: &str, highlighted: bool, tooltip: &str) {
        let ring = if highlighted {
            r##" stroke="#f39c12" stroke-width="3""##
        } else {
            ""
        };
        self.body.push_str(&format!(
            r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill="{}"{}><title>{}</title></circle>"#,
            x,
            y,
            if highlighted { 7 } else { 4 },
            fill,
            ring,
            escape(tooltip)
        ));
        self.body.push('\n');
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: &str, tooltip: &str) {
        self.body.push_str(&format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" opacity="0.85"><title>{}</title></rect>"#,
            x,
            y,
            width.max(0.0),
            height.max(0.0),
            fill,
            escape(tooltip)
        ));
        self.body.push('\n');
    }

    /// Horizontal grid with value labels for [lo, hi]
    fn y_axis(&mut self, scale: &ValueScale, label: impl Fn(f64) -> String) {
        let right = MARGIN_LEFT + self.plot_width();
        for i in 0..=Y_TICKS {
            let value = scale.lo + (scale.hi - scale.lo) * i as f64 / Y_TICKS as f64;
            let y = scale.project(value, self);
            self.line(MARGIN_LEFT, y, right, y, "#e0e0e0", true);
            self.text(MARGIN_LEFT - 8.0, y + 4.0, "end", 12, "normal", &label(value));
        }
        let bottom = self.plot_bottom();
        self.line(MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, bottom, "#555", false);
    }

    fn legend(&mut self, entries: &[(Category, &str)]) {
        let mut x = MARGIN_LEFT;
        let y = self.height - 20.0;
        for (category, text) in entries {
            self.rect(x, y - 10.0, 14.0, 14.0, category_color(*category), text);
            self.text(x + 20.0, y + 2.0, "start", 13, "normal", text);
            x += 150.0;
        }
    }

    fn empty(&mut self, message: &str) {
        let (x, y) = (self.width / 2.0, self.height / 2.0);
        self.text(x, y, "middle", 16, "normal", message);
    }

    pub fn finish(self) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<rect width="100%" height="100%" fill="white"/>
{body}</svg>
"#,
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

/// Linear value → pixel mapping for the y axis
struct ValueScale {
    lo: f64,
    hi: f64,
}

impl ValueScale {
    /// Always includes zero; padded 10% above the largest magnitude
    fn covering(values: impl Iterator<Item = f64>) -> Self {
        let (mut lo, mut hi) = (0.0f64, 0.0f64);
        for v in values {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if hi == lo {
            hi = lo + 1.0;
        }
        ValueScale {
            lo: if lo < 0.0 { lo * 1.1 } else { lo },
            hi: if hi > 0.0 { hi * 1.1 } else { hi },
        }
    }

    fn project(&self, value: f64, doc: &SvgDocument) -> f64 {
        let ratio = (value - self.lo) / (self.hi - self.lo);
        doc.plot_bottom() - ratio * doc.plot_height()
    }
}

fn x_for_year(year: i32, first: i32, last: i32, doc: &SvgDocument) -> f64 {
    if first == last {
        return MARGIN_LEFT + doc.plot_width() / 2.0;
    }
    MARGIN_LEFT + (year - first) as f64 / (last - first) as f64 * doc.plot_width()
}

fn money_tick(value: f64) -> String {
    format_currency(value.round()).trim_end_matches(".00").to_string()
}

pub(crate) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// CHARTS
// ============================================================================

/// Income per category over time for the primary region
pub fn trend_chart(run: &PipelineRun, width: u32, height: u32) -> String {
    let mut doc = SvgDocument::new(width, height);

    let Some(primary) = run.primary_metrics() else {
        doc.empty("No data");
        return doc.finish();
    };
    doc.title(&format!("Evolución del ingreso medio - {}", primary.region_name));

    let mut series: BTreeMap<Category, Vec<(i32, f64, bool)>> = BTreeMap::new();
    for clean in run.cleaned.for_region(&primary.region_code) {
        let r = &clean.record;
        series
            .entry(r.category)
            .or_default()
            .push((r.year, r.income, clean.is_outlier));
    }
    for points in series.values_mut() {
        points.sort_by_key(|(year, _, _)| *year);
    }

    // Axis spans every plotted year, including ones left out of the metrics
    let plotted = series.values().flatten().map(|(year, _, _)| *year);
    let first = plotted.clone().min().unwrap_or(primary.year_range.start);
    let last = plotted.max().unwrap_or(primary.year_range.end);
    let scale = ValueScale::covering(series.values().flatten().map(|(_, v, _)| *v));
    doc.y_axis(&scale, money_tick);

    let bottom = doc.plot_bottom();
    let years: Vec<i32> = (first..=last).collect();
    let step = (years.len() / 12).max(1);
    for year in years.iter().step_by(step) {
        let x = x_for_year(*year, first, last, &doc);
        doc.text(x, bottom + 20.0, "middle", 12, "normal", &year.to_string());
    }

    for (category, points) in &series {
        let color = category_color(*category);
        let coords: Vec<(f64, f64)> = points
            .iter()
            .map(|(year, value, _)| (x_for_year(*year, first, last, &doc), scale.project(*value, &doc)))
            .collect();
        doc.polyline(&coords, color);
        for ((year, value, outlier), (x, y)) in points.iter().zip(coords) {
            let mut tooltip = format!("{} {}: {}", category.label(), year, format_currency(*value));
            if *outlier {
                tooltip.push_str(" (outlier)");
            }
            doc.point(x, y, color, *outlier, &tooltip);
        }
    }

    let legend: Vec<(Category, &str)> = series.keys().map(|c| (*c, c.label())).collect();
    doc.legend(&legend);
    doc.finish()
}

/// Absolute MALE - FEMALE gap per year, percent in the tooltip
pub fn gap_chart(run: &PipelineRun, width: u32, height: u32) -> String {
    let mut doc = SvgDocument::new(width, height);

    let Some(primary) = run.primary_metrics().filter(|m| !m.gender_gaps.is_empty()) else {
        doc.empty("No years with both MALE and FEMALE data");
        return doc.finish();
    };
    doc.title(&format!("Brecha de género en ingresos - {}", primary.region_name));

    let gaps = &primary.gender_gaps;
    let scale = ValueScale::covering(gaps.iter().map(|g| g.gap_absolute));
    doc.y_axis(&scale, money_tick);

    let slot = doc.plot_width() / gaps.len() as f64;
    let bar_width = slot * 0.7;
    let zero = scale.project(0.0, &doc);
    let bottom = doc.plot_bottom();

    for (i, gap) in gaps.iter().enumerate() {
        let x = MARGIN_LEFT + slot * i as f64 + (slot - bar_width) / 2.0;
        let y = scale.project(gap.gap_absolute, &doc);
        let color = if gap.gap_absolute >= 0.0 {
            category_color(Category::Male)
        } else {
            category_color(Category::Female)
        };
        let percent = gap
            .gap_percent
            .map(|p| format!(" ({:.1}%)", p))
            .unwrap_or_default();
        let tooltip = format!("{}: {}{}", gap.year, format_currency(gap.gap_absolute), percent);

        doc.rect(x, y.min(zero), bar_width, (zero - y).abs(), color, &tooltip);
        doc.text(x + bar_width / 2.0, bottom + 20.0, "middle", 12, "normal", &gap.year.to_string());
    }
    let right = MARGIN_LEFT + doc.plot_width();
    doc.line(MARGIN_LEFT, zero, right, zero, "#555", false);

    doc.finish()
}

/// ALL / MALE / FEMALE side by side for the latest year of the primary region
pub fn comparison_chart(run: &PipelineRun, width: u32, height: u32) -> String {
    let mut doc = SvgDocument::new(width, height);

    let Some(primary) = run.primary_metrics() else {
        doc.empty("No data");
        return doc.finish();
    };

    let latest = primary.year_range.end;
    let mut bars: Vec<(Category, f64)> = run
        .cleaned
        .for_region(&primary.region_code)
        .filter(|c| c.record.year == latest)
        .map(|c| (c.record.category, c.record.income))
        .collect();
    bars.sort_by_key(|(category, _)| *category);

    doc.title(&format!("Ingreso medio por sexo {} - {}", latest, primary.region_name));

    let scale = ValueScale::covering(bars.iter().map(|(_, v)| *v));
    doc.y_axis(&scale, money_tick);

    let slot = doc.plot_width() / bars.len().max(1) as f64;
    let bar_width = slot * 0.5;
    let zero = scale.project(0.0, &doc);
    let bottom = doc.plot_bottom();

    for (i, (category, value)) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + slot * i as f64 + (slot - bar_width) / 2.0;
        let y = scale.project(*value, &doc);
        let tooltip = format!("{} {}: {}", category.label(), latest, format_currency(*value));

        doc.rect(x, y, bar_width, zero - y, category_color(*category), &tooltip);
        doc.text(x + bar_width / 2.0, y - 8.0, "middle", 13, "bold", &money_tick(*value));
        doc.text(x + bar_width / 2.0, bottom + 20.0, "middle", 13, "normal", category.label());
    }

    doc.finish()
}

// ============================================================================
// EXPORTER
// ============================================================================

pub struct SvgChartExporter {
    width: u32,
    height: u32,
}

impl SvgChartExporter {
    pub fn new(width: u32, height: u32) -> Self {
        SvgChartExporter { width, height }
    }
}

impl Exporter for SvgChartExporter {
    fn name(&self) -> &'static str {
        "svg_charts"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Chart
    }

    fn export(&self, run: &PipelineRun, out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let charts = [
            (TREND_FILE, trend_chart(run, self.width, self.height)),
            (GAP_FILE, gap_chart(run, self.width, self.height)),
            (COMPARISON_FILE, comparison_chart(run, self.width, self.height)),
        ];

        let mut files = Vec::new();
        for (name, svg) in charts {
            let path = out_dir.join(name);
            fs::write(&path, svg)?;
            files.push(GeneratedFile::new(self, path));
        }
        Ok(files)
    }
}
