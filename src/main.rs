// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use income_etl::logging::init_logging;
use income_etl::{parse_output_formats, Category, Pipeline, PipelineConfig, PipelineRun};

#[derive(Parser, Debug)]
#[command(name = "income-etl")]
#[command(about = "Regional income ETL: validate, clean, analyze and export income data")]
#[command(version)]
struct Cli {
    /// Source CSV file
    source: PathBuf,

    /// Outputs to generate: csv|table, excel|spreadsheet, charts|chart, all
    #[arg(short, long, value_delimiter = ',', num_args = 1.., default_value = "all")]
    output: Vec<String>,

    /// Verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for generated files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Outlier threshold in standard deviations
    #[arg(long)]
    threshold: Option<f64>,

    /// SQLite database to upsert records into
    #[arg(long, conflicts_with = "no_database")]
    database: Option<PathBuf>,

    /// Skip SQLite persistence
    #[arg(long)]
    no_database: bool,

    /// Leave flagged outlier years out of the metrics
    #[arg(long)]
    exclude_outliers: bool,

    /// Open the terminal viewer after the run
    #[arg(long)]
    view: bool,
}

impl Cli {
    /// Defaults ← TOML ← environment ← flags
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;

        config.output_formats = parse_output_formats(&self.output.join(","))?;
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.outlier_threshold = threshold;
        }
        if let Some(db) = &self.database {
            config.database_path = Some(db.clone());
        }
        if self.no_database {
            config.database_path = None;
        }
        if self.exclude_outliers {
            config.exclude_outliers = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = cli.resolve_config().context("Invalid configuration")?;
    let _guard = init_logging(&config.log_level, &config.log_dir, cli.verbose)?;

    info!(
        source = %cli.source.display(),
        formats = ?config.output_formats,
        threshold = config.outlier_threshold,
        "Starting income ETL"
    );

    let pipeline = Pipeline::new(config);

    let run = match pipeline.run(&cli.source) {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            return Err(e).with_context(|| format!("Processing {}", cli.source.display()));
        }
    };

    let files = pipeline.export(&run).context("Export failed")?;

    print_summary(&run);
    println!("\n📁 Generated files:");
    for file in &files {
        println!("   {:<12} {}", file.exporter, file.path.display());
    }

    if cli.view {
        run_ui_mode(&run)?;
    }

    Ok(())
}

fn print_summary(run: &PipelineRun) {
    println!("\n📊 Income ETL - {}", run.source_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", run.report.summary());
    println!("✓ Outliers flagged: {}", run.cleaned.outlier_count());
    println!("✓ Warnings: {}", run.warnings.len());

    for set in &run.metrics {
        println!("\n🗺️  {} ({}) {}-{}", set.region_name, set.region_code, set.year_range.start, set.year_range.end);
        for line in set.insights() {
            println!("   • {}", line);
        }
        for category in [Category::Male, Category::Female] {
            if let Some(growth) = set.category(category).and_then(|m| m.growth_rate_percent) {
                println!("   • {} growth: {:.1}%", category.label(), growth);
            }
        }
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(run: &PipelineRun) -> Result<()> {
    let mut app = ui::App::new(run);
    ui::run_ui(&mut app)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_run: &PipelineRun) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web UI: cargo run --bin income-server --features server");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use income_etl::OutputFormat;

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "income-etl",
            "data.csv",
            "-o",
            "csv,excel",
            "--threshold",
            "3",
            "--no-database",
            "--exclude-outliers",
        ]);

        let config = cli.resolve_config().unwrap();

        assert_eq!(config.output_formats.len(), 2);
        assert!(config.wants(OutputFormat::Table));
        assert!(!config.wants(OutputFormat::Chart));
        assert_eq!(config.outlier_threshold, 3.0);
        assert_eq!(config.database_path, None);
        assert!(config.exclude_outliers);
    }

    #[test]
    fn test_defaults_select_all_outputs() {
        let cli = Cli::parse_from(["income-etl", "data.csv"]);
        assert_eq!(cli.output, vec!["all".to_string()]);
        assert!(Cli::parse_from(["income-etl", "data.csv", "-o", "charts"]).output == ["charts"]);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let cli = Cli::parse_from(["income-etl", "data.csv", "--threshold", "0"]);
        assert!(cli.resolve_config().is_err());
    }
}
