use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cleaner::CleanRecord;
use crate::pipeline::PipelineRun;
use crate::record::{Category, IncomeRecord};

/// Audit row for one pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub generated_at: String,
    pub source_path: String,
    pub source_sha256: String,
    pub total_rows: i64,
    pub accepted_rows: i64,
    pub outliers: i64,
    pub warnings: i64,
}

pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("Cannot open database {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Income Records Table (one row per year/region/category)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS income_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            region_code TEXT NOT NULL,
            region_name TEXT NOT NULL,
            category TEXT NOT NULL,
            category_label TEXT NOT NULL,
            indicator TEXT NOT NULL,
            income REAL NOT NULL,
            z_score REAL NOT NULL DEFAULT 0,
            is_outlier INTEGER NOT NULL DEFAULT 0,
            run_id TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(year, region_code, category)
        )",
        [],
    )?;

    // ==========================================================================
    // Pipeline Runs Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pipeline_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            generated_at TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_sha256 TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            accepted_rows INTEGER NOT NULL,
            outliers INTEGER NOT NULL,
            warnings INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_income_year ON income_records(year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_income_category ON income_records(category)",
        [],
    )?;

    Ok(())
}

/// Upsert on (year, region_code, category): re-running the same file
/// replaces values instead of adding rows
pub fn insert_records(conn: &Connection, records: &[CleanRecord], run_id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO income_records (
                year, region_code, region_name, category, category_label,
                indicator, income, z_score, is_outlier, run_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(year, region_code, category) DO UPDATE SET
                region_name = excluded.region_name,
                category_label = excluded.category_label,
                indicator = excluded.indicator,
                income = excluded.income,
                z_score = excluded.z_score,
                is_outlier = excluded.is_outlier,
                run_id = excluded.run_id,
                updated_at = CURRENT_TIMESTAMP",
        )?;

        for clean in records {
            let r = &clean.record;
            written += stmt.execute(params![
                r.year,
                r.region_code,
                r.region_name,
                r.category.name(),
                r.category_label,
                r.indicator,
                r.income,
                clean.z_score,
                clean.is_outlier,
                run_id,
            ])?;
        }
    }

    tx.commit()?;
    Ok(written)
}

/// Insert the audit row for a run
pub fn insert_run(conn: &Connection, run: &PipelineRun) -> Result<()> {
    conn.execute(
        "INSERT INTO pipeline_runs (
            run_id, generated_at, source_path, source_sha256,
            total_rows, accepted_rows, outliers, warnings
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run.run_id.to_string(),
            run.generated_at.to_rfc3339(),
            run.source_path.display().to_string(),
            run.source_sha256,
            run.report.total_rows as i64,
            run.report.accepted_rows as i64,
            run.cleaned.outlier_count() as i64,
            run.warnings.len() as i64,
        ],
    )?;

    Ok(())
}

const RECORD_COLUMNS: &str =
    "indicator, year, region_code, region_name, category, category_label, income, id";

fn record_from_row(row: &Row) -> rusqlite::Result<IncomeRecord> {
    let category_name: String = row.get(4)?;
    let category = Category::parse(&category_name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown category {}", category_name).into(),
        )
    })?;
    let id: i64 = row.get(7)?;

    Ok(IncomeRecord {
        indicator: row.get(0)?,
        year: row.get(1)?,
        region_code: row.get(2)?,
        region_name: row.get(3)?,
        category,
        category_label: row.get(5)?,
        income: row.get(6)?,
        line: id as usize,
    })
}

fn query_records<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<IncomeRecord>> {
    let sql = format!(
        "SELECT {} FROM income_records {} ORDER BY region_code, year, category",
        RECORD_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map(params, record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn get_all_records(conn: &Connection) -> Result<Vec<IncomeRecord>> {
    query_records(conn, "", [])
}

pub fn get_records_by_category(conn: &Connection, category: Category) -> Result<Vec<IncomeRecord>> {
    query_records(conn, "WHERE category = ?1", [category.name()])
}

pub fn get_records_by_year_range(conn: &Connection, from: i32, to: i32) -> Result<Vec<IncomeRecord>> {
    query_records(conn, "WHERE year BETWEEN ?1 AND ?2", [from, to])
}

pub fn get_runs(conn: &Connection) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, generated_at, source_path, source_sha256,
                total_rows, accepted_rows, outliers, warnings
         FROM pipeline_runs
         ORDER BY id DESC",
    )?;

    let runs = stmt
        .query_map([], |row| {
            Ok(RunRecord {
                run_id: row.get(0)?,
                generated_at: row.get(1)?,
                source_path: row.get(2)?,
                source_sha256: row.get(3)?,
                total_rows: row.get(4)?,
                accepted_rows: row.get(5)?,
                outliers: row.get(6)?,
                warnings: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM income_records", [], |row| row.get(0))?;

    Ok(count)
}
