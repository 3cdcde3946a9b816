// 🗄️ SQLite export - upserted records plus a run audit row

use super::{ExportCapability, Exporter, GeneratedFile};
use crate::db::{insert_records, insert_run, open_database, verify_count};
use crate::error::{EtlError, Result};
use crate::pipeline::PipelineRun;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct SqliteExporter {
    db_path: PathBuf,
}

impl SqliteExporter {
    pub fn new(db_path: PathBuf) -> Self {
        SqliteExporter { db_path }
    }

    fn persist(&self, run: &PipelineRun) -> anyhow::Result<(usize, i64)> {
        let conn = open_database(&self.db_path)?;
        let written = insert_records(&conn, &run.cleaned.records, &run.run_id.to_string())?;
        insert_run(&conn, run)?;
        Ok((written, verify_count(&conn)?))
    }
}

impl Exporter for SqliteExporter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capability(&self) -> ExportCapability {
        ExportCapability::Database
    }

    /// Writes to the configured database path, not under `out_dir`
    fn export(&self, run: &PipelineRun, _out_dir: &Path) -> Result<Vec<GeneratedFile>> {
        let (written, total) = self
            .persist(run)
            .map_err(|e| EtlError::Export(format!("{:#}", e)))?;

        info!(db = %self.db_path.display(), written, total, "Records persisted");
        Ok(vec![GeneratedFile::new(self, self.db_path.clone())])
    }
}
