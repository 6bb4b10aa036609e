//! Bulk row import

use super::RowStore;
use crate::error::{Error, Result};
use crate::types::Row;
use tracing::{info, warn};

/// A row the import could not write
#[derive(Debug)]
pub struct ImportFailure {
    /// Position in the input
    pub index: usize,
    /// Row code
    pub code: String,
    /// Why it failed
    pub error: Error,
}

/// Outcome of [`RowStore::import_rows`]
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Rows inserted or updated
    pub imported: usize,
    /// Rows that failed, in input order
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    /// True when every row was written
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl RowStore {
    /// Upsert every row in order, continuing past per-row failures
    ///
    /// Fails as a whole only when the dimension itself is unknown.
    pub async fn import_rows(&self, dimension_code: &str, rows: Vec<Row>) -> Result<ImportReport> {
        self.registry.require(dimension_code)?;

        let mut report = ImportReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            let code = row.code.clone();
            match self.upsert(dimension_code, row).await {
                Ok(_) => report.imported += 1,
                Err(error) => {
                    warn!(dimension = %dimension_code, code = %code, "Row import failed: {}", error);
                    report.failures.push(ImportFailure { index, code, error });
                },
            }
        }

        info!(
            dimension = %dimension_code,
            imported = report.imported,
            failed = report.failures.len(),
            "Row import finished"
        );
        Ok(report)
    }
}
