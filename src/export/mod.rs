pub mod csv;
pub mod excel;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::FapRecord;

/// Append one result row to the xlsx report. When the workbook cannot be
/// read or rewritten (open in Excel, corrupt) the row goes to the sibling
/// CSV instead, so no consulta result is ever dropped. Returns the path the
/// row actually landed in.
pub fn append_record(path: &Path, record: &FapRecord) -> Result<PathBuf> {
    match excel::append_row(path, record) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(err) => {
            let fallback = csv_sibling(path);
            warn!(
                "xlsx append to {} failed ({:#}); writing to {}",
                path.display(),
                err,
                fallback.display()
            );
            csv::append_row(&fallback, record)
                .with_context(|| format!("CSV fallback {} also failed", fallback.display()))?;
            Ok(fallback)
        }
    }
}

/// Sibling CSV path: `relatorio_fap.xlsx` -> `relatorio_fap.csv`.
pub fn csv_sibling(path: &Path) -> PathBuf {
    path.with_extension("csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_swaps_extension_only() {
        assert_eq!(
            csv_sibling(Path::new("relatorio_fap.xlsx")),
            PathBuf::from("relatorio_fap.csv")
        );
        assert_eq!(
            csv_sibling(Path::new(r"saida\relatorio_fap.xlsx")),
            PathBuf::from(r"saida\relatorio_fap.csv")
        );
    }
}
