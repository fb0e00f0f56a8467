use anyhow::{Context, Result};
use calamine::{open_workbook, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::path::Path;

use crate::models::{FapRecord, REPORT_HEADERS};

/// Append one row to the report workbook. The xlsx format has no in-place
/// append, so the first sheet is read back in full and rewritten.
pub fn append_row(path: &Path, record: &FapRecord) -> Result<()> {
    let mut rows = read_existing_rows(path)?;

    let header: Vec<String> = REPORT_HEADERS.iter().map(|h| h.to_string()).collect();
    match rows.first() {
        // Fresh file, or a legacy sheet written without a header row: the
        // header always ends up as row 0, old data kept below it.
        None => rows.push(header),
        Some(first) if *first != header => rows.insert(0, header),
        _ => {}
    }

    rows.push(record.values().iter().map(|v| v.to_string()).collect());
    write_all_rows(path, &rows)
}

fn read_existing_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range
            .with_context(|| format!("Failed to read first sheet of {}", path.display()))?,
        None => return Ok(Vec::new()),
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn write_all_rows(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("FAP")?;

    // Column widths sized for CNPJ and razão social strings.
    let widths: [f64; 9] = [14.0, 42.0, 20.0, 42.0, 6.0, 26.0, 10.0, 10.0, 20.0];
    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            worksheet.write(row_idx as u32, col_idx as u16, cell.as_str())?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> FapRecord {
        let mut record = FapRecord::new("2025");
        record.cnpj_root = "12.345.678".into();
        record.company_name = "EMPRESA TESTE LTDA".into();
        record.establishment_cnpj = "12.345.678/0001-90".into();
        record.establishment_name = "MATRIZ".into();
        record.uf = "SP".into();
        record.municipality = "SAO PAULO".into();
        record.aliquota = "0,5000".into();
        record
    }

    #[test]
    fn fresh_file_gets_header_then_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relatorio.xlsx");

        append_row(&path, &sample_record()).unwrap();

        let rows = read_existing_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], REPORT_HEADERS.map(String::from).to_vec());
        assert_eq!(rows[1][0], "12.345.678");
        assert_eq!(rows[1][7], "0,5000");
    }

    #[test]
    fn second_append_does_not_duplicate_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relatorio.xlsx");

        append_row(&path, &sample_record()).unwrap();
        let mut second = sample_record();
        second.vigencia = "2026".into();
        append_row(&path, &second).unwrap();

        let rows = read_existing_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][6], "2025");
        assert_eq!(rows[2][6], "2026");
    }

    #[test]
    fn divergent_first_row_is_pushed_below_new_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legado.xlsx");

        // Legacy sheet with no header row.
        let legacy = vec![vec!["algum".to_string(), "dado".to_string()]];
        write_all_rows(&path, &legacy).unwrap();

        append_row(&path, &sample_record()).unwrap();

        let rows = read_existing_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "CNPJ_Raiz");
        assert_eq!(rows[1][0], "algum");
        assert_eq!(rows[2][0], "12.345.678");
    }
}
