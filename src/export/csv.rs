use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::models::{FapRecord, REPORT_HEADERS};

// UTF-8 BOM so Excel decodes accented municipality names correctly.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Append one row to the fallback CSV. BOM and header are written only when
/// the file is created; later appends add data rows only.
pub fn append_row(path: &Path, record: &FapRecord) -> Result<()> {
    let is_new = !path.exists();

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if is_new {
        file.write_all(UTF8_BOM)?;
    }

    // Header writing is tied to file creation, not to the writer.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(REPORT_HEADERS)?;
    }
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(vigencia: &str) -> FapRecord {
        let mut record = FapRecord::new(vigencia);
        record.cnpj_root = "12.345.678".into();
        record.municipality = "SÃO PAULO".into();
        record.uf = "SP".into();
        record
    }

    #[test]
    fn creation_writes_bom_and_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relatorio.csv");

        append_row(&path, &sample_record("2025")).unwrap();
        append_row(&path, &sample_record("2026")).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CNPJ_Raiz,"));
        assert!(lines[1].contains("2025"));
        assert!(lines[2].contains("2026"));
        assert_eq!(text.matches("CNPJ_Raiz").count(), 1);
    }

    #[test]
    fn accented_text_survives_the_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relatorio.csv");

        append_row(&path, &sample_record("2025")).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.contains("SÃO PAULO"));
    }

    #[test]
    fn serde_names_match_the_header_row() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(sample_record("2025")).unwrap();

        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().next().unwrap(), REPORT_HEADERS.join(","));
    }

    #[test]
    fn fields_with_separators_and_quotes_are_escaped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relatorio.csv");

        let mut record = sample_record("2025");
        record.company_name = "EMPRESA \"ALFA\", BETA E CIA".into();
        append_row(&path, &record).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "EMPRESA \"ALFA\", BETA E CIA");
    }
}
