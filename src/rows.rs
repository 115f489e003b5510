//! # Row Source
//!
//! Turns an uploaded spreadsheet into an ordered sequence of string-keyed
//! records. Column headers become record keys.
//!
//! | Extension | Reader |
//! |-----------|--------|
//! | `.csv` | `csv`, first line is the header row, blank lines skipped |
//! | `.xlsx`, `.xls` | `calamine`, first sheet, first row is the header row |
//!
//! Field mapping is applied per row afterwards by [`resolve_row`].

use async_trait::async_trait;
use calamine::{Data, Reader, open_workbook_auto};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::CertError;

/// One spreadsheet record.
pub type Row = HashMap<String, String>;

/// Certificate field → source column.
pub type FieldMapping = BTreeMap<String, String>;

/// Anything that can produce the rows of a named upload.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn read_rows(&self, filename: &str) -> Result<Vec<Row>, CertError>;
}

/// Header and sample summary of an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub headers: Vec<String>,
    pub row_count: usize,
    pub preview: Vec<Row>,
}

/// Reads CSV and Excel files from the uploads directory.
#[derive(Debug, Clone)]
pub struct SpreadsheetRowSource {
    uploads_dir: PathBuf,
}

impl SpreadsheetRowSource {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    fn locate(&self, filename: &str) -> Result<PathBuf, CertError> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| CertError::RowSource(format!("Invalid file name: {}", filename)))?;
        let path = self.uploads_dir.join(name);
        if !path.is_file() {
            return Err(CertError::RowSource(format!("File not found: {}", filename)));
        }
        Ok(path)
    }

    /// Headers, row count and the first three rows of an upload.
    pub async fn describe(&self, filename: &str) -> Result<SheetSummary, CertError> {
        let path = self.locate(filename)?;
        let (headers, rows) = read_table(path).await?;
        Ok(SheetSummary {
            headers,
            row_count: rows.len(),
            preview: rows.into_iter().take(3).collect(),
        })
    }
}

#[async_trait]
impl RowSource for SpreadsheetRowSource {
    async fn read_rows(&self, filename: &str) -> Result<Vec<Row>, CertError> {
        let path = self.locate(filename)?;
        let (_, rows) = read_table(path).await?;
        Ok(rows)
    }
}

async fn read_table(path: PathBuf) -> Result<(Vec<String>, Vec<Row>), CertError> {
    tokio::task::spawn_blocking(move || read_table_sync(&path))
        .await
        .map_err(|e| CertError::RowSource(format!("Reader task failed: {}", e)))?
}

fn read_table_sync(path: &Path) -> Result<(Vec<String>, Vec<Row>), CertError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" => read_workbook(path),
        _ => Err(CertError::RowSource("Unsupported file type".to_string())),
    }
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Row>), CertError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| CertError::RowSource(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CertError::RowSource(format!("Failed to read CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| CertError::RowSource(format!("Failed to read CSV row: {}", e)))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok((headers, rows))
}

fn read_workbook(path: &Path) -> Result<(Vec<String>, Vec<Row>), CertError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CertError::RowSource(format!("Failed to open workbook: {}", e)))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| CertError::RowSource("Workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| CertError::RowSource(format!("Failed to read sheet '{}': {}", sheet, e)))?;

    let mut lines = range.rows();
    let headers: Vec<String> = match lines.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => return Ok((Vec::new(), Vec::new())),
    };

    let mut rows = Vec::new();
    for line in lines {
        let row: Row = headers
            .iter()
            .zip(line.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, cell)| (h.clone(), cell_text(cell)))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok((headers, rows))
}

/// Cell value as displayed text. Whole floats drop their fraction.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Apply a field mapping to one raw row.
///
/// Mapped fields take the value of their source column (empty when the column
/// is absent). Every raw column stays available under its own header, so
/// template keys the mapping does not mention still bind directly.
pub fn resolve_row(raw: &Row, mapping: &FieldMapping) -> Row {
    let mut resolved = raw.clone();
    for (field, column) in mapping {
        let value = raw.get(column).cloned().unwrap_or_default();
        resolved.insert(field.clone(), value);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_row_mapping_and_fallback() {
        let raw = row(&[("full_name", "Ann Lee"), ("event", "RustConf")]);
        let mapping: FieldMapping = [
            ("name".to_string(), "full_name".to_string()),
            ("email".to_string(), "mail".to_string()),
        ]
        .into_iter()
        .collect();

        let resolved = resolve_row(&raw, &mapping);
        assert_eq!(resolved.get("name").map(String::as_str), Some("Ann Lee"));
        assert_eq!(resolved.get("email").map(String::as_str), Some(""));
        assert_eq!(resolved.get("event").map(String::as_str), Some("RustConf"));
        assert_eq!(resolved.get("full_name").map(String::as_str), Some("Ann Lee"));
    }

    #[test]
    fn test_mapping_overrides_same_named_column() {
        let raw = row(&[("name", "raw"), ("display", "mapped")]);
        let mapping: FieldMapping = [("name".to_string(), "display".to_string())]
            .into_iter()
            .collect();
        assert_eq!(resolve_row(&raw, &mapping)["name"], "mapped");
    }

    #[tokio::test]
    async fn test_read_csv_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("people.csv"),
            "name,event\nAnn,RustConf\n\nBob,\"Meetup, Berlin\"\nCid,Expo\n",
        )
        .unwrap();

        let source = SpreadsheetRowSource::new(dir.path());
        let rows = source.read_rows("people.csv").await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bob", "Cid"]);
        assert_eq!(rows[1]["event"], "Meetup, Berlin");
    }

    #[tokio::test]
    async fn test_describe() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("p.csv"),
            "name,event\nA,x\nB,y\nC,z\nD,w\n",
        )
        .unwrap();
        let summary = SpreadsheetRowSource::new(dir.path())
            .describe("p.csv")
            .await
            .unwrap();
        assert_eq!(summary.headers, vec!["name", "event"]);
        assert_eq!(summary.row_count, 4);
        assert_eq!(summary.preview.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let source = SpreadsheetRowSource::new(dir.path());

        let err = source.read_rows("absent.csv").await.unwrap_err();
        assert!(err.to_string().contains("File not found"));

        let err = source.read_rows("notes.txt").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(42.0)), "42");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::String("x".to_string())), "x");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
