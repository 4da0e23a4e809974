//! Persistent CSV dataset: encoding detection, schema gate, idempotent merge.
//!
//! The dataset is an append-only table with the fixed column order of
//! [`DATASET_COLUMNS`]. Rows are never edited or deleted, and `link` values
//! stay unique across every row ever written: a link harvested under one
//! date blocks re-insertion under any later date.
//!
//! Files are written as UTF-8 with a byte-order mark. Reads tolerate the
//! encodings the file has historically appeared in (UTF-8 with or without
//! BOM, GBK/GB2312) by probing a 1 KiB window. Every write goes through a
//! temporary file in the same directory followed by an atomic rename, so a
//! failed write leaves the previous file fully intact.

use encoding_rs::{Encoding, GBK, UTF_8};
use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::models::{DATASET_COLUMNS, NewsItem, NewsRecord};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const PROBE_WINDOW: usize = 1024;

/// Failures of the merge/load step. Fatal for that step only; callers
/// degrade to a "no new content" outcome instead of crashing the run.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset column layout mismatch: expected {expected:?}, found {found:?}")]
    Schema {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("{path} is not decodable as UTF-8 (with or without BOM) or GBK/GB2312")]
    Encoding { path: String },
    #[error("dataset I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset rows are malformed: {0}")]
    Csv(#[from] csv::Error),
}

/// Merge harvested items into the dataset at `path`.
///
/// Creates the file (header plus one row per item, dated `target_date`) when
/// it does not exist. Otherwise appends only the items whose link is absent
/// from every existing row. Returns whether anything was written beyond what
/// was already there; `Ok(false)` means the dedup produced nothing new and
/// the file was left untouched.
#[instrument(level = "info", skip_all, fields(path = %path.display(), incoming = items.len()))]
pub fn merge(
    path: &Path,
    items: &[NewsItem],
    target_date: chrono::NaiveDate,
) -> Result<bool, DatasetError> {
    let date = target_date.format("%Y-%m-%d").to_string();

    if !path.exists() {
        let rows: Vec<NewsRecord> = items
            .iter()
            .map(|item| NewsRecord::from_item(item, &date))
            .collect();
        write_atomic(path, &rows)?;
        info!(rows = rows.len(), "Created dataset");
        return Ok(!rows.is_empty());
    }

    let mut records = load(path)?;
    let existing_links: HashSet<&str> = records.iter().map(|row| row.link.as_str()).collect();
    let fresh: Vec<NewsRecord> = items
        .iter()
        .filter(|item| !existing_links.contains(item.link.as_str()))
        .map(|item| NewsRecord::from_item(item, &date))
        .collect();
    drop(existing_links);

    if fresh.is_empty() {
        info!("Nothing new after dedup; dataset unchanged");
        return Ok(false);
    }

    let appended = fresh.len();
    records.extend(fresh);
    write_atomic(path, &records)?;
    info!(appended, total = records.len(), "Dataset updated");
    Ok(true)
}

/// Load all rows, verifying the header matches the fixed schema exactly.
pub fn load(path: &Path) -> Result<Vec<NewsRecord>, DatasetError> {
    let bytes = fs::read(path)?;
    let encoding = detect_encoding(&bytes).ok_or_else(|| DatasetError::Encoding {
        path: path.display().to_string(),
    })?;
    debug!(encoding = encoding.name(), "Detected dataset encoding");
    // decode() strips a leading BOM when one is present.
    let (text, _, _) = encoding.decode(&bytes);

    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found != DATASET_COLUMNS {
        return Err(DatasetError::Schema {
            expected: DATASET_COLUMNS.iter().map(|s| s.to_string()).collect(),
            found,
        });
    }

    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Pick a decoder by probing the head of the file.
///
/// Order mirrors the historical try list: UTF-8 first (covering both the
/// BOM and plain forms), then GBK, whose decoder also serves the `gb2312`
/// label. A probe window that splits a multi-byte sequence at its edge still
/// counts as valid UTF-8.
fn detect_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&UTF8_BOM) {
        return Some(UTF_8);
    }
    let window = &bytes[..bytes.len().min(PROBE_WINDOW)];
    match std::str::from_utf8(window) {
        Ok(_) => return Some(UTF_8),
        Err(e) if e.error_len().is_none() => return Some(UTF_8),
        Err(_) => {}
    }
    let (_, had_errors) = GBK.decode_without_bom_handling(window);
    if !had_errors {
        return Some(GBK);
    }
    None
}

/// Full-file rewrite through a sibling temporary file plus atomic rename.
fn write_atomic(path: &Path, rows: &[NewsRecord]) -> Result<(), DatasetError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(64 * rows.len() + 64);
    buffer.extend_from_slice(&UTF8_BOM);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buffer);
        writer.write_record(DATASET_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(DatasetError::Io)?;
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&buffer)?;
    temp.persist(path).map_err(|e| DatasetError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn items(links: &[&str]) -> Vec<NewsItem> {
        links
            .iter()
            .enumerate()
            .map(|(index, link)| NewsItem {
                title: format!("标题 {index}"),
                link: link.to_string(),
            })
            .collect()
    }

    fn date(text: &str) -> NaiveDate {
        text.parse().unwrap()
    }

    #[test]
    fn test_creates_dataset_with_bom_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");

        let changed = merge(&path, &items(&["https://e.com/1", "https://e.com/2", "https://e.com/3"]), date("2025-10-03")).unwrap();
        assert!(changed);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(&UTF8_BOM));

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|row| row.date == "2025-10-03"));
    }

    #[test]
    fn test_merge_is_idempotent_and_leaves_file_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");
        let batch = items(&["https://e.com/1", "https://e.com/2"]);

        assert!(merge(&path, &batch, date("2025-10-03")).unwrap());
        let first_write = fs::read(&path).unwrap();

        assert!(!merge(&path, &batch, date("2025-10-03")).unwrap());
        assert_eq!(fs::read(&path).unwrap(), first_write);
    }

    #[test]
    fn test_merge_appends_only_net_new_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");

        merge(
            &path,
            &items(&["https://e.com/1", "https://e.com/2", "https://e.com/3", "https://e.com/4", "https://e.com/5"]),
            date("2025-10-02"),
        )
        .unwrap();
        let before = load(&path).unwrap();

        // 5 incoming, 2 of them already present
        let changed = merge(
            &path,
            &items(&["https://e.com/2", "https://e.com/4", "https://e.com/6", "https://e.com/7", "https://e.com/8"]),
            date("2025-10-03"),
        )
        .unwrap();
        assert!(changed);

        let after = load(&path).unwrap();
        assert_eq!(after.len(), 8);
        // prior rows untouched, in place, values intact
        assert_eq!(&after[..5], &before[..]);
        // appended rows keep input order and carry the new date
        let appended: Vec<&str> = after[5..].iter().map(|row| row.link.as_str()).collect();
        assert_eq!(appended, ["https://e.com/6", "https://e.com/7", "https://e.com/8"]);
        assert!(after[5..].iter().all(|row| row.date == "2025-10-03"));
    }

    #[test]
    fn test_fully_duplicate_batch_reports_no_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");
        merge(&path, &items(&["https://e.com/1"]), date("2025-10-02")).unwrap();
        let before = fs::read(&path).unwrap();

        // same link, different date: still a duplicate
        let changed = merge(&path, &items(&["https://e.com/1"]), date("2025-10-03")).unwrap();
        assert!(!changed);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_schema_mismatch_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");
        fs::write(&path, "date,title,link\n2025-10-02,t,https://e.com/1\n").unwrap();
        let before = fs::read(&path).unwrap();

        let result = merge(&path, &items(&["https://e.com/9"]), date("2025-10-03"));
        assert!(matches!(result, Err(DatasetError::Schema { .. })));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_reads_gbk_encoded_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");
        let text = "日期,新闻标题,详情页链接\n2025-10-02,百度新闻标题,https://e.com/gbk\n";
        let (encoded, _, had_errors) = GBK.encode(text);
        assert!(!had_errors);
        fs::write(&path, &encoded).unwrap();

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "百度新闻标题");
        assert_eq!(records[0].link, "https://e.com/gbk");
    }

    #[test]
    fn test_empty_batch_creates_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.csv");
        let changed = merge(&path, &[], date("2025-10-03")).unwrap();
        assert!(!changed);
        assert!(load(&path).unwrap().is_empty());
    }
}
