//! Append-only operation log, one worksheet per (greenhouse, plot).

use crate::error::Result;
use crate::record::{LOG_HEADER, OperationRecord, is_header, is_worksheet_key};
use crate::workbook::{self, Sheet};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Where operation records are kept.
pub trait OperationLog: Send + Sync {
    /// Appends `row` to the worksheet `key`, creating the worksheet with the
    /// log header first if it does not exist.
    fn append(&self, key: &str, row: &[String]) -> Result<()>;

    /// Every stored record, plot worksheet by plot worksheet, headers
    /// skipped.
    fn read_all(&self) -> Result<Vec<OperationRecord>>;

    /// Short description for start-up logs.
    fn describe(&self) -> String;
}

/// Turns raw worksheet rows into records.
pub(crate) fn records_from_rows<'a, I>(rows: I) -> Vec<OperationRecord>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    rows.into_iter()
        .filter(|row| !workbook::is_blank(row) && !is_header(row))
        .map(|row| OperationRecord::from_row(row))
        .collect()
}

/// Log kept in a local `.xlsx` workbook, rewritten on every append.
#[derive(Debug)]
pub struct LocalWorkbookLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalWorkbookLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalWorkbookLog {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows of one worksheet, header included. `None` if it does not exist.
    pub fn worksheet(&self, key: &str) -> Result<Option<Vec<Vec<String>>>> {
        Ok(workbook::read_workbook_or_empty(&self.path)?
            .into_iter()
            .find(|s| s.name == key)
            .map(|s| s.rows))
    }
}

impl OperationLog for LocalWorkbookLog {
    fn append(&self, key: &str, row: &[String]) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut sheets = workbook::read_workbook_or_empty(&self.path)?;
        let index = match sheets.iter().position(|s| s.name == key) {
            Some(index) => index,
            None => {
                info!("creating worksheet {} in {}", key, self.path.display());
                sheets.push(Sheet::with_header(key, &LOG_HEADER));
                sheets.len() - 1
            }
        };
        sheets[index].rows.push(row.to_vec());
        workbook::write_workbook(&self.path, &sheets)?;
        debug!("appended row to {}", key);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<OperationRecord>> {
        let sheets = workbook::read_workbook_or_empty(&self.path)?;
        Ok(sheets
            .iter()
            .filter(|s| is_worksheet_key(&s.name))
            .flat_map(|s| records_from_rows(&s.rows))
            .collect())
    }

    fn describe(&self) -> String {
        format!("local workbook {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: &str, details: &str) -> Vec<String> {
        vec![
            ts.into(),
            "B".into(),
            "3".into(),
            "tomate".into(),
            "irrigation".into(),
            details.into(),
        ]
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = LocalWorkbookLog::new(dir.path().join("log.xlsx"));

        log.append("B3", &row("2024-05-01 08:00", "AB EC 2")).unwrap();
        log.append("B3", &row("2024-05-02 08:00", "CD EC 3")).unwrap();

        let rows = log.worksheet("B3").unwrap().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(is_header(&rows[0]));
        assert_eq!(rows[2][5], "CD EC 3");
    }

    #[test]
    fn other_worksheets_survive_a_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let log = LocalWorkbookLog::new(dir.path().join("log.xlsx"));

        log.append("B3", &row("2024-05-01 08:00", "AB EC 2")).unwrap();
        log.append("C1", &row("2024-05-01 09:00", "M EC 1.6")).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].details, "AB EC 2");
        assert_eq!(records[1].details, "M EC 1.6");
    }

    #[test]
    fn foreign_worksheets_are_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut notes = Sheet::new("Notes");
        notes.rows.push(row("2024-05-01 08:00", "not a record"));
        workbook::write_workbook(&path, &[notes]).unwrap();
        let log = LocalWorkbookLog::new(path.clone());

        log.append("D4", &row("2024-05-01 08:00", "AB EC 2")).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].details, "AB EC 2");
    }

    #[test]
    fn empty_log_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = LocalWorkbookLog::new(dir.path().join("log.xlsx"));
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.worksheet("B3").unwrap().is_none());
    }
}
