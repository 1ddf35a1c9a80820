use crate::error::Result;
use crate::record::{LOG_HEADER, OperationRecord};
use crate::workbook::{self, Sheet};

pub const EXPORT_SHEET: &str = "Historique";

/// Convert operation records to CSV format
///
/// The first line is the log header, then one line per record in the
/// order given. Fields containing commas, quotes or newlines are quoted.
pub fn to_csv(records: &[OperationRecord]) -> String {
    let mut csv_content = String::new();
    push_csv_line(&mut csv_content, LOG_HEADER.iter().copied());
    for record in records {
        let row = record.to_row();
        push_csv_line(&mut csv_content, row.iter().map(String::as_str));
    }
    csv_content
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, value) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            let escaped = value.replace('"', "\"\"");
            out.push_str(&format!("\"{}\"", escaped));
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert operation records to XLSX format
///
/// Produces a single `Historique` worksheet holding the log header and the
/// records with the same column order as [`OperationRecord::to_row`].
pub fn to_xlsx(records: &[OperationRecord]) -> Result<Vec<u8>> {
    let mut sheet = Sheet::with_header(EXPORT_SHEET, &LOG_HEADER);
    sheet.rows.extend(records.iter().map(OperationRecord::to_row));
    workbook::workbook_to_buffer(&[sheet])
}

/// File name offered for a download, e.g. `historique_2024-05-01.xlsx`.
pub fn export_file_name(date: chrono::NaiveDate) -> String {
    format!("historique_{}.xlsx", date.format("%Y-%m-%d"))
}
