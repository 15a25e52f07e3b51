use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};

use crate::error::IngestError;

/// First worksheet of an uploaded workbook, rows in sheet coordinates.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Data>>,
}

/// Decode xlsx/xlsm/xlsb/xls/ods bytes and return the first worksheet.
pub fn read_first_sheet(document: &str, bytes: Vec<u8>) -> Result<Sheet, IngestError> {
    let workbook_error = |source| IngestError::Workbook {
        document: document.to_string(),
        source,
    };
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(workbook_error)?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::EmptyWorkbook {
            document: document.to_string(),
        })?;
    let range = workbook.worksheet_range(&name).map_err(workbook_error)?;
    let rows = absolute_rows(&range);
    tracing::debug!(document, sheet = %name, rows = rows.len(), "worksheet decoded");
    Ok(Sheet { name, rows })
}

/// A calamine range starts at its first used cell. Pad it back out so that
/// row and column positions match the sheet (A1 = row 0, column 0).
fn absolute_rows(range: &Range<Data>) -> Vec<Vec<Data>> {
    let Some((first_row, first_col)) = range.start() else {
        return Vec::new();
    };
    let mut rows: Vec<Vec<Data>> = (0..first_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells = vec![Data::Empty; first_col as usize];
        cells.extend_from_slice(row);
        rows.push(cells);
    }
    rows
}

// ── Tests ──
