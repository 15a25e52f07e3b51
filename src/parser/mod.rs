pub mod cells;
pub mod columns;
pub mod header;
pub mod metadata;
pub mod records;
pub mod rows;

use crate::error::IngestError;
use crate::workbook::Sheet;
use cells::{normalize_row, Cell};
use columns::{ColumnMap, ColumnStrategy};
use header::LocatedHeader;
use metadata::{DocumentMetadata, KeyValuePattern, MetadataStrategy};
use records::RecordExtractor;
use rows::{classify, RowKind};

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub metadata_rows: usize,
    pub organization: String,
    pub strategy: ColumnStrategy,
    pub merge_header: bool,
}

/// A sheet whose header, metadata and column map are known. Records are read
/// from it on demand once the header has a store identifier.
#[derive(Debug)]
pub struct PreparedDocument {
    pub document: String,
    pub metadata: DocumentMetadata,
    pub header: LocatedHeader,
    pub columns: ColumnMap,
    sheet: Sheet,
}

impl PreparedDocument {
    pub fn records<'a>(&'a self, header_id: i64, uploaded_by: &'a str) -> RecordExtractor<'a> {
        RecordExtractor::new(
            &self.sheet.rows,
            self.header.index + 1,
            &self.columns,
            header_id,
            uploaded_by,
            &self.document,
        )
    }

    pub fn data_rows(&self) -> usize {
        self.sheet.rows.len().saturating_sub(self.header.index + 1)
    }
}

/// Pipeline: preamble rows → header → metadata + column map.
pub fn prepare(document: &str, sheet: Sheet, opts: &ParseOptions) -> Result<PreparedDocument, IngestError> {
    prepare_with(document, sheet, opts, &KeyValuePattern)
}

pub fn prepare_with(
    document: &str,
    sheet: Sheet,
    opts: &ParseOptions,
    strategy: &dyn MetadataStrategy,
) -> Result<PreparedDocument, IngestError> {
    let preamble = normalized_until_header(&sheet);
    let header = header::locate_header(&preamble, opts.merge_header).ok_or_else(|| {
        IngestError::HeaderNotFound {
            document: document.to_string(),
        }
    })?;
    tracing::debug!(document, row = header.index, merged = header.merged, "header located");

    let metadata = metadata::extract(
        &preamble[..header.index],
        opts.metadata_rows,
        &opts.organization,
        strategy,
    );
    let columns = columns::map_columns(&header.cells, opts.strategy);

    Ok(PreparedDocument {
        document: document.to_string(),
        metadata,
        header,
        columns,
        sheet,
    })
}

/// Normalized rows up to and including the first header candidate.
fn normalized_until_header(sheet: &Sheet) -> Vec<Vec<Cell>> {
    let mut rows = Vec::new();
    for raw in &sheet.rows {
        let row = normalize_row(raw);
        let is_header = classify(&row, false) == RowKind::HeaderCandidate;
        rows.push(row);
        if is_header {
            break;
        }
    }
    rows
}

// ── Tests ──
