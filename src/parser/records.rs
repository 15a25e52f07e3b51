use std::collections::BTreeMap;
use std::iter::{Enumerate, Skip};
use std::slice::Iter;

use calamine::Data;
use serde::{Deserialize, Serialize};

use super::cells::{normalize_row, Cell};
use super::columns::{fallback_name, ColumnMap, Field};
use super::rows::{classify, RowKind};

/// One test observation from a data row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub header_id: i64,
    pub asset_no: Option<String>,
    pub meter_no: Option<String>,
    pub errors: [Option<f64>; 4],
    pub result: Option<String>,
    pub uploaded_by: String,
    pub source_file: String,
    /// 1-based row number in the sheet.
    pub source_row: usize,
    pub extras: BTreeMap<String, String>,
}

impl ResultRecord {
    pub fn has_identifier(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.asset_no) || present(&self.meter_no)
    }
}

/// Rows that produced no record, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub blank: usize,
    pub footer: usize,
    pub repeated_header: usize,
    pub missing_identifier: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.blank + self.footer + self.repeated_header + self.missing_identifier
    }
}

/// Lazily turns the rows after the header into records. Consumes the rows
/// once; drop counts are complete after the iterator is exhausted.
pub struct RecordExtractor<'a> {
    rows: Skip<Enumerate<Iter<'a, Vec<Data>>>>,
    columns: &'a ColumnMap,
    header_id: i64,
    uploaded_by: &'a str,
    source_file: &'a str,
    dropped: DropCounts,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(
        rows: &'a [Vec<Data>],
        first_data_row: usize,
        columns: &'a ColumnMap,
        header_id: i64,
        uploaded_by: &'a str,
        source_file: &'a str,
    ) -> Self {
        RecordExtractor {
            rows: rows.iter().enumerate().skip(first_data_row),
            columns,
            header_id,
            uploaded_by,
            source_file,
            dropped: DropCounts::default(),
        }
    }

    pub fn dropped(&self) -> DropCounts {
        self.dropped
    }

    fn build(&self, index: usize, row: &[Cell]) -> ResultRecord {
        let mut record = ResultRecord {
            header_id: self.header_id,
            asset_no: None,
            meter_no: None,
            errors: [None; 4],
            result: None,
            uploaded_by: self.uploaded_by.to_string(),
            source_file: self.source_file.to_string(),
            source_row: index + 1,
            extras: BTreeMap::new(),
        };

        for (pos, cell) in row.iter().enumerate() {
            let Some(text) = cell.as_text() else {
                continue;
            };
            match self.columns.field_at(pos) {
                Some(Field::AssetNo) => record.asset_no = Some(text),
                Some(Field::MeterNo) => record.meter_no = Some(text),
                Some(Field::Error(n)) => {
                    if let Some(slot) = n.checked_sub(1).and_then(|i| record.errors.get_mut(i)) {
                        *slot = cell.as_number();
                    }
                }
                Some(Field::Result) => record.result = Some(text),
                Some(Field::Extra(name)) => {
                    record.extras.insert(name.clone(), text);
                }
                None => {
                    record.extras.insert(fallback_name(pos), text);
                }
            }
        }
        record
    }
}

impl Iterator for RecordExtractor<'_> {
    type Item = ResultRecord;

    fn next(&mut self) -> Option<ResultRecord> {
        loop {
            let (index, raw) = self.rows.next()?;
            let row = normalize_row(raw);
            match classify(&row, true) {
                RowKind::Blank => self.dropped.blank += 1,
                RowKind::Footer => self.dropped.footer += 1,
                RowKind::HeaderCandidate => self.dropped.repeated_header += 1,
                RowKind::Data | RowKind::Metadata => {
                    let record = self.build(index, &row);
                    if record.has_identifier() {
                        return Some(record);
                    }
                    self.dropped.missing_identifier += 1;
                }
            }
        }
    }
}

// ── Tests ──
