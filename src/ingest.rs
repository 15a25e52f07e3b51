use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::IngestError;
use crate::parser::records::DropCounts;
use crate::parser::{self, ParseOptions, PreparedDocument};
use crate::settings::Settings;
use crate::workbook;

/// One uploaded spreadsheet.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileStatus {
    Success {
        filename: String,
        count: usize,
        dropped: DropCounts,
    },
    Error {
        filename: String,
        error: String,
    },
}

impl FileStatus {
    pub fn filename(&self) -> &str {
        match self {
            FileStatus::Success { filename, .. } | FileStatus::Error { filename, .. } => filename,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub records_inserted: usize,
    pub header_id: Option<i64>,
    pub per_file_status: Vec<FileStatus>,
}

impl IngestSummary {
    pub fn failed(&self) -> usize {
        self.per_file_status
            .iter()
            .filter(|s| matches!(s, FileStatus::Error { .. }))
            .count()
    }
}

/// Ingest a batch of uploads. Files are decoded and prepared in parallel;
/// headers and results are then written one file at a time through `store`.
/// A failing file is reported in its status and does not stop the others.
pub fn ingest(
    store: &dyn Store,
    uploads: Vec<Upload>,
    settings: &Settings,
) -> Result<IngestSummary, IngestError> {
    if uploads.is_empty() {
        return Err(IngestError::NoFiles);
    }
    let opts = settings.parse_options();
    info!(files = uploads.len(), strategy = ?opts.strategy, "ingesting");

    let prepared: Vec<_> = uploads
        .into_par_iter()
        .map(|upload| {
            let uploaded_by = upload
                .uploaded_by
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| settings.default_uploader.clone());
            let doc = prepare_upload(upload.filename.clone(), upload.bytes, &opts);
            (upload.filename, uploaded_by, doc)
        })
        .collect();

    let pb = ProgressBar::new(prepared.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut summary = IngestSummary {
        records_inserted: 0,
        header_id: None,
        per_file_status: Vec::with_capacity(prepared.len()),
    };

    for (filename, uploaded_by, doc) in prepared {
        pb.set_message(filename.clone());
        let status = match doc {
            Ok(doc) => match persist(store, &doc, &uploaded_by, &mut summary) {
                Ok((count, dropped)) => {
                    info!(file = %filename, inserted = count, dropped = dropped.total(), "file ingested");
                    FileStatus::Success { filename, count, dropped }
                }
                Err(e) => {
                    let error = e.report();
                    warn!(file = %filename, "{error}");
                    FileStatus::Error { filename, error }
                }
            },
            Err(e) => {
                let error = e.report();
                warn!(file = %filename, "{error}");
                FileStatus::Error { filename, error }
            }
        };
        summary.per_file_status.push(status);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        inserted = summary.records_inserted,
        failed = summary.failed(),
        header_id = ?summary.header_id,
        "batch complete"
    );
    Ok(summary)
}

fn prepare_upload(
    filename: String,
    bytes: Vec<u8>,
    opts: &ParseOptions,
) -> Result<PreparedDocument, IngestError> {
    let sheet = workbook::read_first_sheet(&filename, bytes)?;
    let doc = parser::prepare(&filename, sheet, opts)?;
    debug!(
        file = %filename,
        strategy = ?doc.columns.strategy,
        columns = doc.columns.columns().len(),
        rows = doc.data_rows(),
        "columns mapped"
    );
    Ok(doc)
}

/// Write one document. Rows inserted before a failing insert stay committed
/// and are counted in `summary`.
fn persist(
    store: &dyn Store,
    doc: &PreparedDocument,
    uploaded_by: &str,
    summary: &mut IngestSummary,
) -> Result<(usize, DropCounts), IngestError> {
    let (header_id, created) = store.ensure_header(&doc.metadata)?;
    if created {
        info!(header_id, file = %doc.document, "header created");
    }
    summary.header_id.get_or_insert(header_id);

    let mut count = 0;
    let mut records = doc.records(header_id, uploaded_by);
    for record in records.by_ref() {
        if let Err(e) = store.insert_result(header_id, &record) {
            if count > 0 {
                warn!(file = %doc.document, kept = count, "insert failed, earlier rows kept");
            }
            return Err(e.into());
        }
        count += 1;
        summary.records_inserted += 1;
    }
    Ok((count, records.dropped()))
}

// ── Tests ──
