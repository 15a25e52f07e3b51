use thiserror::Error;

/// Failures surfaced by the ingestion pipeline. A missing metadata key or an
/// unparseable numeric cell is not an error: those resolve to the "Unknown"
/// sentinel and to an absent reading.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no files were provided")]
    NoFiles,

    #[error("could not read '{document}' as a spreadsheet")]
    Workbook {
        document: String,
        #[source]
        source: calamine::Error,
    },

    #[error("'{document}' contains no worksheet")]
    EmptyWorkbook { document: String },

    #[error("could not find table header (No./Asset No./Meter No.) in '{document}'")]
    HeaderNotFound { document: String },

    #[error("persistence failure")]
    Persistence(#[from] anyhow::Error),
}

impl IngestError {
    /// This error followed by its causes, joined by ": ".
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn report_lists_each_cause_once() {
        let cause: anyhow::Result<()> = Err(anyhow!("disk I/O error"));
        let err = IngestError::from(cause.context("Failed to insert row 3 of a.xlsx").unwrap_err());
        assert_eq!(err.to_string(), "persistence failure");
        assert_eq!(
            err.report(),
            "persistence failure: Failed to insert row 3 of a.xlsx: disk I/O error"
        );
    }

    #[test]
    fn report_without_cause_is_the_message() {
        let err = IngestError::HeaderNotFound { document: "b.xlsx".into() };
        assert_eq!(err.report(), err.to_string());
    }
}
