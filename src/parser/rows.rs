use std::sync::LazyLock;

use regex::Regex;

use super::cells::Cell;

static LONE_P_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^p(\s|$)").unwrap());

/// Signature, approval and notice lines under the table.
pub const FOOTER_KEYWORDS: &[&str] = &["tester", "date", "notice"];

/// Exact cell labels that mark the column-header row.
pub const HEADER_LABELS: &[&str] = &["no.", "asset no.", "meter no."];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Blank,
    Metadata,
    HeaderCandidate,
    Footer,
    Data,
}

/// Classify one normalized row. First matching rule wins: blank, footer,
/// header candidate, then data or metadata depending on whether the table
/// header has already been seen.
pub fn classify(row: &[Cell], header_located: bool) -> RowKind {
    if row.iter().all(Cell::is_empty) {
        RowKind::Blank
    } else if is_footer(row) {
        RowKind::Footer
    } else if is_header_candidate(row) {
        RowKind::HeaderCandidate
    } else if header_located {
        RowKind::Data
    } else {
        RowKind::Metadata
    }
}

pub fn is_footer(row: &[Cell]) -> bool {
    let joined = joined_text(row);
    FOOTER_KEYWORDS.iter().any(|kw| joined.contains(kw))
        || joined.trim() == "p"
        || LONE_P_RE.is_match(&joined)
}

pub fn is_header_candidate(row: &[Cell]) -> bool {
    row.iter().any(|c| {
        let label = c.label();
        HEADER_LABELS.contains(&label.trim())
    })
}

/// Lower-cased cells joined by single spaces. Blank cells contribute an empty
/// string, so their positions are kept.
fn joined_text(row: &[Cell]) -> String {
    row.iter().map(Cell::label).collect::<Vec<_>>().join(" ")
}

// ── Tests ──
