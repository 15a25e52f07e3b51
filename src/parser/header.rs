use super::cells::Cell;
use super::rows::{classify, RowKind};

/// One column of the located header. `above` is filled only when the header
/// was merged with the row before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCell {
    pub above: Option<String>,
    pub label: Option<String>,
}

impl HeaderCell {
    /// Positional composite, e.g. "Error" over "1" gives "Error 1".
    pub fn composite(&self) -> Option<String> {
        match (&self.above, &self.label) {
            (Some(a), Some(l)) => Some(format!("{} {}", a, l)),
            (Some(a), None) => Some(a.clone()),
            (None, Some(l)) => Some(l.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocatedHeader {
    /// Row index of the header inside the sheet.
    pub index: usize,
    pub merged: bool,
    pub cells: Vec<HeaderCell>,
}

/// Index of the first row classified as a header candidate.
pub fn locate(rows: &[Vec<Cell>]) -> Option<usize> {
    rows.iter()
        .position(|r| classify(r, false) == RowKind::HeaderCandidate)
}

pub fn locate_header(rows: &[Vec<Cell>], merge: bool) -> Option<LocatedHeader> {
    let index = locate(rows)?;
    let header = &rows[index];
    let previous = index
        .checked_sub(1)
        .map(|i| &rows[i])
        .filter(|r| merge && classify(r, false) != RowKind::Blank);

    let cells = match previous {
        Some(above) => merge_rows(above, header),
        None => header
            .iter()
            .map(|c| HeaderCell {
                above: None,
                label: c.as_text(),
            })
            .collect(),
    };

    Some(LocatedHeader {
        index,
        merged: previous.is_some(),
        cells,
    })
}

/// Merge a two-line header positionally. A label in the upper row that was a
/// merged cell is stored only in its leftmost column, so it is carried right
/// across empty upper cells for as long as the lower row still has labels.
fn merge_rows(above: &[Cell], header: &[Cell]) -> Vec<HeaderCell> {
    let width = above.len().max(header.len());
    let mut carried: Option<String> = None;
    let mut cells = Vec::with_capacity(width);

    for col in 0..width {
        let upper = above.get(col).and_then(Cell::as_text);
        let label = header.get(col).and_then(Cell::as_text);
        let above = match upper {
            Some(u) => {
                carried = Some(u.clone());
                Some(u)
            }
            None if label.is_some() => carried.clone(),
            None => {
                carried = None;
                None
            }
        };
        cells.push(HeaderCell { above, label });
    }
    cells
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(c.to_string())
                }
            })
            .collect()
    }

    #[test]
    fn finds_first_header_row() {
        let rows = vec![
            row(&["METER VERIFICATION RECORD"]),
            row(&[""]),
            row(&["No.", "Asset No.", "Meter No."]),
            row(&["1", "A100", "M200"]),
            row(&["No.", "Asset No.", "Meter No."]),
        ];
        assert_eq!(locate(&rows), Some(2));
    }

    #[test]
    fn no_header_row() {
        let rows = vec![row(&["title"]), row(&["1", "A100", "M200"])];
        assert_eq!(locate(&rows), None);
        assert!(locate_header(&rows, true).is_none());
    }

    #[test]
    fn footer_with_labels_is_skipped() {
        let rows = vec![
            row(&["No.", "Tester"]),
            row(&["Meter No."]),
        ];
        assert_eq!(locate(&rows), Some(1));
    }

    #[test]
    fn without_merge_labels_are_plain() {
        let rows = vec![
            row(&["", "", "", "", "Error"]),
            row(&["No.", "Asset No.", "Meter No.", "", "1"]),
        ];
        let h = locate_header(&rows, false).unwrap();
        assert_eq!(h.index, 1);
        assert!(!h.merged);
        assert_eq!(h.cells[4].composite().as_deref(), Some("1"));
    }

    #[test]
    fn merges_two_line_header() {
        let rows = vec![
            row(&["", "", "", "", "Error", "", "", "", "", "Result"]),
            row(&["No.", "Asset No.", "Meter No.", "", "1", "2", "3", "4", "", "P/F"]),
        ];
        let h = locate_header(&rows, true).unwrap();
        assert!(h.merged);
        let labels: Vec<_> = h.cells.iter().map(HeaderCell::composite).collect();
        assert_eq!(labels[0].as_deref(), Some("No."));
        assert_eq!(labels[3], None);
        assert_eq!(labels[4].as_deref(), Some("Error 1"));
        assert_eq!(labels[7].as_deref(), Some("Error 4"));
        assert_eq!(labels[8], None);
        assert_eq!(labels[9].as_deref(), Some("Result P/F"));
    }

    #[test]
    fn blank_previous_row_is_not_merged() {
        let rows = vec![row(&["", ""]), row(&["No.", "Asset No."])];
        let h = locate_header(&rows, true).unwrap();
        assert!(!h.merged);
        assert_eq!(h.cells[1].composite().as_deref(), Some("Asset No."));
    }

    #[test]
    fn header_on_first_row() {
        let rows = vec![row(&["No.", "Asset No."])];
        let h = locate_header(&rows, true).unwrap();
        assert_eq!(h.index, 0);
        assert!(!h.merged);
    }
}
