use std::fmt;

use calamine::{Data, ExcelDateTime};
use chrono::NaiveTime;

/// Canonical form of one spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text form used for identifiers and labels. Whole numbers print without a
    /// fractional part, so a numeric asset number 1042 becomes "1042".
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(t) => Some(t.clone()),
            Cell::Number(n) => Some(n.to_string()),
        }
    }

    /// Numeric reading. Text is accepted when it parses as a finite number,
    /// optionally with a trailing percent sign.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(t) => t
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite()),
        }
    }

    /// Lower-cased text for keyword and label comparison; empty for blanks.
    pub fn label(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(t) => write!(f, "{}", t),
            Cell::Number(n) => write!(f, "{}", n),
        }
    }
}

pub fn normalize(raw: &Data) -> Cell {
    match raw {
        Data::Empty => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => text(s),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) if dt.is_duration() => Cell::Number(dt.as_f64()),
        Data::DateTime(dt) => date_text(dt).map(Cell::Text).unwrap_or(Cell::Number(dt.as_f64())),
        // #N/A, #DIV/0! and friends carry no reading
        Data::Error(_) => Cell::Empty,
    }
}

pub fn normalize_row(raw: &[Data]) -> Vec<Cell> {
    raw.iter().map(normalize).collect()
}

fn text(s: &str) -> Cell {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(trimmed.to_string())
    }
}

/// ISO text for a date cell in either the 1900 or the 1904 date system.
/// `None` when the serial is outside chrono's range.
fn date_text(dt: &ExcelDateTime) -> Option<String> {
    let datetime = dt.as_datetime()?;
    if datetime.time() == NaiveTime::MIN {
        Some(datetime.format("%Y-%m-%d").to_string())
    } else {
        Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::ExcelDateTimeType;

    fn date(serial: f64, is_1904: bool) -> Cell {
        normalize(&Data::DateTime(ExcelDateTime::new(serial, ExcelDateTimeType::DateTime, is_1904)))
    }

    #[test]
    fn blank_and_whitespace_are_empty() {
        assert_eq!(normalize(&Data::Empty), Cell::Empty);
        assert_eq!(normalize(&Data::String("   ".into())), Cell::Empty);
        assert_eq!(normalize(&Data::String("\u{a0}\t".into())), Cell::Empty);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            normalize(&Data::String("  Asset No. ".into())),
            Cell::Text("Asset No.".into())
        );
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(normalize(&Data::Float(-0.1)), Cell::Number(-0.1));
        assert_eq!(normalize(&Data::Int(42)), Cell::Number(42.0));
    }

    #[test]
    fn whole_numbers_print_as_integers() {
        assert_eq!(Cell::Number(1042.0).as_text().as_deref(), Some("1042"));
        assert_eq!(Cell::Number(0.05).as_text().as_deref(), Some("0.05"));
    }

    #[test]
    fn numeric_text_parses() {
        assert_eq!(Cell::Text("0.2".into()).as_number(), Some(0.2));
        assert_eq!(Cell::Text("-0.1".into()).as_number(), Some(-0.1));
        assert_eq!(Cell::Text("0.3%".into()).as_number(), Some(0.3));
    }

    #[test]
    fn non_numeric_text_is_absent() {
        assert_eq!(Cell::Text("n/a".into()).as_number(), None);
        assert_eq!(Cell::Text("NaN".into()).as_number(), None);
        assert_eq!(Cell::Text("inf".into()).as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
    }

    #[test]
    fn error_cells_are_empty() {
        let cell = normalize(&Data::Error(calamine::CellErrorType::NA));
        assert!(cell.is_empty());
    }

    #[test]
    fn serial_dates_render_iso() {
        assert_eq!(date(45292.0, false), Cell::Text("2024-01-01".into()));
        assert_eq!(date(45292.5, false), Cell::Text("2024-01-01 12:00:00".into()));
    }

    #[test]
    fn dates_follow_the_1904_system() {
        assert_eq!(date(0.0, true), Cell::Text("1904-01-01".into()));
        assert_eq!(date(43830.0, true), Cell::Text("2024-01-01".into()));
    }

    #[test]
    fn out_of_range_serial_stays_numeric() {
        assert_eq!(date(1.0e12, false), Cell::Number(1.0e12));
        assert_eq!(date(-1.0e12, false), Cell::Number(-1.0e12));
    }

    #[test]
    fn label_is_lowercase() {
        assert_eq!(Cell::Text("Meter No.".into()).label(), "meter no.");
        assert_eq!(Cell::Empty.label(), "");
    }
}
