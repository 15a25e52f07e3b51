use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::header::HeaderCell;

static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:e|err|error)\s*[-_#]?\s*([1-4])$").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const ASSET_LABELS: &[&str] = &["asset no", "asset number", "asset", "asset id", "asset #"];
const METER_LABELS: &[&str] = &[
    "meter no",
    "meter number",
    "meter",
    "meter serial no",
    "meter serial number",
    "meter #",
];
const RESULT_LABELS: &[&str] = &["result", "results", "remark", "remarks", "verdict", "pass/fail"];

/// Column positions of the standard verification record template.
pub mod template {
    pub const ASSET_NO: usize = 1;
    pub const METER_NO: usize = 2;
    pub const ERRORS: [usize; 4] = [4, 5, 6, 7];
    pub const RESULT: usize = 23;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColumnStrategy {
    /// Hard-coded template positions
    #[default]
    Fixed,
    /// Match header labels against known synonyms
    Label,
    /// Labels when they identify the asset or meter column, template otherwise
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    AssetNo,
    MeterNo,
    /// Error reading 1 to 4.
    Error(usize),
    Result,
    /// Any other column, kept under its label or `column_<n>`.
    Extra(String),
}

/// Position to field mapping, ordered by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub strategy: ColumnStrategy,
    columns: Vec<(usize, Field)>,
}

impl ColumnMap {
    pub fn field_at(&self, position: usize) -> Option<&Field> {
        self.columns
            .iter()
            .find(|(p, _)| *p == position)
            .map(|(_, f)| f)
    }

    pub fn position_of(&self, field: &Field) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, f)| f == field)
            .map(|(p, _)| *p)
    }

    pub fn columns(&self) -> &[(usize, Field)] {
        &self.columns
    }

    fn has_identifier(&self) -> bool {
        self.position_of(&Field::AssetNo).is_some() || self.position_of(&Field::MeterNo).is_some()
    }
}

pub fn fallback_name(position: usize) -> String {
    format!("column_{}", position)
}

pub fn map_columns(header: &[HeaderCell], strategy: ColumnStrategy) -> ColumnMap {
    match strategy {
        ColumnStrategy::Fixed => fixed_map(header),
        ColumnStrategy::Label => label_map(header),
        ColumnStrategy::Auto => {
            let by_label = label_map(header);
            if by_label.has_identifier() {
                ColumnMap {
                    strategy: ColumnStrategy::Auto,
                    ..by_label
                }
            } else {
                tracing::debug!("no identifier labels found, using template positions");
                ColumnMap {
                    strategy: ColumnStrategy::Auto,
                    ..fixed_map(header)
                }
            }
        }
    }
}

fn fixed_map(header: &[HeaderCell]) -> ColumnMap {
    let mut columns = vec![
        (template::ASSET_NO, Field::AssetNo),
        (template::METER_NO, Field::MeterNo),
        (template::RESULT, Field::Result),
    ];
    for (i, pos) in template::ERRORS.iter().enumerate() {
        columns.push((*pos, Field::Error(i + 1)));
    }
    let claimed: HashSet<usize> = columns.iter().map(|(p, _)| *p).collect();
    let mut names = Names::default();
    for (pos, cell) in header.iter().enumerate() {
        if !claimed.contains(&pos) {
            columns.push((pos, Field::Extra(names.unique(cell, pos))));
        }
    }
    columns.sort_by_key(|(p, _)| *p);
    ColumnMap {
        strategy: ColumnStrategy::Fixed,
        columns,
    }
}

fn label_map(header: &[HeaderCell]) -> ColumnMap {
    let mut columns = Vec::with_capacity(header.len());
    let mut names = Names::default();
    for (pos, cell) in header.iter().enumerate() {
        let field = match_field(cell)
            .filter(|f| !columns.iter().any(|(_, taken)| taken == f))
            .unwrap_or_else(|| Field::Extra(names.unique(cell, pos)));
        columns.push((pos, field));
    }
    ColumnMap {
        strategy: ColumnStrategy::Label,
        columns,
    }
}

/// Composite label first, then the header row's own label.
fn match_field(cell: &HeaderCell) -> Option<Field> {
    [cell.composite(), cell.label.clone()]
        .into_iter()
        .flatten()
        .find_map(|l| field_for_label(&normalize_label(&l)))
}

fn field_for_label(label: &str) -> Option<Field> {
    if ASSET_LABELS.contains(&label) {
        Some(Field::AssetNo)
    } else if METER_LABELS.contains(&label) {
        Some(Field::MeterNo)
    } else if RESULT_LABELS.contains(&label) {
        Some(Field::Result)
    } else {
        ERROR_RE
            .captures(label)
            .and_then(|c| c[1].parse::<usize>().ok())
            .map(Field::Error)
    }
}

/// "  Asset  No. " -> "asset no"
fn normalize_label(label: &str) -> String {
    let lower = label.to_lowercase();
    SPACES_RE
        .replace_all(lower.trim(), " ")
        .trim_end_matches(['.', ':'])
        .trim()
        .to_string()
}

#[derive(Default)]
struct Names {
    used: HashSet<String>,
}

impl Names {
    fn unique(&mut self, cell: &HeaderCell, pos: usize) -> String {
        let base = cell.composite().unwrap_or_else(|| fallback_name(pos));
        let name = if self.used.contains(&base) {
            format!("{}_{}", base, pos)
        } else {
            base
        };
        self.used.insert(name.clone());
        name
    }
}

// ── Tests ──
