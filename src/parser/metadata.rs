use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::cells::Cell;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    Model,
    Type,
    Class,
    Const,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 4] = [
        MetadataKey::Model,
        MetadataKey::Type,
        MetadataKey::Class,
        MetadataKey::Const,
    ];

    pub fn token(self) -> &'static str {
        match self {
            MetadataKey::Model => "model",
            MetadataKey::Type => "type",
            MetadataKey::Class => "class",
            MetadataKey::Const => "const",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            MetadataKey::Const => r"const(?:ant)?",
            other => other.token(),
        }
    }
}

/// Document-level metadata scraped from the preamble. Missing values hold
/// the `"Unknown"` sentinel rather than being absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub organization: String,
    pub model: String,
    #[serde(rename = "type")]
    pub meter_type: String,
    pub class: String,
    #[serde(rename = "const")]
    pub constant: String,
}

impl DocumentMetadata {
    pub fn get(&self, key: MetadataKey) -> &str {
        match key {
            MetadataKey::Model => &self.model,
            MetadataKey::Type => &self.meter_type,
            MetadataKey::Class => &self.class,
            MetadataKey::Const => &self.constant,
        }
    }
}

/// Finds the value for one key in the preamble text.
pub trait MetadataStrategy: Sync {
    fn find(&self, text: &str, key: MetadataKey) -> Option<String>;
}

/// `Key`, optional `:` or `-`, then the next whitespace-delimited token.
/// Matching ignores case; the captured value keeps its original case.
pub struct KeyValuePattern;

static KEY_RES: LazyLock<Vec<(MetadataKey, Regex)>> = LazyLock::new(|| {
    MetadataKey::ALL
        .iter()
        .map(|k| {
            let re = Regex::new(&format!(r"(?i)\b{}\b\s*[:\-]?\s*(\S+)", k.pattern())).unwrap();
            (*k, re)
        })
        .collect()
});

impl MetadataStrategy for KeyValuePattern {
    fn find(&self, text: &str, key: MetadataKey) -> Option<String> {
        let (_, re) = KEY_RES.iter().find(|(k, _)| *k == key)?;
        let value = re.captures(text)?.get(1)?.as_str();
        // "Model: Type: 5(60)A" means the model is missing, not "Type:"
        if value.ends_with(':') {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Preamble text: the first `limit` rows, cells joined by spaces.
pub fn preamble_text(rows: &[Vec<Cell>], limit: usize) -> String {
    rows.iter()
        .take(limit)
        .map(|r| r.iter().map(Cell::to_string).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract(
    rows: &[Vec<Cell>],
    limit: usize,
    organization: &str,
    strategy: &dyn MetadataStrategy,
) -> DocumentMetadata {
    let text = preamble_text(rows, limit);
    let value = |key: MetadataKey| {
        strategy.find(&text, key).unwrap_or_else(|| {
            tracing::debug!(key = key.token(), "metadata key not found, using sentinel");
            UNKNOWN.to_string()
        })
    };

    DocumentMetadata {
        organization: organization.to_string(),
        model: value(MetadataKey::Model),
        meter_type: value(MetadataKey::Type),
        class: value(MetadataKey::Class),
        constant: value(MetadataKey::Const),
    }
}

// ── Tests ──
