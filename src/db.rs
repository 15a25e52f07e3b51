use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::parser::metadata::DocumentMetadata;
use crate::parser::records::ResultRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS header (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            organization  TEXT,
            model         TEXT,
            type          TEXT,
            class         TEXT,
            const         TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_results (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id     INTEGER NOT NULL REFERENCES header(id),
            source_file   TEXT NOT NULL,
            source_row    INTEGER NOT NULL,
            asset_no      TEXT,
            meter_no      TEXT,
            error_1       REAL,
            error_2       REAL,
            error_3       REAL,
            error_4       REAL,
            result        TEXT,
            extras        TEXT,
            uploaded_by   TEXT NOT NULL,
            upload_date   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_results_header ON test_results(header_id);
        CREATE INDEX IF NOT EXISTS idx_results_meter ON test_results(meter_no);
        ",
    )?;
    Ok(())
}

// ── Rows ──

#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub id: i64,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub id: i64,
    #[serde(flatten)]
    pub record: ResultRecord,
    pub upload_date: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub header_id: Option<i64>,
    pub uploaded_by: Option<String>,
    pub result: Option<String>,
    pub source_file: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Counts {
    pub headers: usize,
    pub results: usize,
}

/// Persistence boundary of the ingestion pipeline.
pub trait Store {
    fn find_existing_header(&self) -> Result<Option<Header>>;
    fn create_header(&self, metadata: &DocumentMetadata) -> Result<i64>;
    /// Reuse the dataset's header or create it. Returns the id and whether it
    /// was created. Check and insert happen under one write lock.
    fn ensure_header(&self, metadata: &DocumentMetadata) -> Result<(i64, bool)>;
    fn insert_result(&self, header_id: i64, record: &ResultRecord) -> Result<i64>;
    fn delete_all_results(&self) -> Result<usize>;
    fn delete_result(&self, id: i64) -> Result<bool>;
    fn list_results(&self, filter: &ResultFilter) -> Result<Vec<StoredResult>>;
    fn counts(&self) -> Result<Counts>;
}

/// Store over a connection owned by the caller.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore { conn }
    }
}

impl Store for SqliteStore<'_> {
    fn find_existing_header(&self) -> Result<Option<Header>> {
        query_header(self.conn)
    }

    fn create_header(&self, metadata: &DocumentMetadata) -> Result<i64> {
        insert_header(self.conn, metadata)
    }

    fn ensure_header(&self, metadata: &DocumentMetadata) -> Result<(i64, bool)> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let found = query_header(&tx)?;
        let outcome = match found {
            Some(h) => (h.id, false),
            None => (insert_header(&tx, metadata)?, true),
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn insert_result(&self, header_id: i64, r: &ResultRecord) -> Result<i64> {
        let extras = if r.extras.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&r.extras)?)
        };
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO test_results
             (header_id, source_file, source_row, asset_no, meter_no,
              error_1, error_2, error_3, error_4, result, extras, uploaded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        stmt.execute(params![
            header_id, r.source_file, r.source_row as i64, r.asset_no, r.meter_no,
            r.errors[0], r.errors[1], r.errors[2], r.errors[3], r.result, extras, r.uploaded_by,
        ])
        .with_context(|| format!("Failed to insert row {} of {}", r.source_row, r.source_file))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_all_results(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM test_results", [])?)
    }

    fn delete_result(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM test_results WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    fn list_results(&self, filter: &ResultFilter) -> Result<Vec<StoredResult>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(id) = filter.header_id {
            conditions.push(format!("header_id = ?{}", params.len() + 1));
            params.push(Box::new(id));
        }
        if let Some(u) = &filter.uploaded_by {
            conditions.push(format!("uploaded_by = ?{}", params.len() + 1));
            params.push(Box::new(u.clone()));
        }
        if let Some(r) = &filter.result {
            conditions.push(format!("result = ?{} COLLATE NOCASE", params.len() + 1));
            params.push(Box::new(r.clone()));
        }
        if let Some(f) = &filter.source_file {
            conditions.push(format!("source_file = ?{}", params.len() + 1));
            params.push(Box::new(f.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit_clause = match filter.limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        };

        let sql = format!(
            "SELECT id, header_id, source_file, source_row, asset_no, meter_no,
                    error_1, error_2, error_3, error_4, result, extras, uploaded_by, upload_date
             FROM test_results{}
             ORDER BY id{}",
            where_clause, limit_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let extras = match row.get::<_, Option<String>>(11)? {
                    Some(json) => serde_json::from_str(&json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e))
                    })?,
                    None => BTreeMap::new(),
                };
                let source_row: i64 = row.get(3)?;
                Ok(StoredResult {
                    id: row.get(0)?,
                    record: ResultRecord {
                        header_id: row.get(1)?,
                        source_file: row.get(2)?,
                        source_row: source_row as usize,
                        asset_no: row.get(4)?,
                        meter_no: row.get(5)?,
                        errors: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                        result: row.get(10)?,
                        extras,
                        uploaded_by: row.get(12)?,
                    },
                    upload_date: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn counts(&self) -> Result<Counts> {
        let headers: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM header", [], |r| r.get(0))?;
        let results: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM test_results", [], |r| r.get(0))?;
        Ok(Counts { headers, results })
    }
}

fn query_header(conn: &Connection) -> Result<Option<Header>> {
    let header = conn
        .query_row(
            "SELECT id, organization, model, type, class, const, created_at
             FROM header ORDER BY id LIMIT 1",
            [],
            |row| {
                Ok(Header {
                    id: row.get(0)?,
                    metadata: DocumentMetadata {
                        organization: row.get(1)?,
                        model: row.get(2)?,
                        meter_type: row.get(3)?,
                        class: row.get(4)?,
                        constant: row.get(5)?,
                    },
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(header)
}

fn insert_header(conn: &Connection, m: &DocumentMetadata) -> Result<i64> {
    conn.execute(
        "INSERT INTO header (organization, model, type, class, const) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![m.organization, m.model, m.meter_type, m.class, m.constant],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(model: &str) -> DocumentMetadata {
        DocumentMetadata {
            organization: "GSA".into(),
            model: model.into(),
            meter_type: "5(60)A".into(),
            class: "1.0".into(),
            constant: "1000imp/kWh".into(),
        }
    }

    fn record(asset: &str, result: &str, by: &str) -> ResultRecord {
        ResultRecord {
            header_id: 0,
            asset_no: Some(asset.into()),
            meter_no: None,
            errors: [Some(0.1), None, Some(-0.2), None],
            result: Some(result.into()),
            uploaded_by: by.into(),
            source_file: "a.xlsx".into(),
            source_row: 3,
            extras: BTreeMap::from([("No.".to_string(), "1".to_string())]),
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let store = SqliteStore::new(&conn);
        assert_eq!(store.counts().unwrap().results, 0);
    }

    #[test]
    fn ensure_header_reuses_first() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        assert!(store.find_existing_header().unwrap().is_none());

        let (first, created) = store.ensure_header(&metadata("A")).unwrap();
        assert!(created);
        let (second, created) = store.ensure_header(&metadata("B")).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let h = store.find_existing_header().unwrap().unwrap();
        assert_eq!(h.metadata.model, "A");
        assert_eq!(store.counts().unwrap().headers, 1);
    }

    #[test]
    fn result_round_trips_through_listing() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let header_id = store.create_header(&metadata("A")).unwrap();
        let id = store.insert_result(header_id, &record("A1", "PASS", "Ama")).unwrap();

        let rows = store.list_results(&ResultFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let stored = &rows[0];
        assert_eq!(stored.id, id);
        assert_eq!(stored.record.header_id, header_id);
        assert_eq!(stored.record.errors, [Some(0.1), None, Some(-0.2), None]);
        assert_eq!(stored.record.extras.get("No.").map(String::as_str), Some("1"));
        assert!(!stored.upload_date.is_empty());
    }

    #[test]
    fn corrupt_extras_fail_the_listing() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let h = store.create_header(&metadata("A")).unwrap();
        let id = store.insert_result(h, &record("A1", "PASS", "Ama")).unwrap();
        conn.execute("UPDATE test_results SET extras = '{not json' WHERE id = ?1", params![id])
            .unwrap();

        let err = store.list_results(&ResultFilter::default()).unwrap_err();
        let cause = err.downcast_ref::<rusqlite::Error>();
        assert!(matches!(cause, Some(rusqlite::Error::FromSqlConversionFailure(11, Type::Text, _))));
    }

    #[test]
    fn result_needs_existing_header() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        assert!(store.insert_result(42, &record("A1", "PASS", "Ama")).is_err());
    }

    #[test]
    fn list_filters() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let h = store.create_header(&metadata("A")).unwrap();
        store.insert_result(h, &record("A1", "PASS", "Ama")).unwrap();
        store.insert_result(h, &record("A2", "FAIL", "Kofi")).unwrap();
        store.insert_result(h, &record("A3", "pass", "Kofi")).unwrap();

        let by_kofi = ResultFilter {
            uploaded_by: Some("Kofi".into()),
            ..Default::default()
        };
        assert_eq!(store.list_results(&by_kofi).unwrap().len(), 2);

        let passed = ResultFilter {
            result: Some("PASS".into()),
            ..Default::default()
        };
        assert_eq!(store.list_results(&passed).unwrap().len(), 2);

        let first = ResultFilter {
            limit: Some(1),
            ..Default::default()
        };
        let rows = store.list_results(&first).unwrap();
        assert_eq!(rows[0].record.asset_no.as_deref(), Some("A1"));
    }

    #[test]
    fn deletes() {
        let conn = open_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let h = store.create_header(&metadata("A")).unwrap();
        let a = store.insert_result(h, &record("A1", "PASS", "Ama")).unwrap();
        store.insert_result(h, &record("A2", "PASS", "Ama")).unwrap();

        assert!(store.delete_result(a).unwrap());
        assert!(!store.delete_result(a).unwrap());
        assert_eq!(store.delete_all_results().unwrap(), 1);
        let counts = store.counts().unwrap();
        assert_eq!(counts.results, 0);
        assert_eq!(counts.headers, 1);
    }
}
