mod db;
mod error;
mod ingest;
mod parser;
mod settings;
mod workbook;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use db::{ResultFilter, SqliteStore, Store};
use ingest::{FileStatus, Upload};
use parser::columns::ColumnStrategy;
use parser::metadata::MetadataKey;
use settings::Settings;

#[derive(Parser)]
#[command(name = "meter_ingest", about = "Meter verification spreadsheet ingestion")]
struct Cli {
    /// SQLite database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Config file (default: ./meter_ingest.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more verification spreadsheets
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Submitter recorded on every row
        #[arg(short = 'u', long)]
        uploaded_by: Option<String>,
        /// Column mapping strategy
        #[arg(short, long, value_enum)]
        strategy: Option<ColumnStrategy>,
        /// Merge the row above the header into composite labels
        #[arg(long)]
        merge_header: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored results
    List {
        #[arg(long)]
        header_id: Option<i64>,
        #[arg(short = 'u', long)]
        uploaded_by: Option<String>,
        /// Filter by result label (e.g. PASS)
        #[arg(short, long)]
        result: Option<String>,
        /// Filter by source file name
        #[arg(short, long)]
        file: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show header and result counts
    Stats,
    /// Show the dataset header
    Header,
    /// Delete every stored result
    DeleteAll,
    /// Delete one result by id
    Delete { id: i64 },
    /// Write all results to a JSON file
    Export { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    let store = SqliteStore::new(&conn);

    let result = match cli.command {
        Commands::Ingest { files, uploaded_by, strategy, merge_header, json } => {
            if let Some(s) = strategy {
                settings.column_strategy = s;
            }
            settings.merge_header |= merge_header;

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                uploads.push(Upload {
                    filename,
                    bytes,
                    uploaded_by: uploaded_by.clone(),
                });
            }

            let summary = ingest::ingest(&store, uploads, &settings)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for status in &summary.per_file_status {
                    match status {
                        FileStatus::Success { filename, count, dropped } => println!(
                            "  ok    {:<32} {:>6} rows ({} dropped)",
                            truncate(filename, 32),
                            count,
                            dropped.total()
                        ),
                        FileStatus::Error { filename, error } => {
                            println!("  error {:<32} {}", truncate(filename, 32), error)
                        }
                    }
                }
                let header = summary
                    .header_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "\nInserted {} records (header {}, {} of {} files failed).",
                    summary.records_inserted,
                    header,
                    summary.failed(),
                    summary.per_file_status.len()
                );
            }
            Ok(())
        }
        Commands::List { header_id, uploaded_by, result, file, limit, json } => {
            let filter = ResultFilter {
                header_id,
                uploaded_by,
                result,
                source_file: file,
                limit: Some(limit),
            };
            let rows = store.list_results(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No results found.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<12} | {:<14} | {:>7} | {:>7} | {:>7} | {:>7} | {:<8} | {:<20}",
                "ID", "Asset", "Meter", "E1", "E2", "E3", "E4", "Result", "File"
            );
            println!("{}", "-".repeat(110));
            for r in &rows {
                let rec = &r.record;
                let err = |i: usize| rec.errors[i].map(|e| format!("{:.3}", e)).unwrap_or_else(|| "-".into());
                println!(
                    "{:>5} | {:<12} | {:<14} | {:>7} | {:>7} | {:>7} | {:>7} | {:<8} | {:<20}",
                    r.id,
                    truncate(rec.asset_no.as_deref().unwrap_or("-"), 12),
                    truncate(rec.meter_no.as_deref().unwrap_or("-"), 14),
                    err(0),
                    err(1),
                    err(2),
                    err(3),
                    truncate(rec.result.as_deref().unwrap_or("-"), 8),
                    truncate(&format!("{}:{}", rec.source_file, rec.source_row), 20),
                );
            }
            println!("\n{} results", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let c = store.counts()?;
            println!("Headers: {}", c.headers);
            println!("Results: {}", c.results);
            Ok(())
        }
        Commands::Header => {
            match store.find_existing_header()? {
                Some(h) => {
                    println!("Header #{} (created {})", h.id, h.created_at);
                    println!("  {:<13} {}", "organization", h.metadata.organization);
                    for key in MetadataKey::ALL {
                        println!("  {:<13} {}", key.token(), h.metadata.get(key));
                    }
                }
                None => println!("No header yet. Run 'ingest' first."),
            }
            Ok(())
        }
        Commands::DeleteAll => {
            let n = store.delete_all_results()?;
            println!("Deleted {} results.", n);
            Ok(())
        }
        Commands::Delete { id } => {
            if store.delete_result(id)? {
                println!("Deleted result {}.", id);
            } else {
                println!("No result with id {}.", id);
            }
            Ok(())
        }
        Commands::Export { path } => {
            let rows = store.list_results(&ResultFilter::default())?;
            let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &rows)?;
            println!("Exported {} results to {}", rows.len(), path.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ingest_requires_files() {
        assert!(Cli::try_parse_from(["meter_ingest", "ingest"]).is_err());
        let cli = Cli::try_parse_from(["meter_ingest", "ingest", "a.xlsx", "--strategy", "label"]).unwrap();
        match cli.command {
            Commands::Ingest { files, strategy, .. } => {
                assert_eq!(files, vec![PathBuf::from("a.xlsx")]);
                assert_eq!(strategy, Some(ColumnStrategy::Label));
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 3), "abc...");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
