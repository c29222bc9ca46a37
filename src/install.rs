//! Transactional install of decoded records.
//!
//! One run is one SQLite transaction: the schema statements, then every record
//! in document order. Nothing is committed unless all of them succeed.
//!
//! ```text
//! Idle -> SchemaBootstrapping -> Loading -> Committing  -> Done { committed: true }
//!                 |                 |           |
//!                 +-----------------+-----------+-> RollingBack -> Done { committed: false }
//! ```

use crate::config::{PROGRESS_INTERVAL, STATEMENT_CACHE_CAPACITY};
use crate::error::ImportError;
use crate::kanjidic::open_characters;
use crate::lexicon::open_lexicon;
use crate::mapper::{RelationalRecord, RowSink, Table, Value};
use crate::models::{Character, Entry};
use crate::schema::split_statements;
use crate::stats::InstallStats;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Idle,
    SchemaBootstrapping,
    Loading,
    Committing,
    RollingBack,
    Done { committed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Corpus {
    Lexicon,
    Kanjidic,
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corpus::Lexicon => f.write_str("JMdict"),
            Corpus::Kanjidic => f.write_str("KANJIDIC2"),
        }
    }
}

/// Outcome of a committed run
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub corpus: Corpus,
    pub records: u64,
    pub stats: InstallStats,
    pub elapsed: Duration,
}

impl ToSql for Value<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match *self {
            Value::Integer(i) => ToSqlOutput::from(i),
            Value::Bool(b) => ToSqlOutput::from(b),
            Value::Text(s) => ToSqlOutput::from(s),
            Value::Null => ToSqlOutput::from(Null),
        })
    }
}

/// [`RowSink`] writing through cached prepared statements of one connection.
pub struct SqliteSink<'a> {
    conn: &'a Connection,
    stats: InstallStats,
}

impl<'a> SqliteSink<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            stats: InstallStats::new(),
        }
    }

    /// Marks one record as fully persisted; returns the running count.
    pub fn finish_record(&mut self) -> u64 {
        self.stats.inc_records();
        self.stats.records
    }

    pub fn into_stats(self) -> InstallStats {
        self.stats
    }
}

impl RowSink for SqliteSink<'_> {
    type Error = rusqlite::Error;

    fn insert(&mut self, table: Table, values: &[Value<'_>]) -> Result<i64, rusqlite::Error> {
        let mut stmt = self.conn.prepare_cached(table.insert_sql())?;
        stmt.execute(params_from_iter(values.iter()))?;
        self.stats.inc_rows(table);
        Ok(self.conn.last_insert_rowid())
    }
}

fn configure(conn: &Connection) -> Result<(), ImportError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    Ok(())
}

/// Opens (creating if needed) the database file with foreign keys enforced.
pub fn open_database(path: &Path) -> Result<Connection, ImportError> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    debug!(path = %path.display(), "Database opened");
    Ok(conn)
}

pub fn open_in_memory_database() -> Result<Connection, ImportError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

/// Current phase of a run plus every phase it has passed through.
#[derive(Debug, Clone)]
struct PhaseTrail {
    current: InstallPhase,
    visited: Vec<InstallPhase>,
}

impl PhaseTrail {
    fn new() -> Self {
        Self {
            current: InstallPhase::Idle,
            visited: vec![InstallPhase::Idle],
        }
    }

    fn advance(&mut self, next: InstallPhase) {
        debug!(from = ?self.current, to = ?next, "Install phase");
        self.current = next;
        self.visited.push(next);
    }
}

fn make_spinner(corpus: Corpus, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Installing {corpus}"));
    pb
}

/// Drives decode, map and insert for one corpus over an exclusively borrowed
/// connection.
pub struct Installer<'c> {
    conn: &'c mut Connection,
    trail: PhaseTrail,
    progress: bool,
}

impl<'c> Installer<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            trail: PhaseTrail::new(),
            progress: false,
        }
    }

    /// Shows a spinner while records are loaded.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> InstallPhase {
        self.trail.current
    }

    /// Phases of the last run in order, starting with `Idle`.
    pub fn phases(&self) -> &[InstallPhase] {
        &self.trail.visited
    }

    pub fn install_lexicon<I>(
        &mut self,
        schema: &str,
        entries: I,
    ) -> Result<InstallReport, ImportError>
    where
        I: IntoIterator<Item = Result<Entry, ImportError>>,
    {
        self.run(Corpus::Lexicon, schema, entries)
    }

    pub fn install_characters<I>(
        &mut self,
        schema: &str,
        characters: I,
    ) -> Result<InstallReport, ImportError>
    where
        I: IntoIterator<Item = Result<Character, ImportError>>,
    {
        self.run(Corpus::Kanjidic, schema, characters)
    }

    fn run<T, I>(
        &mut self,
        corpus: Corpus,
        schema: &str,
        records: I,
    ) -> Result<InstallReport, ImportError>
    where
        T: RelationalRecord,
        I: IntoIterator<Item = Result<T, ImportError>>,
    {
        let started = Instant::now();
        self.trail = PhaseTrail::new();

        let tx = self.conn.transaction()?;
        let outcome = load(&tx, corpus, schema, records, &mut self.trail, self.progress);

        match outcome {
            Ok(stats) => {
                self.trail.advance(InstallPhase::Committing);
                if let Err(e) = tx.commit() {
                    // the failed transaction is rolled back when dropped
                    self.trail.advance(InstallPhase::RollingBack);
                    warn!(%corpus, error = %e, "Commit failed, rolling back");
                    self.trail.advance(InstallPhase::Done { committed: false });
                    return Err(e.into());
                }
                self.trail.advance(InstallPhase::Done { committed: true });

                let elapsed = started.elapsed();
                info!(
                    %corpus,
                    records = stats.records,
                    rows = stats.rows,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Install committed"
                );
                Ok(InstallReport {
                    corpus,
                    records: stats.records,
                    stats,
                    elapsed,
                })
            }
            Err(e) => {
                self.trail.advance(InstallPhase::RollingBack);
                warn!(%corpus, error = %e, "Install failed, rolling back");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                self.trail.advance(InstallPhase::Done { committed: false });
                Err(e)
            }
        }
    }
}

fn load<T, I>(
    conn: &Connection,
    corpus: Corpus,
    schema: &str,
    records: I,
    trail: &mut PhaseTrail,
    progress: bool,
) -> Result<InstallStats, ImportError>
where
    T: RelationalRecord,
    I: IntoIterator<Item = Result<T, ImportError>>,
{
    trail.advance(InstallPhase::SchemaBootstrapping);
    for (i, statement) in split_statements(schema).into_iter().enumerate() {
        debug!(index = i + 1, "Executing schema statement");
        if let Err(source) = conn.execute_batch(&statement) {
            return Err(ImportError::SchemaBootstrapFailure {
                index: i + 1,
                statement,
                source,
            });
        }
    }

    trail.advance(InstallPhase::Loading);
    let pb = make_spinner(corpus, progress);
    let mut sink = SqliteSink::new(conn);

    for record in records {
        let record = record?;
        record.persist(&mut sink)?;
        let records_done = sink.finish_record();

        if records_done % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("Installing {corpus}: {records_done} records"));
            debug!(records = records_done, "Install progress");
        }
    }
    pb.finish_and_clear();

    Ok(sink.into_stats())
}

/// Streams a JMdict file into `conn`, one entry in flight at a time.
pub fn install_lexicon_file(
    conn: &mut Connection,
    path: &Path,
    schema: &str,
) -> Result<InstallReport, ImportError> {
    let entries = open_lexicon(path)?;
    Installer::new(conn).install_lexicon(schema, entries)
}

/// Streams a KANJIDIC2 file into `conn`, one character in flight at a time.
pub fn install_kanjidic_file(
    conn: &mut Connection,
    path: &Path,
    schema: &str,
) -> Result<InstallReport, ImportError> {
    let characters = open_characters(path)?;
    Installer::new(conn).install_characters(schema, characters)
}
