//! Bundled DDL and statement splitting.
//!
//! SQLite prepares one statement per call, so a schema file is broken into
//! individual statements which the installer runs in order inside the run
//! transaction.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const LEXICON_SCHEMA: &str = include_str!("../sql/lexicon.sql");
pub const KANJIDIC_SCHEMA: &str = include_str!("../sql/kanjidic.sql");

/// Splits schema text into executable statements.
///
/// `--` comments run to the end of the line and are dropped first, so a `;`
/// inside a comment does not end a statement. Blank statements are discarded.
/// String literals containing `;` are not supported.
pub fn split_statements(schema: &str) -> Vec<String> {
    let stripped: String = schema
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a schema override from disk.
pub fn load_schema(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read schema {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn splits_on_semicolons() {
        let statements = split_statements("CREATE TABLE a (x);\nCREATE TABLE b (y);\n");
        assert_eq!(statements, vec!["CREATE TABLE a (x)", "CREATE TABLE b (y)"]);
    }

    #[test]
    fn drops_comments_and_blank_statements() {
        let schema = "-- header; with a semicolon\nCREATE TABLE a (\n  x INTEGER -- note;\n);\n;\n\n";
        let statements = split_statements(schema);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(!statements[0].contains("note"));
    }

    #[test]
    fn last_statement_without_semicolon_is_kept() {
        assert_eq!(split_statements("CREATE TABLE a (x)"), vec!["CREATE TABLE a (x)"]);
    }

    #[test]
    fn empty_schema_has_no_statements() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("-- nothing here\n").is_empty());
    }

    #[test]
    fn bundled_schemas_split_into_tables_and_indexes() {
        let lexicon = split_statements(LEXICON_SCHEMA);
        let tables = lexicon.iter().filter(|s| s.starts_with("CREATE TABLE")).count();
        assert_eq!(tables, 20);
        assert!(lexicon.iter().all(|s| s.starts_with("CREATE")));

        let kanjidic = split_statements(KANJIDIC_SCHEMA);
        let tables = kanjidic.iter().filter(|s| s.starts_with("CREATE TABLE")).count();
        assert_eq!(tables, 12);
    }

    #[test]
    fn bundled_schemas_are_valid_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for statement in split_statements(LEXICON_SCHEMA)
            .into_iter()
            .chain(split_statements(KANJIDIC_SCHEMA))
        {
            conn.execute(&statement, []).unwrap();
        }
    }

    #[test]
    fn loads_schema_override() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "CREATE TABLE custom (id INTEGER PRIMARY KEY);").unwrap();
        let schema = load_schema(file.path()).unwrap();
        assert_eq!(split_statements(&schema).len(), 1);
    }

    #[test]
    fn missing_schema_override_is_an_error() {
        let err = load_schema(Path::new("/nonexistent/schema.sql")).unwrap_err();
        assert!(err.to_string().contains("Failed to read schema"));
    }
}
