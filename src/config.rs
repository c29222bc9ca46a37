use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Progress update interval (tick every N records)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Read buffer for source files, plain or decompressed
pub const SOURCE_BUFFER_SIZE: usize = 128 * 1024;

/// Large enough to keep one cached INSERT per table of both corpora
pub const STATEMENT_CACHE_CAPACITY: usize = 64;

/// Joins the form, reading and sense number parts of a cross-reference
pub const XREF_DELIMITER: char = '・';

/// `xml:lang` default for `<gloss>` and `<lsource>` in the JMdict DTD
pub const DEFAULT_GLOSS_LANG: &str = "eng";

/// `m_lang` default for `<meaning>` in the KANJIDIC2 DTD
pub const DEFAULT_MEANING_LANG: &str = "en";

pub const DEFAULT_DATABASE: &str = "./jmdict.db";
pub const DEFAULT_LEXICON_FILE: &str = "./data/JMdict_e";
pub const DEFAULT_KANJIDIC_FILE: &str = "./data/kanjidic2.xml";

/// The only storage driver the installer speaks
pub const SUPPORTED_DRIVER: &str = "sqlite3";

/// On-disk install configuration. Unknown keys are ignored so the same file
/// can carry settings for the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    #[serde(rename = "jmdict")]
    pub lexicon_file: String,
    #[serde(rename = "kanjidic2")]
    pub kanjidic_file: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    #[serde(rename = "connect")]
    pub connection: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            lexicon_file: DEFAULT_LEXICON_FILE.to_string(),
            kanjidic_file: DEFAULT_KANJIDIC_FILE.to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: SUPPORTED_DRIVER.to_string(),
            connection: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl InstallConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: InstallConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.driver != SUPPORTED_DRIVER {
            bail!(
                "Unsupported database driver {:?}, only {SUPPORTED_DRIVER:?} is available",
                self.database.driver
            );
        }
        if self.database.connection.trim().is_empty() {
            bail!("Database connection string is empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(json.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn load_full_config() {
        let tmp = write_config(
            r#"{
                "jmdict": "/data/JMdict_e",
                "kanjidic2": "/data/kanjidic2.xml",
                "database": {"driver": "sqlite3", "connect": "/var/lib/jmdict.db"},
                "server": {"port": 8080}
            }"#,
        );
        let config = InstallConfig::load(tmp.path()).unwrap();
        assert_eq!(config.lexicon_file, "/data/JMdict_e");
        assert_eq!(config.kanjidic_file, "/data/kanjidic2.xml");
        assert_eq!(config.database.connection, "/var/lib/jmdict.db");
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let tmp = write_config(r#"{"jmdict": "other.xml"}"#);
        let config = InstallConfig::load(tmp.path()).unwrap();
        assert_eq!(config.lexicon_file, "other.xml");
        assert_eq!(config.kanjidic_file, DEFAULT_KANJIDIC_FILE);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn rejects_unsupported_driver() {
        let tmp = write_config(r#"{"database": {"driver": "mysql", "connect": "x"}}"#);
        let err = InstallConfig::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported database driver"));
    }

    #[test]
    fn rejects_invalid_json() {
        let tmp = write_config("{not json");
        let err = InstallConfig::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = InstallConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.json"));
    }
}
