use crate::mapper::Table;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters collected during one install run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallStats {
    pub records: u64,
    pub rows: u64,
    pub tables: BTreeMap<&'static str, u64>,
}

impl InstallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_records(&mut self) {
        self.records += 1;
    }

    pub fn inc_rows(&mut self, table: Table) {
        self.rows += 1;
        *self.tables.entry(table.name()).or_insert(0) += 1;
    }

    pub fn rows_in(&self, table: Table) -> u64 {
        self.tables.get(table.name()).copied().unwrap_or(0)
    }

    /// Most populated tables first.
    pub fn busiest(&self, limit: usize) -> Vec<(&'static str, u64)> {
        let mut tables: Vec<_> = self.tables.iter().map(|(k, v)| (*k, *v)).collect();
        tables.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        tables.truncate(limit);
        tables
    }
}
