//! Merge N table sources into one table keyed by student identifier.
//!
//! Every fetch in a batch is launched together and awaited until all have
//! settled. Successful tables are then folded in source configuration order,
//! so a field present in several sources always ends up with the value from
//! the last configured one. A batch fails only when no source succeeded.

use std::collections::{BTreeMap, HashSet};

use futures::future::join_all;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    label::{coerce_number, find_department_header, normalize_identifier, normalize_label},
    source::{SourceError, Table, TableSource},
};

/// Fields of one student, keyed by normalized column label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub fields: BTreeMap<String, String>,
}

impl StudentRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(&normalize_label(column)).map(String::as_str)
    }

    /// Numeric value of a column, zero when absent or non-numeric.
    pub fn number(&self, column: &str) -> f64 {
        self.get(column).map(coerce_number).unwrap_or(0.0)
    }

    fn absorb(&mut self, row: &BTreeMap<String, String>) {
        for (column, value) in row {
            self.fields.insert(normalize_label(column), value.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<String, StudentRecord>,
}

impl MergedTable {
    pub fn student(&self, identifier: &str) -> Option<&StudentRecord> {
        self.rows.get(&normalize_identifier(identifier))
    }

    pub fn department_column(&self) -> Option<&String> {
        find_department_header(&self.columns)
    }

    /// Distinct non-empty departments, sorted.
    pub fn departments(&self) -> Vec<String> {
        let Some(column) = self.department_column() else {
            return Vec::new();
        };
        self.rows
            .values()
            .filter_map(|r| r.get(column))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unique()
            .sorted()
            .map(str::to_string)
            .collect()
    }

    /// Same columns, only the rows of one department.
    pub fn restrict_to_department(&self, department: &str) -> MergedTable {
        let Some(column) = self.department_column() else {
            return MergedTable {
                columns: self.columns.clone(),
                rows: BTreeMap::new(),
            };
        };
        let wanted = department.trim();
        MergedTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|(_, record)| record.get(column).map(str::trim) == Some(wanted))
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
        }
    }

    fn add_columns(&mut self, columns: &[String], seen: &mut HashSet<String>) {
        for column in columns {
            if seen.insert(normalize_label(column)) {
                self.columns.push(column.clone());
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no data for this scope: all {} source(s) failed to load", .failures.len())]
    BatchUnavailable { failures: Vec<SourceError> },
}

/// A successful fetch, tagged with the source it came from.
#[derive(Debug, Clone)]
pub struct FetchedTable {
    pub source: String,
    pub table: Table,
}

/// Fetches every source concurrently and keeps the usable tables in source
/// order. A table without an identifier column counts as a failed source.
pub async fn fetch_batch<S>(sources: &[S]) -> Result<Vec<FetchedTable>, MergeError>
where
    S: TableSource,
{
    let settled = join_all(sources.iter().map(|source| source.fetch())).await;

    let mut fetched = Vec::new();
    let mut failures = Vec::new();
    for (source, outcome) in sources.iter().zip(settled) {
        let result = outcome.and_then(|table| {
            if table.identifier_column().is_some() {
                Ok(table)
            } else {
                Err(SourceError::MissingIdentifier {
                    name: source.name().to_string(),
                })
            }
        });
        match result {
            Ok(table) => fetched.push(FetchedTable {
                source: source.name().to_string(),
                table,
            }),
            Err(err) => {
                warn!("Skipping source '{}': {err}", source.name());
                failures.push(err);
            }
        }
    }

    if fetched.is_empty() {
        return Err(MergeError::BatchUnavailable { failures });
    }
    info!(
        "Loaded {} of {} source(s)",
        fetched.len(),
        fetched.len() + failures.len()
    );
    Ok(fetched)
}

/// Folds tables into one, later tables overwriting earlier fields.
pub fn merge_tables<'a, I>(tables: I) -> MergedTable
where
    I: IntoIterator<Item = &'a Table>,
{
    let mut merged = MergedTable::default();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for table in tables {
        merged.add_columns(&table.columns, &mut seen);
        let Some(id_column) = table.identifier_column() else {
            continue;
        };
        for row in &table.rows {
            let identifier = row
                .get(id_column)
                .map(|v| normalize_identifier(v))
                .unwrap_or_default();
            if identifier.is_empty() {
                skipped += 1;
                continue;
            }
            merged.rows.entry(identifier).or_default().absorb(row);
        }
    }

    debug!(
        "Merged {} student(s) across {} column(s); skipped {} row(s) without identifier",
        merged.rows.len(),
        merged.columns.len(),
        skipped
    );
    merged
}

pub async fn merge<S>(sources: &[S]) -> Result<MergedTable, MergeError>
where
    S: TableSource,
{
    let fetched = fetch_batch(sources).await?;
    Ok(merge_tables(fetched.iter().map(|f| &f.table)))
}
