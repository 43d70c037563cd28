//! Table sources: one fetched table per sheet.
//!
//! The merge engine only sees the [`TableSource`] trait. [`CsvFileSource`]
//! reads a local export; [`RetryingSource`] wraps any source with
//! exponential backoff so transient failures are retried before a source is
//! reported unavailable.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    io_utils,
    label::{find_identifier_header, normalize_identifier},
};

/// One fetched sheet: ordered headers plus rows keyed by header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
}

impl Table {
    pub fn identifier_column(&self) -> Option<&String> {
        find_identifier_header(&self.columns)
    }

    /// First row whose identifier matches after normalization.
    pub fn find_row(&self, identifier: &str) -> Option<&BTreeMap<String, String>> {
        let column = self.identifier_column()?;
        let wanted = normalize_identifier(identifier);
        self.rows.iter().find(|row| {
            row.get(column)
                .is_some_and(|value| normalize_identifier(value) == wanted)
        })
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{name}' is not a readable table: {source}")]
    Format {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("'{name}' has no register/roll number column")]
    MissingIdentifier { name: String },
}

impl SourceError {
    /// Whether another attempt could plausibly succeed. A malformed sheet
    /// reads the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Io { .. })
    }
}

#[async_trait]
pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Table, SourceError>;
}

#[async_trait]
impl<S: TableSource + ?Sized> TableSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<Table, SourceError> {
        (**self).fetch().await
    }
}

#[derive(Debug, Clone)]
pub struct CsvFileSource {
    name: String,
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            delimiter: io_utils::resolve_input_delimiter(&path, None),
            path,
            encoding: UTF_8,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[async_trait]
impl TableSource for CsvFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Table, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                name: self.name.clone(),
                source,
            })?;
        let table = io_utils::read_table(bytes.as_slice(), self.delimiter, self.encoding)
            .map_err(|source| SourceError::Format {
                name: self.name.clone(),
                source,
            })?;
        debug!(
            "Read {} row(s) across {} column(s) from {:?}",
            table.rows.len(),
            table.columns.len(),
            self.path
        );
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: TableSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: TableSource> TableSource for RetryingSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self) -> Result<Table, SourceError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch().await {
                Ok(table) => return Ok(table),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        "Fetching '{}' failed ({err}); retrying in {} ms",
                        self.inner.name(),
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
