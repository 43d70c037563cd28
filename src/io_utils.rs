//! I/O utilities for reading delimited exports into [`Table`]s.
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Shape checks**: blank headers are dropped, cells are trimmed and rows
//!   without any value are skipped, the minimum a spreadsheet export needs
//!   before it can be merged.

use std::{collections::BTreeMap, collections::HashSet, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::source::Table;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn parse_delimiter(value: &str) -> Result<u8> {
    match value.trim() {
        "tab" | "\\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        "semicolon" => Ok(b';'),
        "pipe" => Ok(b'|'),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => Err(anyhow!("Unsupported delimiter '{other}'")),
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a delimited export into a table of trimmed string cells.
pub fn read_table<R: Read>(
    input: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Table> {
    let mut reader = open_csv_reader(input, delimiter);
    let raw_headers = reader.byte_headers().context("Reading header row")?.clone();
    let headers = decode_record(&raw_headers, encoding)?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let valid = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty() && seen.insert(h.to_string()))
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    if valid.is_empty() {
        return Ok(Table::default());
    }

    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        let mut row = BTreeMap::new();
        let mut has_data = false;
        for &idx in &valid {
            let value = decoded.get(idx).map(|v| v.trim()).unwrap_or("");
            has_data |= !value.is_empty();
            row.insert(headers[idx].clone(), value.to_string());
        }
        if has_data {
            rows.push(row);
        }
    }

    Ok(Table {
        columns: valid.into_iter().map(|idx| headers[idx].clone()).collect(),
        rows,
    })
}
