//! Source Reader - turns one utility export into a uniform raw table
//!
//! Responsibilities:
//! - Decode the file (UTF-8 or UTF-16LE, BOM tolerant)
//! - Split records with the recipe's delimiter
//! - Collapse single or multi-level headers into flat column names
//! - Recover the side-channel label row when the recipe asks for it
//!
//! No numeric interpretation happens here; every cell stays text.

use crate::error::{IngestError, IngestResult};
use crate::sources::{HeaderShape, SourceRecipe, TextEncoding, HEADER_SEPARATOR};
use encoding_rs::{Encoding, UTF_16LE, UTF_8};
use std::path::Path;
use tracing::{debug, warn};

/// Header fragments spreadsheet tools emit for unlabeled (merged) cells.
const PLACEHOLDER_PREFIX: &str = "Unnamed";

/// One parsed export: flat column names plus text rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSourceTable {
    pub source_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Label text from the recovered label row, paired with the column index
    /// it sits above. Empty unless the recipe has a label row.
    pub labels: Vec<(String, usize)>,
}

impl RawSourceTable {
    /// Cell text, or "" when a short record did not reach this column.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn encoding_for(encoding: TextEncoding) -> &'static Encoding {
    match encoding {
        TextEncoding::Utf8 => UTF_8,
        TextEncoding::Utf16Le => UTF_16LE,
    }
}

/// Decode raw bytes. A leading BOM is honoured and removed; malformed
/// sequences become U+FFFD and are reported once.
pub fn decode(bytes: &[u8], encoding: TextEncoding, source_name: &str) -> String {
    let (text, used, had_errors) = encoding_for(encoding).decode(bytes);
    if had_errors {
        warn!(source = source_name, encoding = used.name(), "malformed bytes replaced while decoding");
    }
    text.into_owned()
}

/// Split decoded text into records. Blank lines are skipped and records may
/// have differing lengths.
pub fn read_records(text: &str, delimiter: u8) -> IngestResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        records.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(records)
}

fn is_placeholder(fragment: &str) -> bool {
    fragment.is_empty() || fragment.starts_with(PLACEHOLDER_PREFIX)
}

/// Flat name of column `col` given the header records that describe it.
fn flatten_header(levels: &[&Vec<String>], col: usize) -> String {
    let fragments: Vec<&str> = levels
        .iter()
        .map(|level| level.get(col).map(|s| s.trim()).unwrap_or(""))
        .filter(|fragment| !is_placeholder(fragment))
        .collect();
    fragments.join(HEADER_SEPARATOR)
}

/// Pair each non-blank label with the column below it. A label that repeats
/// keeps its first position but points at the last column carrying it.
fn label_table(label_record: &[String], width: usize) -> Vec<(String, usize)> {
    let mut labels: Vec<(String, usize)> = Vec::new();
    for (idx, value) in label_record.iter().enumerate().take(width) {
        let label = value.trim();
        if label.is_empty() {
            continue;
        }
        match labels.iter_mut().find(|(existing, _)| existing == label) {
            Some(entry) => entry.1 = idx,
            None => labels.push((label.to_string(), idx)),
        }
    }
    labels
}

/// Build a raw table from already split records.
pub fn table_from_records(
    recipe: &SourceRecipe,
    records: Vec<Vec<String>>,
) -> IngestResult<RawSourceTable> {
    let data_start = recipe.header.data_start();
    if records.len() < data_start {
        return Err(IngestError::HeaderParseFailure {
            source_name: recipe.file_name.to_string(),
            detail: format!(
                "header needs {} records, file has {}",
                data_start,
                records.len()
            ),
        });
    }

    let header_rows: Vec<usize> = match recipe.header {
        HeaderShape::Row(row) => vec![row],
        HeaderShape::Levels(rows) => rows.to_vec(),
    };
    let levels: Vec<&Vec<String>> = header_rows.iter().map(|&r| &records[r]).collect();
    let width = levels.iter().map(|level| level.len()).max().unwrap_or(0);

    let columns: Vec<String> = match recipe.header {
        HeaderShape::Row(_) => (0..width)
            .map(|col| levels[0].get(col).map(|s| s.trim().to_string()).unwrap_or_default())
            .collect(),
        HeaderShape::Levels(_) => (0..width).map(|col| flatten_header(&levels, col)).collect(),
    };

    if columns.iter().all(|c| c.is_empty()) {
        return Err(IngestError::HeaderParseFailure {
            source_name: recipe.file_name.to_string(),
            detail: "header records carry no column names".to_string(),
        });
    }

    let labels = match recipe.label_row {
        Some(label_row) if label_row.row < label_row.scan_records.min(records.len()) => {
            label_table(&records[label_row.row], width)
        }
        Some(label_row) => {
            warn!(
                source = recipe.file_name,
                row = label_row.row,
                "label row not present in leading records"
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let mut overlong = 0usize;
    let rows: Vec<Vec<String>> = records
        .into_iter()
        .skip(data_start)
        .map(|mut record| {
            if record.len() > width {
                overlong += 1;
            }
            record.resize(width, String::new());
            record
        })
        .collect();

    if overlong > 0 {
        warn!(
            source = recipe.file_name,
            rows = overlong,
            "records wider than header; extra cells ignored"
        );
    }

    debug!(
        source = recipe.file_name,
        columns = columns.len(),
        rows = rows.len(),
        labels = labels.len(),
        "parsed raw table"
    );

    Ok(RawSourceTable {
        source_name: recipe.file_name.to_string(),
        columns,
        rows,
        labels,
    })
}

/// Read and parse one configured source from `data_dir`.
pub fn read_source(data_dir: &Path, recipe: &SourceRecipe) -> IngestResult<RawSourceTable> {
    let path = data_dir.join(recipe.file_name);
    if !path.exists() {
        return Err(IngestError::SourceUnavailable(path));
    }

    let bytes = std::fs::read(&path).map_err(|e| IngestError::io(&path, e))?;
    let text = decode(&bytes, recipe.encoding, recipe.file_name);
    let records = read_records(&text, recipe.delimiter).map_err(|e| {
        IngestError::HeaderParseFailure {
            source_name: recipe.file_name.to_string(),
            detail: e.to_string(),
        }
    })?;
    table_from_records(recipe, records)
}
