//! Time Key Extractor
//!
//! Finds the time-block and time-description columns of a raw table and
//! keeps only rows whose block is a valid 1..=96 index.

use crate::error::{IngestError, IngestResult};
use crate::model::is_valid_block;
use crate::reader::RawSourceTable;
use tracing::{debug, warn};

const BLOCK_MARKER: &str = "TIME BLOCK";
const BLOCK_MARKER_COMPACT: &str = "TIMEBLOCK";
const DESC_MARKER: &str = "TIME DESC";
const TIME_TOKEN: &str = "TIME";
const FIRST_RANGE: &str = "00:00-00:15";

/// Column positions of the two time keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeKeys {
    pub block_col: usize,
    pub desc_col: usize,
}

/// A data row that survived the time-key guard.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRow {
    /// Index into `RawSourceTable::rows`.
    pub row: usize,
    pub block: u8,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable {
    pub keys: TimeKeys,
    pub rows: Vec<KeyedRow>,
    pub dropped: usize,
}

fn is_block_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains(BLOCK_MARKER) || upper.replace(' ', "").contains(BLOCK_MARKER_COMPACT)
}

/// `HH:MM-HH:MM`, with optional spaces around the dash.
fn looks_like_time_range(value: &str) -> bool {
    fn clock(part: &str) -> bool {
        match part.trim().split_once(':') {
            Some((h, m)) => {
                (1..=2).contains(&h.len())
                    && m.len() == 2
                    && h.chars().all(|c| c.is_ascii_digit())
                    && m.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        }
    }
    value.contains(FIRST_RANGE)
        || value
            .trim()
            .split_once('-')
            .map_or(false, |(from, to)| clock(from) && clock(to))
}

fn find_desc_by_name(columns: &[String], block_col: Option<usize>) -> Option<usize> {
    let candidates = || {
        columns
            .iter()
            .enumerate()
            .filter(move |(idx, _)| Some(*idx) != block_col)
            .map(|(idx, name)| (idx, name.trim().to_uppercase()))
    };

    candidates()
        .find(|(_, upper)| upper.contains(DESC_MARKER))
        .or_else(|| candidates().find(|(_, upper)| upper == TIME_TOKEN))
        .or_else(|| candidates().find(|(_, upper)| upper.contains(TIME_TOKEN)))
        .map(|(idx, _)| idx)
}

/// Locate the time columns by header name, falling back to the first data
/// row when no header names the block column.
pub fn locate_time_columns(table: &RawSourceTable) -> IngestResult<TimeKeys> {
    let mut block_col = table.columns.iter().position(|c| is_block_name(c));
    let mut desc_col = find_desc_by_name(&table.columns, block_col);

    if block_col.is_none() {
        if let Some(first) = table.rows.first() {
            let mut scanned_desc = None;
            for (idx, value) in first.iter().enumerate() {
                let upper = value.to_uppercase();
                if upper.contains(BLOCK_MARKER) {
                    block_col.get_or_insert(idx);
                } else if upper.contains(DESC_MARKER) || looks_like_time_range(value) {
                    scanned_desc.get_or_insert(idx);
                }
            }
            if scanned_desc.is_some() {
                desc_col = scanned_desc;
            }
            debug!(
                source = %table.source_name,
                ?block_col,
                ?desc_col,
                "time columns taken from first data row"
            );
        }
    }

    let block_col = match block_col {
        Some(col) => col,
        None => return Err(IngestError::TimeKeyNotFound(table.source_name.clone())),
    };

    let desc_col = match desc_col {
        Some(col) => col,
        None => {
            // No separate description column: allow the block column itself.
            let col = find_desc_by_name(&table.columns, None).unwrap_or(block_col);
            warn!(
                source = %table.source_name,
                desc_col = col,
                "no time description column; reusing {:?}",
                table.columns.get(col)
            );
            col
        }
    };

    Ok(TimeKeys {
        block_col,
        desc_col,
    })
}

/// Parse a block cell. Fractional values truncate; anything outside
/// 1..=96 or unparseable yields `None`.
pub fn parse_block(value: &str) -> Option<u8> {
    let parsed: f64 = value.trim().parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    let block = parsed.trunc() as i64;
    if is_valid_block(block) {
        Some(block as u8)
    } else {
        None
    }
}

/// Locate the keys and keep every row with a valid block.
pub fn extract_time_keys(table: &RawSourceTable) -> IngestResult<KeyedTable> {
    let keys = locate_time_columns(table)?;
    let mut rows = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for idx in 0..table.rows.len() {
        let block_text = table.cell(idx, keys.block_col);

        // A restated header row directly under the real header.
        if idx == 0 && block_text.to_uppercase().contains(BLOCK_MARKER) {
            dropped += 1;
            continue;
        }

        match parse_block(block_text) {
            Some(block) => rows.push(KeyedRow {
                row: idx,
                block,
                desc: table.cell(idx, keys.desc_col).trim().to_string(),
            }),
            None => dropped += 1,
        }
    }

    debug!(
        source = %table.source_name,
        kept = rows.len(),
        dropped,
        "time keys extracted"
    );

    Ok(KeyedTable {
        keys,
        rows,
        dropped,
    })
}
