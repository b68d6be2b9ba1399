//! Row types flowing out of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First and last valid 15-minute block of a day.
pub const FIRST_BLOCK: u8 = 1;
pub const LAST_BLOCK: u8 = 96;

pub fn is_valid_block(block: i64) -> bool {
    (FIRST_BLOCK as i64..=LAST_BLOCK as i64).contains(&block)
}

/// Which kind of utility file a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    State,
    Central,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::State => "State",
            Category::Central => "Central",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "State" => Ok(Category::State),
            "Central" => Ok(Category::Central),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// One (source, plant, time block) row after classification and summing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFactRow {
    pub time_block: u8,
    pub time_desc: String,
    pub plant_name: String,
    pub plant_type: String,
    pub category: Category,
    pub dc_mw: f64,
    pub sg_mw: f64,
    pub bid_price_mwh: f64,
}

/// Final reconciled row, unique on (time_block, plant_name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub time_block: u8,
    pub time_desc: String,
    pub plant_name: String,
    pub plant_type: String,
    pub category: Category,
    pub dc_mw: f64,
    pub sg_mw: f64,
    pub bid_price_mwh: f64,
}

impl From<SourceFactRow> for FactRow {
    fn from(row: SourceFactRow) -> Self {
        FactRow {
            time_block: row.time_block,
            time_desc: row.time_desc,
            plant_name: row.plant_name,
            plant_type: row.plant_type,
            category: row.category,
            dc_mw: row.dc_mw,
            sg_mw: row.sg_mw,
            bid_price_mwh: row.bid_price_mwh,
        }
    }
}
