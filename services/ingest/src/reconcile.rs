//! Cross-Source Reconciler
//!
//! Collapses source rows into exactly one fact per (time_block, plant_name):
//! - time_desc / plant_type / category: first seen (source order matters)
//! - dc_mw / sg_mw: summed
//! - bid_price_mwh: maximum

use crate::model::{FactRow, SourceFactRow};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Reconciler {
    groups: BTreeMap<(u8, String), FactRow>,
    input_rows: usize,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut row: SourceFactRow) {
        self.input_rows += 1;
        row.plant_name = row.plant_name.trim().to_string();
        let key = (row.time_block, row.plant_name.clone());

        match self.groups.get_mut(&key) {
            Some(fact) => {
                fact.dc_mw += row.dc_mw;
                fact.sg_mw += row.sg_mw;
                fact.bid_price_mwh = fact.bid_price_mwh.max(row.bid_price_mwh);
            }
            None => {
                self.groups.insert(key, FactRow::from(row));
            }
        }
    }

    pub fn input_rows(&self) -> usize {
        self.input_rows
    }

    /// Facts ordered by (time_block, plant_name).
    pub fn finish(self) -> Vec<FactRow> {
        self.groups.into_values().collect()
    }
}

impl Extend<SourceFactRow> for Reconciler {
    fn extend<I: IntoIterator<Item = SourceFactRow>>(&mut self, iter: I) {
        for row in iter {
            self.push(row);
        }
    }
}

pub fn reconcile(rows: impl IntoIterator<Item = SourceFactRow>) -> Vec<FactRow> {
    let mut reconciler = Reconciler::new();
    reconciler.extend(rows);
    reconciler.finish()
}
