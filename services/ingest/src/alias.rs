//! Alias Resolver
//!
//! Finds the raw columns of a source that belong to a canonical plant. A
//! column is a candidate when any alias is a literal substring of its name.
//! Label-table hits (side-channel utility labels) compare case-insensitively.
//! One column may be claimed by several plants; that is left to the
//! classifier and is not resolved here.

use crate::reader::RawSourceTable;
use crate::sources::Suppression;
use std::collections::BTreeSet;

/// Candidate columns for one (source, plant) pair, as column indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    /// Columns whose header contains an alias.
    pub textual: BTreeSet<usize>,
    /// Columns whose label-row text contains an alias.
    pub labelled: BTreeSet<usize>,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.textual.is_empty() && self.labelled.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Suppressed(Suppression),
    Matched(Candidates),
}

#[derive(Debug, Clone)]
pub struct AliasResolver {
    suppressions: Vec<Suppression>,
}

impl AliasResolver {
    pub fn new(suppressions: &[Suppression]) -> Self {
        AliasResolver {
            suppressions: suppressions.to_vec(),
        }
    }

    pub fn suppression(&self, source: &str, plant: &str) -> Option<&Suppression> {
        self.suppressions
            .iter()
            .find(|s| s.source == source && s.plant == plant)
    }

    pub fn resolve(&self, table: &RawSourceTable, plant: &str, aliases: &[String]) -> Resolution {
        if let Some(suppression) = self.suppression(&table.source_name, plant) {
            return Resolution::Suppressed(*suppression);
        }

        let mut candidates = Candidates::default();
        for alias in aliases {
            for (idx, column) in table.columns.iter().enumerate() {
                if column.contains(alias.as_str()) {
                    candidates.textual.insert(idx);
                }
            }

            let alias_upper = alias.to_uppercase();
            for (label, idx) in &table.labels {
                if label.to_uppercase().contains(&alias_upper) {
                    candidates.labelled.insert(*idx);
                }
            }
        }
        Resolution::Matched(candidates)
    }
}
