//! Column Classifier
//!
//! Splits a plant's candidate columns into DC and SG sets using the
//! source's rule table (see `sources`). Rules are tried in order and the
//! first hit decides; a column no rule claims is ignored.

use crate::alias::Candidates;
use crate::sources::{Field, Marker, RuleSet, HEADER_SEPARATOR};
use std::collections::BTreeSet;

impl Marker {
    pub fn matches(&self, column: &str) -> bool {
        match self {
            Marker::Contains(text) => column.contains(text),
            Marker::ContainsAll(texts) => texts.iter().all(|t| column.contains(t)),
            Marker::LastSegment(text) => column
                .rsplit(HEADER_SEPARATOR)
                .next()
                .map_or(false, |last| last == *text),
        }
    }
}

impl RuleSet {
    /// Field assigned by the first matching rule.
    pub fn field_for(&self, column: &str) -> Option<Field> {
        self.rules
            .iter()
            .find(|rule| rule.marker.matches(column))
            .map(|rule| rule.field)
    }
}

/// Disjoint DC/SG column sets for one (source, plant) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub dc: BTreeSet<usize>,
    pub sg: BTreeSet<usize>,
}

impl Classified {
    pub fn is_empty(&self) -> bool {
        self.dc.is_empty() && self.sg.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnClassifier {
    rules: RuleSet,
}

impl ColumnClassifier {
    pub fn new(rules: RuleSet) -> Self {
        ColumnClassifier { rules }
    }

    pub fn classify(&self, columns: &[String], candidates: &Candidates) -> Classified {
        let mut classified = Classified::default();

        for &idx in &candidates.textual {
            let Some(name) = columns.get(idx) else {
                continue;
            };
            match self.rules.field_for(name) {
                Some(Field::Dc) => {
                    classified.dc.insert(idx);
                }
                Some(Field::Sg) if !self.rules.sg_from_labels => {
                    classified.sg.insert(idx);
                }
                _ => {}
            }
        }

        if self.rules.sg_from_labels {
            // Label provenance wins over any textual DC hit.
            for &idx in &candidates.labelled {
                classified.dc.remove(&idx);
                classified.sg.insert(idx);
            }
        }

        classified
    }
}
