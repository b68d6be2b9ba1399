//! Per-source parsing recipes and DC/SG rule tables.
//!
//! Everything here is data. Adding a utility export means adding a
//! `SourceRecipe` (and, if its column wording is new, a rule table), not
//! touching the reader or classifier.

use crate::model::Category;

/// Separator used when collapsing multi-level headers into one name.
pub const HEADER_SEPARATOR: &str = " | ";

/// How the header of a CSV export is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    /// One header line at this record index; earlier records are preamble.
    Row(usize),
    /// Several consecutive records forming a multi-level header.
    Levels(&'static [usize]),
}

impl HeaderShape {
    /// Index of the first data record.
    pub fn data_start(&self) -> usize {
        match self {
            HeaderShape::Row(row) => row + 1,
            HeaderShape::Levels(rows) => rows.iter().max().map_or(0, |last| last + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
}

/// A raw record, above the parsed header, that labels columns by utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRow {
    /// How many leading records the secondary read looks at.
    pub scan_records: usize,
    /// Which of those records carries the labels.
    pub row: usize,
}

/// Target measure of a matched column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Dc,
    Sg,
}

/// Textual test applied to a column name that already matched a plant alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Contains(&'static str),
    ContainsAll(&'static [&'static str]),
    /// The last `HEADER_SEPARATOR` segment equals this text.
    LastSegment(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierRule {
    pub marker: Marker,
    pub field: Field,
}

/// Ordered rules for one source format; the first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    pub name: &'static str,
    pub rules: &'static [ClassifierRule],
    /// SG columns come from the recovered label row, never from the name.
    pub sg_from_labels: bool,
}

pub const ENTITLEMENT_RULES: RuleSet = RuleSet {
    name: "entitlement",
    rules: &[
        ClassifierRule {
            marker: Marker::ContainsAll(&["Final Ent Amount", "Onbar"]),
            field: Field::Dc,
        },
        ClassifierRule {
            marker: Marker::Contains("Schedule Amount"),
            field: Field::Sg,
        },
    ],
    sg_from_labels: false,
};

pub const TOTAL_ENT_RULES: RuleSet = RuleSet {
    name: "total-ent",
    rules: &[ClassifierRule {
        marker: Marker::LastSegment("Total Ent"),
        field: Field::Dc,
    }],
    sg_from_labels: false,
};

pub const GENERIC_RULES: RuleSet = RuleSet {
    name: "generic",
    rules: &[
        ClassifierRule {
            marker: Marker::Contains("DC/"),
            field: Field::Dc,
        },
        ClassifierRule {
            marker: Marker::Contains("SG"),
            field: Field::Sg,
        },
    ],
    sg_from_labels: false,
};

pub const LABEL_SG_RULES: RuleSet = RuleSet {
    name: "label-sg",
    rules: &[ClassifierRule {
        marker: Marker::Contains("DC/"),
        field: Field::Dc,
    }],
    sg_from_labels: true,
};

/// Everything needed to turn one export into source fact rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecipe {
    pub file_name: &'static str,
    pub header: HeaderShape,
    pub encoding: TextEncoding,
    pub delimiter: u8,
    pub label_row: Option<LabelRow>,
    pub category: Category,
    pub rules: RuleSet,
}

impl SourceRecipe {
    pub fn csv(file_name: &'static str, header: HeaderShape, category: Category) -> Self {
        SourceRecipe {
            file_name,
            header,
            encoding: TextEncoding::Utf8,
            delimiter: b',',
            label_row: None,
            category,
            rules: GENERIC_RULES,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_label_row(mut self, label_row: LabelRow) -> Self {
        self.label_row = Some(label_row);
        self
    }
}

/// A (source, plant) pair that must never contribute, even on an alias hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suppression {
    pub source: &'static str,
    pub plant: &'static str,
    pub reason: &'static str,
}

/// Known duplicate listings.
pub const SUPPRESSIONS: &[Suppression] = &[Suppression {
    source: "ipp.csv",
    plant: "GHATAMPUR",
    reason: "duplicate of the central listing",
}];

/// The configured exports in processing order. Order decides first-seen
/// values during reconciliation, so it must stay stable.
pub fn default_sources() -> Vec<SourceRecipe> {
    vec![
        SourceRecipe::csv("entvsdl.csv", HeaderShape::Levels(&[0, 1, 2]), Category::Central)
            .with_rules(ENTITLEMENT_RULES),
        SourceRecipe::csv("ipp.csv", HeaderShape::Row(0), Category::State),
        SourceRecipe::csv("trader.csv", HeaderShape::Row(0), Category::Central),
        SourceRecipe::csv("uprvunl.csv", HeaderShape::Row(0), Category::State),
        SourceRecipe::csv("menukhdc.csv", HeaderShape::Levels(&[0, 1]), Category::Central)
            .with_encoding(TextEncoding::Utf16Le)
            .with_rules(TOTAL_ENT_RULES),
        SourceRecipe::csv("menukhsg.csv", HeaderShape::Row(6), Category::Central)
            .with_encoding(TextEncoding::Utf16Le)
            .with_rules(LABEL_SG_RULES)
            .with_label_row(LabelRow {
                scan_records: 5,
                row: 2,
            }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_start() {
        assert_eq!(HeaderShape::Row(0).data_start(), 1);
        assert_eq!(HeaderShape::Row(6).data_start(), 7);
        assert_eq!(HeaderShape::Levels(&[0, 1, 2]).data_start(), 3);
    }

    #[test]
    fn test_default_source_order_is_fixed() {
        let names: Vec<_> = default_sources().iter().map(|s| s.file_name).collect();
        assert_eq!(
            names,
            vec![
                "entvsdl.csv",
                "ipp.csv",
                "trader.csv",
                "uprvunl.csv",
                "menukhdc.csv",
                "menukhsg.csv"
            ]
        );
    }

    #[test]
    fn test_state_sources() {
        for recipe in default_sources() {
            let expected = matches!(recipe.file_name, "ipp.csv" | "uprvunl.csv");
            assert_eq!(recipe.category == Category::State, expected, "{}", recipe.file_name);
        }
    }

    #[test]
    fn test_only_label_source_takes_sg_from_labels() {
        for recipe in default_sources() {
            assert_eq!(recipe.rules.sg_from_labels, recipe.label_row.is_some());
        }
    }
}
