//! Unit Aggregator
//!
//! Sums the matched DC and SG columns row by row. Multi-unit plants list one
//! column per unit, so a plant's value is the sum across its set.

use crate::classify::Classified;
use crate::error::{IngestError, IngestResult};
use crate::reader::RawSourceTable;
use std::collections::BTreeSet;

/// Drop thousands separators from a digit string like "1,250.5". Every
/// group after the first must be exactly three digits.
fn strip_thousands(value: &str) -> Option<String> {
    let (int_part, frac_part) = match value.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (value, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut groups = digits.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 || !first.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut cleaned = format!("{}{}", sign, first);
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        cleaned.push_str(group);
    }
    if let Some(frac) = frac_part {
        cleaned.push('.');
        cleaned.push_str(frac);
    }
    Some(cleaned)
}

/// Coerce one cell. Blank cells are null. One leading `+` and well-formed
/// thousands separators are accepted; anything else that is not a number
/// is an error.
pub fn coerce_cell(value: &str) -> IngestResult<Option<f64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let failure = || IngestError::NumericCoercionFailure(value.to_string());

    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.starts_with('+') {
        return Err(failure());
    }
    let cleaned = if unsigned.contains(',') {
        strip_thousands(unsigned).ok_or_else(failure)?
    } else {
        unsigned.to_string()
    };

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(failure()),
    }
}

/// Per-row DC and SG totals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnitSums {
    pub dc_mw: f64,
    pub sg_mw: f64,
}

/// Sums matched columns for one source, counting cells that failed coercion.
#[derive(Debug, Default)]
pub struct UnitAggregator {
    coercion_failures: usize,
}

impl UnitAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the numeric cells in `columns` for `row`. Null and failed cells
    /// are left out; an empty set or an all-null row sums to 0.0.
    pub fn sum(&mut self, table: &RawSourceTable, row: usize, columns: &BTreeSet<usize>) -> f64 {
        let mut total = 0.0;
        for &col in columns {
            match coerce_cell(table.cell(row, col)) {
                Ok(Some(v)) => total += v,
                Ok(None) => {}
                Err(_) => self.coercion_failures += 1,
            }
        }
        total
    }

    pub fn sums(&mut self, table: &RawSourceTable, row: usize, classified: &Classified) -> UnitSums {
        UnitSums {
            dc_mw: self.sum(table, row, &classified.dc),
            sg_mw: self.sum(table, row, &classified.sg),
        }
    }

    pub fn coercion_failures(&self) -> usize {
        self.coercion_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> RawSourceTable {
        let width = rows.first().map_or(0, |r| r.len());
        RawSourceTable {
            source_name: "t.csv".to_string(),
            columns: (0..width).map(|i| format!("c{}", i)).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            labels: Vec::new(),
        }
    }

    #[test]
    fn test_coerce_cell() {
        assert_eq!(coerce_cell("12.5").unwrap(), Some(12.5));
        assert_eq!(coerce_cell(" +120 ").unwrap(), Some(120.0));
        assert_eq!(coerce_cell("1,250").unwrap(), Some(1250.0));
        assert_eq!(coerce_cell("-3").unwrap(), Some(-3.0));
        assert_eq!(coerce_cell("").unwrap(), None);
        assert_eq!(coerce_cell("  ").unwrap(), None);
        assert!(matches!(
            coerce_cell("N/A"),
            Err(IngestError::NumericCoercionFailure(_))
        ));
        assert!(coerce_cell("inf").is_err());
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(coerce_cell("12,345,678").unwrap(), Some(12345678.0));
        assert_eq!(coerce_cell("-1,250.75").unwrap(), Some(-1250.75));
        assert_eq!(coerce_cell("+1,250").unwrap(), Some(1250.0));
    }

    #[test]
    fn test_misplaced_comma_or_sign_is_rejected() {
        for junk in ["12,5", "1,2345", ",125", "1,", "1+2", "++5", "12,5.0.1"] {
            assert!(
                matches!(coerce_cell(junk), Err(IngestError::NumericCoercionFailure(_))),
                "{} should not coerce",
                junk
            );
        }
    }

    #[test]
    fn test_malformed_cells_are_counted_not_summed() {
        let t = table(&[&["12,5", "1+2", "40"]]);
        let mut agg = UnitAggregator::new();
        assert_eq!(agg.sum(&t, 0, &BTreeSet::from([0, 1, 2])), 40.0);
        assert_eq!(agg.coercion_failures(), 2);
    }

    #[test]
    fn test_multi_unit_sum() {
        let t = table(&[&["100", "150.5", "7"]]);
        let mut agg = UnitAggregator::new();
        assert_eq!(agg.sum(&t, 0, &BTreeSet::from([0, 1])), 250.5);
    }

    #[test]
    fn test_non_numeric_cell_does_not_zero_the_row() {
        let t = table(&[&["N/A", "+120", "30"]]);
        let mut agg = UnitAggregator::new();
        assert_eq!(agg.sum(&t, 0, &BTreeSet::from([0, 1, 2])), 150.0);
        assert_eq!(agg.coercion_failures(), 1);
    }

    #[test]
    fn test_empty_set_and_null_row_are_zero() {
        let t = table(&[&["", ""]]);
        let mut agg = UnitAggregator::new();
        assert_eq!(agg.sum(&t, 0, &BTreeSet::new()), 0.0);
        assert_eq!(agg.sum(&t, 0, &BTreeSet::from([0, 1])), 0.0);
        assert_eq!(agg.coercion_failures(), 0);
    }

    #[test]
    fn test_sums_split_dc_and_sg() {
        let t = table(&[&["10", "4", "6"]]);
        let classified = Classified {
            dc: BTreeSet::from([0]),
            sg: BTreeSet::from([1, 2]),
        };
        let mut agg = UnitAggregator::new();
        assert_eq!(
            agg.sums(&t, 0, &classified),
            UnitSums { dc_mw: 10.0, sg_mw: 10.0 }
        );
    }
}
