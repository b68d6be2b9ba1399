//! Canonical plant identity: the master merit-order registry and the curated
//! alias mapping. Both are loaded once per run and never change afterwards;
//! failing to load either one is fatal.

use crate::error::{IngestError, IngestResult};
use crate::reader::{decode, read_records};
use crate::sources::TextEncoding;
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

const PLANT_COLUMN: &str = "Plant Name";
const TYPE_COLUMN: &str = "Type";
const PRICE_COLUMNS: &[&str] = &["Variable Cost", "Bid Price"];
const MERIT_COLUMN: &str = "Merit/Must";
const MERIT_VALUE: &str = "merit";
const PER_KWH_MARKER: &str = "RS/KWH";
const UNKNOWN_TYPE: &str = "Unknown";

/// One canonical plant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantRegistryEntry {
    pub name: String,
    pub declared_type: String,
    pub bid_price_per_mwh: f64,
    pub merit: bool,
}

impl PlantRegistryEntry {
    /// Stand-in used when a mapped plant is missing from the registry.
    pub fn unknown(name: &str) -> Self {
        PlantRegistryEntry {
            name: name.to_string(),
            declared_type: UNKNOWN_TYPE.to_string(),
            bid_price_per_mwh: 0.0,
            merit: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlantRegistry {
    entries: Vec<PlantRegistryEntry>,
    index: HashMap<String, usize>,
}

fn find_header(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.contains(c)))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Price cell to Rs/MWh. Blank, non-numeric or negative prices become 0.0.
fn parse_price(value: &str, per_kwh: bool, plant: &str) -> f64 {
    let cleaned = value.trim().replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => {
            if per_kwh {
                price * 1000.0
            } else {
                price
            }
        }
        _ => {
            warn!(plant, value, "unusable registry price, using 0");
            0.0
        }
    }
}

impl PlantRegistry {
    /// Read the registry from a spreadsheet (first sheet) or a CSV export.
    pub fn load(path: &Path) -> IngestResult<Self> {
        if !path.exists() {
            return Err(IngestError::Registry(format!(
                "registry file not found: {}",
                path.display()
            )));
        }

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));

        let grid: Vec<Vec<String>> = if is_csv {
            let bytes = std::fs::read(path).map_err(|e| IngestError::io(path, e))?;
            let text = decode(&bytes, TextEncoding::Utf8, "registry");
            read_records(&text, b',')
                .map_err(|e| IngestError::Registry(e.to_string()))?
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.trim().to_string()).collect())
                .collect()
        } else {
            let mut workbook = open_workbook_auto(path)
                .map_err(|e| IngestError::Registry(format!("cannot open workbook: {}", e)))?;
            let sheet_names = workbook.sheet_names().to_vec();
            let sheet = sheet_names
                .first()
                .ok_or_else(|| IngestError::Registry("workbook has no sheets".to_string()))?;
            let range = workbook
                .worksheet_range(sheet)
                .map_err(|e| IngestError::Registry(format!("cannot read sheet '{}': {}", sheet, e)))?;
            range
                .rows()
                .map(|row| row.iter().map(cell_text).collect())
                .collect()
        };

        let registry = Self::from_grid(grid)?;
        info!(
            path = %path.display(),
            plants = registry.len(),
            merit = registry.merit_plants().count(),
            "registry loaded"
        );
        Ok(registry)
    }

    /// Build from a header row followed by data rows.
    pub fn from_grid(grid: Vec<Vec<String>>) -> IngestResult<Self> {
        let mut rows = grid.into_iter();
        let headers = rows
            .next()
            .ok_or_else(|| IngestError::Registry("registry is empty".to_string()))?;

        let plant_col = find_header(&headers, &[PLANT_COLUMN]).ok_or_else(|| {
            IngestError::Registry(format!("no '{}' column in {:?}", PLANT_COLUMN, headers))
        })?;
        let price_col = find_header(&headers, PRICE_COLUMNS).ok_or_else(|| {
            IngestError::Registry(format!("no price column ({:?}) in {:?}", PRICE_COLUMNS, headers))
        })?;
        let type_col = find_header(&headers, &[TYPE_COLUMN]);
        let merit_col = find_header(&headers, &[MERIT_COLUMN]);
        if merit_col.is_none() {
            warn!("registry has no '{}' column; no plant is treated as merit", MERIT_COLUMN);
        }

        let per_kwh = headers[price_col].to_uppercase().contains(PER_KWH_MARKER);

        let mut registry = PlantRegistry::default();
        for row in rows {
            let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");
            let name = cell(plant_col);
            if name.is_empty() {
                continue;
            }
            if registry.index.contains_key(name) {
                warn!(plant = name, "duplicate registry row ignored");
                continue;
            }

            let declared_type = match type_col.map(cell) {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => UNKNOWN_TYPE.to_string(),
            };
            let merit = merit_col
                .map(|col| cell(col).eq_ignore_ascii_case(MERIT_VALUE))
                .unwrap_or(false);

            let entry = PlantRegistryEntry {
                name: name.to_string(),
                declared_type,
                bid_price_per_mwh: parse_price(cell(price_col), per_kwh, name),
                merit,
            };
            registry.index.insert(entry.name.clone(), registry.entries.len());
            registry.entries.push(entry);
        }

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&PlantRegistryEntry> {
        self.index.get(name.trim()).map(|&idx| &self.entries[idx])
    }

    pub fn lookup(&self, name: &str) -> IngestResult<&PlantRegistryEntry> {
        self.get(name)
            .ok_or_else(|| IngestError::RegistryLookupMiss(name.to_string()))
    }

    pub fn merit_plants(&self) -> impl Iterator<Item = &PlantRegistryEntry> {
        self.entries.iter().filter(|e| e.merit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical plant name -> ordered alias substrings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasMapping {
    plants: BTreeMap<String, Vec<String>>,
}

impl AliasMapping {
    pub fn load(path: &Path) -> IngestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::AliasMapping(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mapping = Self::from_json(&content)?;
        info!(path = %path.display(), plants = mapping.len(), "alias mapping loaded");
        Ok(mapping)
    }

    pub fn from_json(content: &str) -> IngestResult<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(content)
            .map_err(|e| IngestError::AliasMapping(e.to_string()))?;

        let mut plants = BTreeMap::new();
        for (name, aliases) in raw {
            let name = name.trim().to_string();
            let total = aliases.len();
            // An empty alias is a substring of every column.
            let kept: Vec<String> = aliases
                .into_iter()
                .filter(|alias| !alias.trim().is_empty())
                .collect();
            if kept.len() < total {
                warn!(plant = %name, dropped = total - kept.len(), "blank aliases discarded");
            }
            plants.entry(name).or_insert_with(Vec::new).extend(kept);
        }
        Ok(AliasMapping { plants })
    }

    pub fn aliases(&self, plant: &str) -> &[String] {
        self.plants.get(plant).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Plants in name order with their aliases.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.plants.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn has_aliases(&self, plant: &str) -> bool {
        !self.aliases(plant).is_empty()
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }
}
