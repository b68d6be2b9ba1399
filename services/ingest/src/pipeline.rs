//! Batch ingestion pipeline
//!
//! Source Reader -> Time Key Extractor -> (per plant) Alias Resolver ->
//! Column Classifier -> Unit Aggregator -> Cross-Source Reconciler.
//!
//! Sources are processed sequentially in configured order. A failing source
//! is skipped and reported; the run always produces whatever the remaining
//! sources yield.

use crate::aggregate::UnitAggregator;
use crate::alias::{AliasResolver, Resolution};
use crate::classify::ColumnClassifier;
use crate::error::IngestResult;
use crate::model::{FactRow, SourceFactRow};
use crate::reader::{read_source, RawSourceTable};
use crate::reconcile::Reconciler;
use crate::registry::{AliasMapping, PlantRegistry, PlantRegistryEntry};
use crate::report::{IngestReport, SourceSummary, SuppressedPair};
use crate::sources::{default_sources, SourceRecipe, Suppression, SUPPRESSIONS};
use crate::time_key::{extract_time_keys, KeyedTable};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

/// Immutable inputs of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub registry: PlantRegistry,
    pub aliases: AliasMapping,
    pub sources: Vec<SourceRecipe>,
    pub suppressions: Vec<Suppression>,
}

impl PipelineConfig {
    /// Load the registry and alias mapping and attach the compiled-in source
    /// recipes. Either file failing to load aborts the run.
    pub fn load(data_dir: &Path, registry_path: &Path, mapping_path: &Path) -> IngestResult<Self> {
        Ok(PipelineConfig {
            data_dir: data_dir.to_path_buf(),
            registry: PlantRegistry::load(registry_path)?,
            aliases: AliasMapping::load(mapping_path)?,
            sources: default_sources(),
            suppressions: SUPPRESSIONS.to_vec(),
        })
    }
}

/// Reconciled facts plus the audit report.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub facts: Vec<FactRow>,
    pub report: IngestReport,
}

/// Rows one source contributed before reconciliation.
#[derive(Debug, Clone)]
pub struct SourceRows {
    pub rows: Vec<SourceFactRow>,
    pub summary: SourceSummary,
    pub suppressed: Vec<SuppressedPair>,
}

pub struct Pipeline {
    config: PipelineConfig,
    resolver: AliasResolver,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let resolver = AliasResolver::new(&config.suppressions);
        Pipeline { config, resolver }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every configured source and reconcile. Never fails: per-source
    /// problems land in the report.
    pub fn run(&self) -> IngestOutcome {
        let mut report = IngestReport::default();
        let mut reconciler = Reconciler::new();
        let mut matched_plants: BTreeSet<String> = BTreeSet::new();

        report.registry_misses = self
            .config
            .aliases
            .iter()
            .filter(|(plant, _)| self.config.registry.get(plant).is_none())
            .map(|(plant, _)| plant.to_string())
            .collect();
        report.merit_without_alias = self
            .config
            .registry
            .merit_plants()
            .filter(|entry| !self.config.aliases.has_aliases(&entry.name))
            .map(|entry| entry.name.clone())
            .collect();

        for recipe in &self.config.sources {
            let span = info_span!("source", name = recipe.file_name);
            let _guard = span.enter();

            match self.process_source(recipe) {
                Ok(source_rows) => {
                    matched_plants.extend(source_rows.summary.plants_matched.iter().cloned());
                    report.suppressed.extend(source_rows.suppressed);
                    report.sources.push(source_rows.summary);
                    reconciler.extend(source_rows.rows);
                }
                Err(e) => report.skip(recipe.file_name, &e),
            }
        }

        report.unmatched_plants = self
            .config
            .aliases
            .iter()
            .filter(|(plant, aliases)| !aliases.is_empty() && !matched_plants.contains(*plant))
            .map(|(plant, _)| plant.to_string())
            .collect();

        report.source_rows = reconciler.input_rows();
        let facts = reconciler.finish();
        report.fact_rows = facts.len();

        info!(
            sources = report.sources.len(),
            skipped = report.skipped_sources.len(),
            facts = facts.len(),
            "pipeline finished"
        );
        IngestOutcome { facts, report }
    }

    /// Read one source and turn it into source fact rows.
    pub fn process_source(&self, recipe: &SourceRecipe) -> IngestResult<SourceRows> {
        let table = read_source(&self.config.data_dir, recipe)?;
        let keyed = extract_time_keys(&table)?;
        if keyed.rows.is_empty() {
            warn!(source = recipe.file_name, "no rows with a valid time block");
        }
        Ok(self.rows_for_table(recipe, &table, &keyed))
    }

    /// Per-plant resolution, classification and summing over a keyed table.
    pub fn rows_for_table(
        &self,
        recipe: &SourceRecipe,
        table: &RawSourceTable,
        keyed: &KeyedTable,
    ) -> SourceRows {
        let classifier = ColumnClassifier::new(recipe.rules);
        let mut aggregator = UnitAggregator::new();
        let mut rows = Vec::new();
        let mut plants_matched = Vec::new();
        let mut registry_misses = Vec::new();
        let mut suppressed = Vec::new();

        for (plant, aliases) in self.config.aliases.iter() {
            let candidates = match self.resolver.resolve(table, plant, aliases) {
                Resolution::Suppressed(s) => {
                    let hit = aliases
                        .iter()
                        .any(|alias| table.columns.iter().any(|c| c.contains(alias.as_str())));
                    if hit {
                        suppressed.push(SuppressedPair {
                            source: s.source.to_string(),
                            plant: s.plant.to_string(),
                            reason: s.reason.to_string(),
                        });
                    }
                    continue;
                }
                Resolution::Matched(candidates) => candidates,
            };

            let classified = classifier.classify(&table.columns, &candidates);
            if classified.is_empty() {
                continue;
            }

            let fallback;
            let entry = match self.config.registry.lookup(plant) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(
                        source = recipe.file_name,
                        plant,
                        kind = e.kind(),
                        "{}; using price 0 and type Unknown",
                        e
                    );
                    registry_misses.push(plant.to_string());
                    fallback = PlantRegistryEntry::unknown(plant);
                    &fallback
                }
            };

            debug!(
                source = recipe.file_name,
                plant,
                dc = ?classified.dc.iter().map(|&i| &table.columns[i]).collect::<Vec<_>>(),
                sg = ?classified.sg.iter().map(|&i| &table.columns[i]).collect::<Vec<_>>(),
                "columns classified"
            );

            for keyed_row in &keyed.rows {
                let sums = aggregator.sums(table, keyed_row.row, &classified);
                rows.push(SourceFactRow {
                    time_block: keyed_row.block,
                    time_desc: keyed_row.desc.clone(),
                    plant_name: plant.to_string(),
                    plant_type: entry.declared_type.clone(),
                    category: recipe.category,
                    dc_mw: sums.dc_mw,
                    sg_mw: sums.sg_mw,
                    bid_price_mwh: entry.bid_price_per_mwh,
                });
            }
            plants_matched.push(plant.to_string());
        }

        let summary = SourceSummary {
            source: recipe.file_name.to_string(),
            category: recipe.category,
            rows_read: table.rows.len(),
            rows_kept: keyed.rows.len(),
            rows_dropped: keyed.dropped,
            plants_matched,
            registry_misses,
            coercion_failures: aggregator.coercion_failures(),
        };

        SourceRows {
            rows,
            summary,
            suppressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::sources::{HeaderShape, LabelRow, TextEncoding, LABEL_SG_RULES};
    use std::collections::HashSet;
    use std::fs;

    const REGISTRY_CSV: &str = "Plant Name,Type,Merit/Must,Variable Cost (Rs/kWh)\n\
        MEJA,Thermal,Merit,2.5\n\
        GHATAMPUR,Thermal,Merit,3.1\n\
        ANPARA D,Thermal,Merit,1.9\n\
        OBRA,Thermal,Merit,2.0\n\
        RIHAND,Thermal,Must,1.2\n";

    const MAPPING_JSON: &str = r#"{
        "MEJA": ["MEJA", "Meja"],
        "GHATAMPUR": ["GHATAMPUR"],
        "ANPARA D": ["Anpara-D"],
        "RIHAND": ["RIHAND"],
        "TANDA": ["TANDA"]
    }"#;

    fn utf16(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(text.encode_utf16().flat_map(|u| u.to_le_bytes()));
        bytes
    }

    fn write_fixture(dir: &Path) {
        fs::write(dir.join("mod.csv"), REGISTRY_CSV).unwrap();
        fs::write(dir.join("plant_mappings.json"), MAPPING_JSON).unwrap();

        fs::write(
            dir.join("entvsdl.csv"),
            "Time Block,,RIHAND,RIHAND,MEJA\n\
             ,,Onbar,,Onbar\n\
             ,Time Desc,Final Ent Amount,Schedule Amount,Final Ent Amount\n\
             1,00:00-00:15,200,150,10\n\
             2,00:15-00:30,210,160,10\n\
             Total,,410,310,20\n",
        )
        .unwrap();

        fs::write(
            dir.join("ipp.csv"),
            "Time Block,Time,GHATAMPUR DC/ Ent,GHATAMPUR SG,MEJA DC/ Ent,MEJA SG\n\
             1,00:00-00:15,600,500,5,4\n\
             2,00:15-00:30,600,N/A,5,+4\n\
             97,bad,1,1,1,1\n",
        )
        .unwrap();

        fs::write(
            dir.join("trader.csv"),
            "Time Block,Time,GHATAMPUR DC/ Ent,GHATAMPUR SG\n\
             1,00:00-00:15,300,250\n\
             2,00:15-00:30,300,260\n",
        )
        .unwrap();

        // uprvunl.csv deliberately missing.

        fs::write(
            dir.join("menukhdc.csv"),
            utf16(
                "Time Block,Time,Anpara-D Unit 6,Anpara-D Unit 7\n\
                 ,,Total Ent,Total Ent\n\
                 1,00:00-00:15,250,240\n\
                 2,00:15-00:30,250,,\n",
            ),
        )
        .unwrap();

        fs::write(
            dir.join("menukhsg.csv"),
            utf16(
                "SG Report,,,\n\
                 Date,18-10-2026,,\n\
                 ,,Anpara-D,Obra\n\
                 ,,,\n\
                 ,,,\n\
                 ,,,\n\
                 Sl,Desc,SG,SG\n\
                 TIME BLOCK,TIME DESC,SG,SG\n\
                 1,00:00-00:15,+300,90\n\
                 2,00:15-00:30,+310,95\n",
            ),
        )
        .unwrap();
    }

    fn pipeline(dir: &Path) -> Pipeline {
        let config = PipelineConfig::load(
            dir,
            &dir.join("mod.csv"),
            &dir.join("plant_mappings.json"),
        )
        .unwrap();
        Pipeline::new(config)
    }

    fn fact<'a>(facts: &'a [FactRow], block: u8, plant: &str) -> &'a FactRow {
        facts
            .iter()
            .find(|f| f.time_block == block && f.plant_name == plant)
            .unwrap_or_else(|| panic!("no fact for {} {}", block, plant))
    }

    // -------------------------------------------------------------------------
    // END TO END
    // -------------------------------------------------------------------------

    #[test]
    fn test_full_run_over_fixture() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let outcome = pipeline(dir.path()).run();
        let facts = &outcome.facts;

        // Every block is in range and every key is unique.
        assert!(facts.iter().all(|f| (1..=96).contains(&f.time_block)));
        let keys: HashSet<_> = facts.iter().map(|f| (f.time_block, f.plant_name.clone())).collect();
        assert_eq!(keys.len(), facts.len());

        // MEJA: entvsdl DC 10 + ipp DC 5; SG from ipp only.
        let meja = fact(facts, 1, "MEJA");
        assert_eq!(meja.dc_mw, 15.0);
        assert_eq!(meja.sg_mw, 4.0);
        assert_eq!(meja.bid_price_mwh, 2500.0);
        assert_eq!(meja.category, Category::Central);
        assert_eq!(meja.time_desc, "00:00-00:15");
        assert_eq!(fact(facts, 2, "MEJA").sg_mw, 4.0);

        // RIHAND from the multi-level entitlement file.
        let rihand = fact(facts, 2, "RIHAND");
        assert_eq!(rihand.dc_mw, 210.0);
        assert_eq!(rihand.sg_mw, 160.0);
        assert_eq!(rihand.bid_price_mwh, 1200.0);

        // GHATAMPUR is suppressed in ipp.csv; only trader.csv counts.
        let ghatampur = fact(facts, 1, "GHATAMPUR");
        assert_eq!(ghatampur.dc_mw, 300.0);
        assert_eq!(ghatampur.sg_mw, 250.0);
        assert_eq!(ghatampur.category, Category::Central);

        // ANPARA D: DC from both units in menukhdc, SG from the label row.
        let anpara = fact(facts, 1, "ANPARA D");
        assert_eq!(anpara.dc_mw, 490.0);
        assert_eq!(anpara.sg_mw, 300.0);
        assert_eq!(fact(facts, 2, "ANPARA D").dc_mw, 250.0);

        assert_eq!(facts.len(), 8);
    }

    #[test]
    fn test_report_covers_gaps() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let report = pipeline(dir.path()).run().report;

        assert_eq!(report.skipped_sources.len(), 1);
        assert_eq!(report.skipped_sources[0].source, "uprvunl.csv");
        assert_eq!(report.skipped_sources[0].kind, "SourceUnavailable");
        assert_eq!(report.sources.len(), 5);

        assert_eq!(report.registry_misses, vec!["TANDA".to_string()]);
        assert_eq!(report.merit_without_alias, vec!["OBRA".to_string()]);
        assert_eq!(report.unmatched_plants, vec!["TANDA".to_string()]);
        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].source, "ipp.csv");

        let ipp = report.sources.iter().find(|s| s.source == "ipp.csv").unwrap();
        assert_eq!(ipp.rows_kept, 2);
        assert_eq!(ipp.rows_dropped, 1);
        assert_eq!(ipp.coercion_failures, 0);
        assert_eq!(ipp.plants_matched, vec!["MEJA".to_string()]);
        assert!(ipp.registry_misses.is_empty());
        assert_eq!(report.fact_rows, 8);
    }

    #[test]
    fn test_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let p = pipeline(dir.path());
        let first = p.run();
        let second = p.run();
        assert_eq!(first.facts, second.facts);
        assert_eq!(first.report, second.report);
        assert_eq!(
            serde_json::to_string(&first.facts).unwrap(),
            serde_json::to_string(&second.facts).unwrap()
        );
    }

    #[test]
    fn test_all_sources_missing_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mod.csv"), REGISTRY_CSV).unwrap();
        fs::write(dir.path().join("plant_mappings.json"), MAPPING_JSON).unwrap();
        let outcome = pipeline(dir.path()).run();
        assert!(outcome.facts.is_empty());
        assert_eq!(outcome.report.skipped_sources.len(), 6);
    }

    #[test]
    fn test_missing_registry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plant_mappings.json"), MAPPING_JSON).unwrap();
        let err = PipelineConfig::load(
            dir.path(),
            &dir.path().join("mod.csv"),
            &dir.path().join("plant_mappings.json"),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    // -------------------------------------------------------------------------
    // SINGLE SOURCE
    // -------------------------------------------------------------------------

    #[test]
    fn test_non_numeric_cells_in_source() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(
            dir.path().join("trader.csv"),
            "Time Block,Time,MEJA DC/ Unit1,MEJA DC/ Unit2\n1,00:00-00:15,N/A,+120\n",
        )
        .unwrap();
        let p = pipeline(dir.path());
        let recipe = p
            .config()
            .sources
            .iter()
            .find(|s| s.file_name == "trader.csv")
            .unwrap()
            .clone();
        let source_rows = p.process_source(&recipe).unwrap();
        assert_eq!(source_rows.rows.len(), 1);
        assert_eq!(source_rows.rows[0].dc_mw, 120.0);
        assert_eq!(source_rows.rows[0].sg_mw, 0.0);
        assert_eq!(source_rows.summary.coercion_failures, 1);
    }

    #[test]
    fn test_unregistered_plant_in_source_without_desc_column() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(
            dir.path().join("trader.csv"),
            "Time Block,TANDA DC/ Ent,TANDA SG\n1,50,40\n2,55,45\n",
        )
        .unwrap();
        let outcome = pipeline(dir.path()).run();

        let trader = outcome
            .report
            .sources
            .iter()
            .find(|s| s.source == "trader.csv")
            .unwrap();
        assert_eq!(trader.rows_kept, 2);
        assert_eq!(trader.plants_matched, vec!["TANDA".to_string()]);
        assert_eq!(trader.registry_misses, vec!["TANDA".to_string()]);
        assert!(!outcome.report.unmatched_plants.contains(&"TANDA".to_string()));

        let tanda = fact(&outcome.facts, 2, "TANDA");
        assert_eq!(tanda.dc_mw, 55.0);
        assert_eq!(tanda.sg_mw, 45.0);
        assert_eq!(tanda.plant_type, "Unknown");
        assert_eq!(tanda.bid_price_mwh, 0.0);
        assert_eq!(tanda.time_desc, "2");
    }

    #[test]
    fn test_time_key_not_found_skips_source() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(dir.path().join("trader.csv"), "Plant,MW\nMEJA,10\n").unwrap();
        let report = pipeline(dir.path()).run().report;
        assert!(report
            .skipped_sources
            .iter()
            .any(|s| s.source == "trader.csv" && s.kind == "TimeKeyNotFound"));
        // GHATAMPUR only lived in trader.csv besides the suppressed listing.
        assert!(report.unmatched_plants.contains(&"GHATAMPUR".to_string()));
    }

    #[test]
    fn test_label_source_in_isolation() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let p = pipeline(dir.path());
        let recipe = SourceRecipe::csv("menukhsg.csv", HeaderShape::Row(6), Category::Central)
            .with_encoding(TextEncoding::Utf16Le)
            .with_rules(LABEL_SG_RULES)
            .with_label_row(LabelRow { scan_records: 5, row: 2 });
        let source_rows = p.process_source(&recipe).unwrap();
        assert_eq!(source_rows.summary.plants_matched, vec!["ANPARA D".to_string()]);
        let sg: Vec<f64> = source_rows.rows.iter().map(|r| r.sg_mw).collect();
        assert_eq!(sg, vec![300.0, 310.0]);
        assert!(source_rows.rows.iter().all(|r| r.dc_mw == 0.0));
    }
}
