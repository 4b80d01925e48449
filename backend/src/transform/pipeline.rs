//! High-level pipeline API: three input files in, one immutable snapshot out.
//!
//! ```text
//! references ──▶ pivot ──┐
//!                        ├──▶ merge ──▶ merged products ──▶ category index
//! products ──────────────┘
//! applications ──▶ explode ──▶ normalized applications
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use partlens::{run_pipeline, InputFile, PipelineInputs, PipelineOptions};
//!
//! let inputs = PipelineInputs::new(
//!     InputFile::read("products.xlsx")?,
//!     InputFile::read("references.xlsx")?,
//!     InputFile::read("applications.xlsx")?,
//! );
//! let snapshot = run_pipeline(&inputs, &PipelineOptions::default())?;
//! println!("{} products, pivot width {}", snapshot.merged.len(), snapshot.pivot_width);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::applications::normalize_applications;
use super::merge::merge_products;
use super::pivot::pivot_references;
use super::schema_index::index_categories;
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::cache::InputFingerprint;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{CategoryColumnMap, Diagnostics, Table, TableKind};
use crate::parser::{parse_bytes_auto, LoadedTable, SourceFormat};

const ENV_PRODUCT_ID_COLUMN: &str = "PARTLENS_PRODUCT_ID_COLUMN";
const ENV_CATEGORY_COLUMN: &str = "PARTLENS_CATEGORY_COLUMN";
const ENV_MIN_PIVOT_WIDTH: &str = "PARTLENS_MIN_PIVOT_WIDTH";

/// Options for the reshaping pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    /// Product identifier column used for the join
    pub product_id_column: String,

    /// Product category column used by the schema index
    pub category_column: String,

    /// Smallest number of brand/reference column pairs in the merged table
    pub min_pivot_width: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            product_id_column: "product_code".to_string(),
            category_column: "category_text".to_string(),
            min_pivot_width: 1,
        }
    }
}

impl PipelineOptions {
    /// Defaults overlaid with `PARTLENS_*` environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(col) = std::env::var(ENV_PRODUCT_ID_COLUMN) {
            if !col.trim().is_empty() {
                options.product_id_column = col.trim().to_string();
            }
        }
        if let Ok(col) = std::env::var(ENV_CATEGORY_COLUMN) {
            if !col.trim().is_empty() {
                options.category_column = col.trim().to_string();
            }
        }
        if let Ok(width) = std::env::var(ENV_MIN_PIVOT_WIDTH) {
            match width.trim().parse::<usize>() {
                Ok(w) if w >= 1 => options.min_pivot_width = w,
                _ => tracing::warn!(
                    value = %width,
                    "ignoring invalid {}",
                    ENV_MIN_PIVOT_WIDTH
                ),
            }
        }

        options
    }
}

/// Raw bytes of one uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { name, bytes }
    }

    /// Read a file from disk, keeping its file name.
    pub fn read<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from);
        Ok(Self { name, bytes })
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("upload")
    }
}

/// The three files of one batch. Any of them may still be missing.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub products: Option<InputFile>,
    pub references: Option<InputFile>,
    pub applications: Option<InputFile>,
}

impl PipelineInputs {
    pub fn new(products: InputFile, references: InputFile, applications: InputFile) -> Self {
        Self {
            products: Some(products),
            references: Some(references),
            applications: Some(applications),
        }
    }

    pub fn get(&self, kind: TableKind) -> Option<&InputFile> {
        match kind {
            TableKind::Products => self.products.as_ref(),
            TableKind::References => self.references.as_ref(),
            TableKind::Applications => self.applications.as_ref(),
        }
    }

    pub fn set(&mut self, kind: TableKind, file: InputFile) {
        match kind {
            TableKind::Products => self.products = Some(file),
            TableKind::References => self.references = Some(file),
            TableKind::Applications => self.applications = Some(file),
        }
    }

    /// Tables that have not been supplied.
    pub fn missing(&self) -> Vec<TableKind> {
        TableKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

    /// Fail with [`PipelineError::MissingInput`] unless all three are present.
    pub fn ensure_complete(&self) -> PipelineResult<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingInput(missing))
        }
    }
}

/// Everything the views read for one batch. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Products with their pivoted references appended
    pub merged: Table,
    /// Name of the normalized product key column in `merged`
    pub product_key_column: String,
    /// Category column the index was built on
    pub category_column: String,
    /// Category → columns carrying data
    pub category_columns: CategoryColumnMap,
    /// Reference table exactly as uploaded
    pub references: Table,
    /// `sku, brand_app, reference_app`
    pub applications: Table,
    /// Number of brand/reference column pairs
    pub pivot_width: usize,
    pub diagnostics: Diagnostics,
    /// Detected format of each input, keyed by table
    pub formats: Vec<(TableKind, SourceFormat)>,
    pub fingerprint: Option<InputFingerprint>,
    pub computed_at: DateTime<Utc>,
}

/// Load and transform one complete batch.
///
/// Fails if a table is missing or any file cannot be loaded; no partial
/// snapshot is ever returned.
pub fn run_pipeline(inputs: &PipelineInputs, options: &PipelineOptions) -> PipelineResult<Snapshot> {
    inputs.ensure_complete()?;
    let fingerprint = InputFingerprint::compute(inputs, options);
    run_fingerprinted(inputs, options, fingerprint)
}

/// [`run_pipeline`] for callers that already hashed the inputs.
pub(crate) fn run_fingerprinted(
    inputs: &PipelineInputs,
    options: &PipelineOptions,
    fingerprint: InputFingerprint,
) -> PipelineResult<Snapshot> {
    let products = load(inputs, TableKind::Products)?;
    let references = load(inputs, TableKind::References)?;
    let applications = load(inputs, TableKind::Applications)?;

    let formats = vec![
        (TableKind::Products, products.format),
        (TableKind::References, references.format),
        (TableKind::Applications, applications.format),
    ];

    let mut snapshot = run_tables(
        &products.table,
        references.table,
        &applications.table,
        options,
    );
    snapshot.formats = formats;
    snapshot.fingerprint = Some(fingerprint);
    Ok(snapshot)
}

fn load(inputs: &PipelineInputs, kind: TableKind) -> PipelineResult<LoadedTable> {
    let file = inputs
        .get(kind)
        .ok_or_else(|| PipelineError::MissingInput(vec![kind]))?;

    log_info(format!("📖 Reading {} file ({})...", kind, file.label()));
    let loaded = parse_bytes_auto(&file.bytes).map_err(|source| PipelineError::Load {
        table: kind,
        source,
    })?;
    log_info_indent(format!("format: {}", loaded.format), 1);
    log_success(format!(
        "{}: {} rows, {} columns",
        kind,
        loaded.table.len(),
        loaded.table.width()
    ));
    Ok(loaded)
}

/// Transform already-loaded tables. Never fails on data shape.
pub fn run_tables(
    products: &Table,
    references: Table,
    applications: &Table,
    options: &PipelineOptions,
) -> Snapshot {
    let mut diagnostics = Diagnostics::default();

    log_info("🔄 Pivoting references...");
    let pivot = pivot_references(&references, options.min_pivot_width);
    log_success(format!(
        "{} codes, width {} ({} rows dropped for empty code)",
        pivot.rows.len(),
        pivot.width,
        pivot.dropped
    ));
    diagnostics.dropped_references = pivot.dropped;

    log_info("🔗 Merging products with references...");
    let merge = merge_products(products, &pivot, &options.product_id_column);
    log_success(format!(
        "{} products matched, {} unmatched",
        merge.matched, merge.unmatched
    ));
    if merge.key_collisions > 0 {
        log_warning(format!(
            "{} reference codes share a key with an earlier code and were not joined",
            merge.key_collisions
        ));
    }
    diagnostics.key_collisions = merge.key_collisions;
    diagnostics.unmatched_products = merge.unmatched;
    diagnostics.unjoinable_products = merge.unjoinable;

    log_info("🗂️  Indexing columns per category...");
    let (category_columns, index_degradations) =
        index_categories(&merge.table, &options.category_column);
    log_success(format!("{} categories", category_columns.len()));

    log_info("📦 Normalizing applications...");
    let apps = normalize_applications(applications);
    log_success(format!(
        "{} application references ({} rows without reference)",
        apps.rows.len(),
        apps.empty_rows
    ));
    diagnostics.empty_applications = apps.empty_rows;

    for degradation in pivot
        .degradations
        .iter()
        .chain(&merge.degradations)
        .chain(&index_degradations)
        .chain(&apps.degradations)
    {
        log_warning(format!("Degraded: {}", degradation));
        diagnostics.push(degradation.clone());
    }

    Snapshot {
        applications: apps.to_table(),
        merged: merge.table,
        product_key_column: merge.key_column,
        category_column: options.category_column.clone(),
        category_columns,
        references,
        pivot_width: pivot.width,
        diagnostics,
        formats: Vec::new(),
        fingerprint: None,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;

    fn file(content: &str) -> InputFile {
        InputFile::new(None, content.as_bytes().to_vec())
    }

    fn inputs() -> PipelineInputs {
        PipelineInputs::new(
            file("product_code,category_text,width\n007,A,10\n42,B,\n"),
            file("code,company_name,relation_code\n7,X,R1\n7,Y,R2\n"),
            file("code,company_name,relation_code\nS1,Deere,\"12, 13,,14\"\n"),
        )
    }

    #[test]
    fn test_default_options() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.product_id_column, "product_code");
        assert_eq!(opts.category_column, "category_text");
        assert_eq!(opts.min_pivot_width, 1);
    }

    #[test]
    fn test_end_to_end() {
        let snapshot = run_pipeline(&inputs(), &PipelineOptions::default()).unwrap();

        let row = snapshot.merged.row(0).unwrap();
        assert_eq!(row.value("product_code"), "007");
        assert_eq!(row.value("brand1"), "X");
        assert_eq!(row.value("reference1"), "R1");
        assert_eq!(row.value("brand2"), "Y");
        assert_eq!(row.value("reference2"), "R2");

        assert_eq!(snapshot.merged.len(), 2);
        assert_eq!(snapshot.pivot_width, 2);
        assert_eq!(snapshot.references.len(), 2);
        assert_eq!(snapshot.applications.len(), 3);
        assert_eq!(snapshot.diagnostics.unmatched_products, 1);
        assert!(!snapshot.diagnostics.is_degraded());
        assert!(snapshot.fingerprint.is_some());

        let cat_b = snapshot.category_columns.get("B").unwrap();
        assert!(cat_b.contains(&"product_code".to_string()));
        assert!(!cat_b.contains(&"width".to_string()));
        assert!(!cat_b.contains(&"brand1".to_string()));
    }

    #[test]
    fn test_missing_input_blocks() {
        let mut partial = PipelineInputs::default();
        partial.set(TableKind::References, file("code\n1\n"));

        match run_pipeline(&partial, &PipelineOptions::default()) {
            Err(PipelineError::MissingInput(kinds)) => {
                assert_eq!(kinds, vec![TableKind::Products, TableKind::Applications]);
            }
            other => panic!("expected MissingInput, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_failure_is_fatal() {
        let mut bad = inputs();
        bad.set(TableKind::Applications, file(""));

        match run_pipeline(&bad, &PipelineOptions::default()) {
            Err(PipelineError::Load { table, source }) => {
                assert_eq!(table, TableKind::Applications);
                assert!(matches!(source, LoadError::EmptyFile));
            }
            other => panic!("expected Load error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_schema_mismatch_is_observable() {
        let mut odd = inputs();
        odd.set(TableKind::Products, file("sku_code,family\n007,A\n"));

        let snapshot = run_pipeline(&odd, &PipelineOptions::default()).unwrap();
        assert!(snapshot.diagnostics.is_degraded());
        assert!(snapshot
            .diagnostics
            .is_missing(TableKind::Products, "product_code"));
        assert!(snapshot
            .diagnostics
            .is_missing(TableKind::Products, "category_text"));
        assert!(snapshot.category_columns.is_empty());
        assert_eq!(snapshot.merged.len(), 1);
        assert_eq!(snapshot.merged.row(0).unwrap().value("brand1"), "");
    }

    #[test]
    fn test_custom_columns() {
        let mut odd = inputs();
        odd.set(TableKind::Products, file("sku_code,family\n007,A\n"));
        let options = PipelineOptions {
            product_id_column: "sku_code".into(),
            category_column: "family".into(),
            min_pivot_width: 3,
        };

        let snapshot = run_pipeline(&odd, &options).unwrap();
        assert!(!snapshot.diagnostics.is_degraded());
        assert_eq!(snapshot.pivot_width, 3);
        assert_eq!(snapshot.merged.row(0).unwrap().value("brand2"), "Y");
        assert!(snapshot.merged.has_column("reference3"));
        assert!(snapshot.category_columns.get("A").is_some());
    }
}
