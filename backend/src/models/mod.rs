//! Domain models for the Partlens reshaping pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`Table`] / [`Row`] - text-typed tables as loaded from the input files
//! - [`TableKind`] - which of the three inputs a table came from
//! - [`JoinKey`] - normalized identifier used by the product/reference join
//! - [`ReferenceRecord`], [`PivotedReferenceRow`] - cross-reference rows
//! - [`ApplicationRecord`], [`NormalizedApplicationRow`] - machine applications
//! - [`CategoryColumnMap`] - per-category available columns
//! - [`Diagnostics`] - degraded-mode report attached to every snapshot

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known column names.
pub mod columns {
    /// Identifier of a reference / application row.
    pub const CODE: &str = "code";
    /// Manufacturer name in the reference and application tables.
    pub const COMPANY_NAME: &str = "company_name";
    /// Manufacturer part number (comma-packed in the application table).
    pub const RELATION_CODE: &str = "relation_code";

    /// Normalized join key appended to the product table.
    pub const PRODUCT_KEY: &str = "product_key";
    /// Reference code carried over from the pivoted table.
    pub const SKU: &str = "sku";
    /// Normalized join key of the pivoted reference code.
    pub const SKU_KEY: &str = "sku_key";

    /// Application brand.
    pub const BRAND_APP: &str = "brand_app";
    /// Atomic application reference.
    pub const REFERENCE_APP: &str = "reference_app";

    /// `brand{i}`, 1-based.
    pub fn brand(i: usize) -> String {
        format!("brand{}", i)
    }

    /// `reference{i}`, 1-based.
    pub fn reference(i: usize) -> String {
        format!("reference{}", i)
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Which of the three input tables a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Products,
    References,
    Applications,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [
        TableKind::Products,
        TableKind::References,
        TableKind::Applications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::References => "references",
            Self::Applications => "applications",
        }
    }

    /// Parse an upload field or CLI name (`products`, `references`, `applications`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "products" | "product" => Some(Self::Products),
            "references" | "reference" => Some(Self::References),
            "applications" | "application" => Some(Self::Applications),
            _ => None,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text-typed table: one header row and rows of string cells.
///
/// Every row has exactly `headers.len()` cells; short rows are padded with
/// empty strings and long rows truncated when they are added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given headers.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table and append every row, normalizing row widths.
    pub fn with_rows<I, S>(headers: I, rows: Vec<Vec<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Position of a column, first match wins.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Borrowing view of row `index`.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            headers: &self.headers,
            cells,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            headers: &self.headers,
            cells,
        })
    }

    /// All values of a column, or `None` if the column does not exist.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }
}

/// A row of a [`Table`], addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    headers: &'a [String],
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Cell of `column`, or `None` if the table has no such column.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|i| self.cells[i].as_str())
    }

    /// Cell of `column`, empty when the column is absent.
    pub fn value(&self, column: &str) -> &'a str {
        self.get(column).unwrap_or("")
    }

    pub fn cells(&self) -> &'a [String] {
        self.cells
    }

    /// Column-name to value mapping of this row.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .cloned()
            .zip(self.cells.iter().cloned())
            .collect()
    }
}

// =============================================================================
// Join keys
// =============================================================================

/// Source row of an identifier, used to make unjoinable keys unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyOrigin {
    pub table: TableKind,
    pub row: usize,
}

impl KeyOrigin {
    pub fn new(table: TableKind, row: usize) -> Self {
        Self { table, row }
    }
}

/// Normalized identifier used to join products with references.
///
/// `Unjoinable` marks an identifier that was empty or made only of zeros.
/// Each one carries its source row, so two of them are never equal unless
/// they describe the same row, and they never equal a `Value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum JoinKey {
    Value(String),
    Unjoinable(KeyOrigin),
}

impl JoinKey {
    /// The key text for real keys.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JoinKey::Value(v) => Some(v),
            JoinKey::Unjoinable(_) => None,
        }
    }

    pub fn is_joinable(&self) -> bool {
        matches!(self, JoinKey::Value(_))
    }

    /// Text written to the key columns of the output tables.
    pub fn display_value(&self) -> &str {
        self.as_str().unwrap_or("")
    }
}

// =============================================================================
// References
// =============================================================================

/// One (code, brand, relation) cross-reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub code: String,
    pub company_name: String,
    pub relation_code: String,
}

impl ReferenceRecord {
    pub fn new(
        code: impl Into<String>,
        company_name: impl Into<String>,
        relation_code: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            company_name: company_name.into(),
            relation_code: relation_code.into(),
        }
    }
}

/// All cross-references of one code, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotedReferenceRow {
    pub code: String,
    pub key: JoinKey,
    /// `(brand, reference)` pairs; index 0 is `brand1`/`reference1`.
    pub entries: Vec<(String, String)>,
}

impl PivotedReferenceRow {
    /// Brand at 1-based position `i`, empty beyond the group size.
    pub fn brand(&self, i: usize) -> &str {
        self.entries
            .get(i.wrapping_sub(1))
            .map(|(b, _)| b.as_str())
            .unwrap_or("")
    }

    /// Reference at 1-based position `i`, empty beyond the group size.
    pub fn reference(&self, i: usize) -> &str {
        self.entries
            .get(i.wrapping_sub(1))
            .map(|(_, r)| r.as_str())
            .unwrap_or("")
    }
}

// =============================================================================
// Applications
// =============================================================================

/// Raw machine-application row; `relation_codes` is comma-packed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub sku: String,
    pub brand: String,
    pub relation_codes: String,
}

/// One atomic (sku, brand, reference) application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedApplicationRow {
    pub sku: String,
    pub brand_app: String,
    pub reference_app: String,
}

// =============================================================================
// Category schema
// =============================================================================

/// Category value to the columns that carry data for that category.
///
/// Categories iterate in sorted order; each column list follows the source
/// table's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryColumnMap(BTreeMap<String, Vec<String>>);

impl CategoryColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: String, columns: Vec<String>) {
        self.0.insert(category, columns);
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.0.get(category).map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// A schema mismatch the pipeline worked around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Degradation {
    /// An expected column is absent from an input table.
    #[serde(rename_all = "camelCase")]
    MissingColumn { table: TableKind, column: String },
}

impl Degradation {
    pub fn missing_column(table: TableKind, column: &str) -> Self {
        Degradation::MissingColumn {
            table,
            column: column.to_string(),
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingColumn { table, column } => {
                write!(f, "{} table has no '{}' column", table, column)
            }
        }
    }
}

/// What the pipeline dropped, skipped or could not do for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub degradations: Vec<Degradation>,
    /// Reference rows dropped because their code was empty.
    pub dropped_references: usize,
    /// Pivoted codes whose join key was already used by an earlier code.
    pub key_collisions: usize,
    /// Products without a matching reference row.
    pub unmatched_products: usize,
    /// Products whose identifier was empty or all zeros.
    pub unjoinable_products: usize,
    /// Application rows that produced no reference.
    pub empty_applications: usize,
}

impl Diagnostics {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn push(&mut self, degradation: Degradation) {
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
    }

    /// Whether a given column was reported missing.
    pub fn is_missing(&self, table: TableKind, column: &str) -> bool {
        self.degradations.iter().any(|d| match d {
            Degradation::MissingColumn { table: t, column: c } => *t == table && c == column,
        })
    }
}
