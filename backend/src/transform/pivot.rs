//! Pivot repeated cross-reference rows into one wide row per code.
//!
//! # Architecture
//!
//! ```text
//! Reference rows (long)               →  Pivoted rows (wide, K = 2)
//! ┌───────────────────────────┐         ┌──────────────────────────────────────┐
//! │ code: 7, X, R1            │         │ sku: 7, brand1: X, reference1: R1,   │
//! │ code: 9, Z, R9            │    →    │         brand2: Y, reference2: R2    │
//! │ code: 7, Y, R2            │         ├──────────────────────────────────────┤
//! └───────────────────────────┘         │ sku: 9, brand1: Z, reference1: R9,   │
//!                                       │         brand2: "", reference2: ""   │
//!                                       └──────────────────────────────────────┘
//! ```
//!
//! K is the largest number of references any single code has in the batch,
//! never below the configured minimum width.

use std::collections::HashMap;

use crate::models::{
    columns, Degradation, KeyOrigin, PivotedReferenceRow, ReferenceRecord, Table, TableKind,
};

use super::key::normalize_key;

/// Result of pivoting one reference table.
#[derive(Debug, Clone, Default)]
pub struct PivotResult {
    /// One row per distinct code, in first-seen order.
    pub rows: Vec<PivotedReferenceRow>,
    /// Number of brand/reference column pairs (K).
    pub width: usize,
    /// Records dropped because their code was empty.
    pub dropped: usize,
    pub degradations: Vec<Degradation>,
}

impl PivotResult {
    /// Column names of the wide table: `sku`, brands, references, `sku_key`.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(2 * self.width + 2);
        cols.push(columns::SKU.to_string());
        cols.extend((1..=self.width).map(columns::brand));
        cols.extend((1..=self.width).map(columns::reference));
        cols.push(columns::SKU_KEY.to_string());
        cols
    }

    /// Cells of one pivoted row, aligned with [`PivotResult::columns`].
    pub fn row_cells(&self, row: &PivotedReferenceRow) -> Vec<String> {
        let mut cells = Vec::with_capacity(2 * self.width + 2);
        cells.push(row.code.clone());
        cells.extend((1..=self.width).map(|i| row.brand(i).to_string()));
        cells.extend((1..=self.width).map(|i| row.reference(i).to_string()));
        cells.push(row.key.display_value().to_string());
        cells
    }

    /// Empty cells for a product with no reference match.
    pub fn empty_cells(&self) -> Vec<String> {
        vec![String::new(); 2 * self.width + 2]
    }

    /// The pivot as a standalone table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.columns());
        for row in &self.rows {
            table.push_row(self.row_cells(row));
        }
        table
    }
}

/// Extract reference records from a raw reference table.
///
/// Without a `code` column nothing can be keyed and no records are
/// returned. A missing brand or relation column yields empty values.
pub fn reference_records(table: &Table) -> (Vec<ReferenceRecord>, Vec<Degradation>) {
    let mut degradations = Vec::new();
    for col in [columns::CODE, columns::COMPANY_NAME, columns::RELATION_CODE] {
        if !table.has_column(col) {
            degradations.push(Degradation::missing_column(TableKind::References, col));
        }
    }

    let Some(code_idx) = table.column_index(columns::CODE) else {
        return (Vec::new(), degradations);
    };
    let brand_idx = table.column_index(columns::COMPANY_NAME);
    let relation_idx = table.column_index(columns::RELATION_CODE);

    let cell = |row: &[String], idx: Option<usize>| idx.map(|i| row[i].clone()).unwrap_or_default();

    let records = table
        .rows
        .iter()
        .map(|row| ReferenceRecord {
            code: row[code_idx].clone(),
            company_name: cell(row, brand_idx),
            relation_code: cell(row, relation_idx),
        })
        .collect();

    (records, degradations)
}

/// Group records by code and lay each group out as one wide row.
///
/// Records keep their first-seen order inside a group; records with an
/// empty code are dropped.
pub fn pivot_records(records: &[ReferenceRecord], min_width: usize) -> PivotResult {
    let mut result = PivotResult::default();
    let mut groups: HashMap<&str, usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        if record.code.trim().is_empty() {
            result.dropped += 1;
            continue;
        }

        let slot = *groups.entry(record.code.as_str()).or_insert_with(|| {
            result.rows.push(PivotedReferenceRow {
                code: record.code.clone(),
                key: normalize_key(&record.code, KeyOrigin::new(TableKind::References, idx)),
                entries: Vec::new(),
            });
            result.rows.len() - 1
        });

        result.rows[slot]
            .entries
            .push((record.company_name.clone(), record.relation_code.clone()));
    }

    let observed = result.rows.iter().map(|r| r.entries.len()).max().unwrap_or(0);
    // At least one brand/reference pair, whatever was asked for
    result.width = observed.max(min_width).max(1);
    result
}

/// Pivot a raw reference table.
pub fn pivot_references(table: &Table, min_width: usize) -> PivotResult {
    let (records, degradations) = reference_records(table);
    let mut result = pivot_records(&records, min_width);
    result.degradations = degradations;
    result
}
