//! Left outer join of products with pivoted references.
//!
//! Every product row is kept, in order, and extended with the pivot
//! columns of at most one reference row sharing its normalized key.

use std::collections::HashMap;

use crate::models::{columns, Degradation, KeyOrigin, Table, TableKind};

use super::key::normalize_key;
use super::pivot::PivotResult;

/// Result of merging products with references.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub table: Table,
    /// Name the normalized product key column ended up with.
    pub key_column: String,
    pub matched: usize,
    pub unmatched: usize,
    /// Products whose identifier was empty or all zeros.
    pub unjoinable: usize,
    /// Pivoted codes shadowed by an earlier code with the same key.
    pub key_collisions: usize,
    pub degradations: Vec<Degradation>,
}

/// Join `products` with `pivot` on the normalized `id_column`.
///
/// When `id_column` is absent no product matches; the merged table still
/// carries the full column layout and a degradation is reported.
pub fn merge_products(products: &Table, pivot: &PivotResult, id_column: &str) -> MergeResult {
    let mut degradations = Vec::new();
    let id_idx = products.column_index(id_column);
    if id_idx.is_none() {
        degradations.push(Degradation::missing_column(TableKind::Products, id_column));
    }

    let mut by_key: HashMap<&str, usize> = HashMap::new();
    let mut key_collisions = 0;
    for (i, row) in pivot.rows.iter().enumerate() {
        if let Some(key) = row.key.as_str() {
            if by_key.contains_key(key) {
                key_collisions += 1;
            } else {
                by_key.insert(key, i);
            }
        }
    }

    let mut headers = products.headers.clone();
    let key_column = unique_name(&headers, columns::PRODUCT_KEY.to_string());
    headers.push(key_column.clone());
    for name in pivot.columns() {
        let unique = unique_name(&headers, name);
        headers.push(unique);
    }

    let mut table = Table::new(headers);
    let (mut matched, mut unmatched, mut unjoinable) = (0, 0, 0);

    for (row_idx, product) in products.rows.iter().enumerate() {
        let key = id_idx.map(|i| {
            normalize_key(&product[i], KeyOrigin::new(TableKind::Products, row_idx))
        });

        let mut cells = product.clone();
        cells.push(key.as_ref().map(|k| k.display_value().to_string()).unwrap_or_default());

        if key.as_ref().is_some_and(|k| !k.is_joinable()) {
            unjoinable += 1;
        }

        let hit = key
            .as_ref()
            .and_then(|k| k.as_str())
            .and_then(|k| by_key.get(k))
            .map(|&i| &pivot.rows[i]);

        match hit {
            Some(reference) => {
                matched += 1;
                cells.extend(pivot.row_cells(reference));
            }
            None => {
                unmatched += 1;
                cells.extend(pivot.empty_cells());
            }
        }

        table.push_row(cells);
    }

    MergeResult {
        table,
        key_column,
        matched,
        unmatched,
        unjoinable,
        key_collisions,
        degradations,
    }
}

/// `name`, or `name_ref`, `name_ref2`... when it already exists.
fn unique_name(existing: &[String], name: String) -> String {
    if !existing.contains(&name) {
        return name;
    }
    let base = format!("{}_ref", name);
    let mut candidate = base.clone();
    let mut n = 2;
    while existing.contains(&candidate) {
        candidate = format!("{}{}", base, n);
        n += 1;
    }
    candidate
}
