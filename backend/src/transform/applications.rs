//! Explode comma-packed application references into one row per reference.
//!
//! The application table packs every original reference a machine entry
//! applies to into a single `relation_code` cell (`"12, 13,,14"`). Splitting
//! it once here lets views filter with plain equality.

use crate::models::{
    columns, ApplicationRecord, Degradation, NormalizedApplicationRow, Table, TableKind,
};

/// Result of normalizing the application table.
#[derive(Debug, Clone, Default)]
pub struct ApplicationResult {
    pub rows: Vec<NormalizedApplicationRow>,
    /// Source rows that yielded no reference.
    pub empty_rows: usize,
    pub degradations: Vec<Degradation>,
}

impl ApplicationResult {
    /// The normalized rows as a `sku, brand_app, reference_app` table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new([columns::SKU, columns::BRAND_APP, columns::REFERENCE_APP]);
        for row in &self.rows {
            table.push_row(vec![
                row.sku.clone(),
                row.brand_app.clone(),
                row.reference_app.clone(),
            ]);
        }
        table
    }
}

/// Split a packed relation cell into trimmed, non-empty tokens.
pub fn split_relations(packed: &str) -> impl Iterator<Item = &str> {
    packed.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Explode one application record.
pub fn explode_record(record: &ApplicationRecord) -> Vec<NormalizedApplicationRow> {
    split_relations(&record.relation_codes)
        .map(|reference| NormalizedApplicationRow {
            sku: record.sku.clone(),
            brand_app: record.brand.clone(),
            reference_app: reference.to_string(),
        })
        .collect()
}

/// Extract application records; absent columns read as empty strings.
pub fn application_records(table: &Table) -> (Vec<ApplicationRecord>, Vec<Degradation>) {
    let mut degradations = Vec::new();
    let mut index = |col: &str| {
        let idx = table.column_index(col);
        if idx.is_none() {
            degradations.push(Degradation::missing_column(TableKind::Applications, col));
        }
        idx
    };
    let sku_idx = index(columns::CODE);
    let brand_idx = index(columns::COMPANY_NAME);
    let relation_idx = index(columns::RELATION_CODE);

    let cell = |row: &[String], idx: Option<usize>| idx.map(|i| row[i].clone()).unwrap_or_default();

    let records = table
        .rows
        .iter()
        .map(|row| ApplicationRecord {
            sku: cell(row, sku_idx),
            brand: cell(row, brand_idx),
            relation_codes: cell(row, relation_idx),
        })
        .collect();

    (records, degradations)
}

/// Normalize the raw application table.
pub fn normalize_applications(table: &Table) -> ApplicationResult {
    let (records, degradations) = application_records(table);
    let mut result = ApplicationResult {
        degradations,
        ..ApplicationResult::default()
    };

    for record in &records {
        let exploded = explode_record(record);
        if exploded.is_empty() {
            result.empty_rows += 1;
        }
        result.rows.extend(exploded);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sku: &str, brand: &str, relations: &str) -> ApplicationRecord {
        ApplicationRecord {
            sku: sku.into(),
            brand: brand.into(),
            relation_codes: relations.into(),
        }
    }

    #[test]
    fn test_explode_trims_and_drops_empty_tokens() {
        let rows = explode_record(&record("S1", "Deere", "12, 13,,14"));

        let refs: Vec<&str> = rows.iter().map(|r| r.reference_app.as_str()).collect();
        assert_eq!(refs, vec!["12", "13", "14"]);
        assert!(rows.iter().all(|r| r.sku == "S1" && r.brand_app == "Deere"));
    }

    #[test]
    fn test_empty_relations_yield_no_rows() {
        assert!(explode_record(&record("S1", "B", "")).is_empty());
        assert!(explode_record(&record("S1", "B", " , ,")).is_empty());
    }

    #[test]
    fn test_single_token() {
        let rows = explode_record(&record("S1", "B", " R9 "));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference_app, "R9");
    }

    #[test]
    fn test_normalize_table() {
        let table = Table::with_rows(
            ["code", "company_name", "relation_code", "notes"],
            vec![
                vec!["S1".into(), "Deere".into(), "12, 13".into(), "x".into()],
                vec!["S2".into(), "Case".into(), "".into(), "y".into()],
                vec!["S3".into(), "Fendt".into(), "7".into(), "z".into()],
            ],
        );
        let result = normalize_applications(&table);

        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.empty_rows, 1);
        let out = result.to_table();
        assert_eq!(out.headers, vec!["sku", "brand_app", "reference_app"]);
        assert_eq!(out.rows[2], vec!["S3", "Fendt", "7"]);
    }

    #[test]
    fn test_missing_relation_column_yields_nothing() {
        let table = Table::with_rows(
            ["code", "company_name"],
            vec![vec!["S1".into(), "Deere".into()]],
        );
        let result = normalize_applications(&table);

        assert!(result.rows.is_empty());
        assert_eq!(
            result.degradations,
            vec![Degradation::missing_column(TableKind::Applications, "relation_code")]
        );
    }
}
