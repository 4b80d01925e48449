//! Per-category column availability.
//!
//! Product categories fill disjoint subsets of the optional attribute
//! columns. For each category this computes the columns that hold at least
//! one non-blank value, so views only show fields that carry data.

use std::collections::HashMap;

use crate::models::{CategoryColumnMap, Degradation, Table, TableKind};

/// Compute the available-column set of every category.
///
/// Rows with a blank category belong to no category. Column order follows
/// the table. Without a category column the map is empty and a degradation
/// is returned.
pub fn index_categories(
    table: &Table,
    category_column: &str,
) -> (CategoryColumnMap, Vec<Degradation>) {
    let Some(cat_idx) = table.column_index(category_column) else {
        return (
            CategoryColumnMap::new(),
            vec![Degradation::missing_column(TableKind::Products, category_column)],
        );
    };

    let mut filled: HashMap<&str, Vec<bool>> = HashMap::new();
    for row in &table.rows {
        let category = row[cat_idx].as_str();
        if category.trim().is_empty() {
            continue;
        }

        let flags = filled
            .entry(category)
            .or_insert_with(|| vec![false; table.width()]);
        for (flag, cell) in flags.iter_mut().zip(row) {
            *flag |= !cell.trim().is_empty();
        }
    }

    let mut map = CategoryColumnMap::new();
    for (category, flags) in filled {
        let available = table
            .headers
            .iter()
            .zip(flags)
            .filter_map(|(name, has_data)| has_data.then(|| name.clone()))
            .collect();
        map.insert(category.to_string(), available);
    }

    (map, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[[&str; 4]]) -> Table {
        Table::with_rows(
            ["product_code", "category_text", "col1", "col2"],
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_union_of_filled_columns() {
        let t = table(&[["1", "A", "x", ""], ["2", "A", "", "y"]]);
        let (map, degradations) = index_categories(&t, "category_text");

        assert!(degradations.is_empty());
        assert_eq!(
            map.get("A").unwrap(),
            &["product_code", "category_text", "col1", "col2"]
        );
    }

    #[test]
    fn test_empty_column_excluded_per_category() {
        let t = table(&[["1", "A", "x", ""], ["2", "B", "", "y"], ["3", "A", " ", "  "]]);
        let (map, _) = index_categories(&t, "category_text");

        assert_eq!(map.get("A").unwrap(), &["product_code", "category_text", "col1"]);
        assert_eq!(map.get("B").unwrap(), &["product_code", "category_text", "col2"]);
    }

    #[test]
    fn test_blank_category_rows_ignored() {
        let t = table(&[["1", "", "x", "y"], ["2", "  ", "x", "y"], ["3", "A", "", ""]]);
        let (map, _) = index_categories(&t, "category_text");

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("A").unwrap(), &["product_code", "category_text"]);
    }

    #[test]
    fn test_categories_sorted() {
        let t = table(&[["1", "b", "", ""], ["2", "a", "", ""], ["3", "c", "", ""]]);
        let (map, _) = index_categories(&t, "category_text");

        assert_eq!(map.categories().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_category_column() {
        let t = Table::with_rows(["product_code"], vec![vec!["1".into()]]);
        let (map, degradations) = index_categories(&t, "category_text");

        assert!(map.is_empty());
        assert_eq!(
            degradations,
            vec![Degradation::missing_column(TableKind::Products, "category_text")]
        );
    }
}
