//! Read-only views over a [`Snapshot`].
//!
//! Every function here copies the rows it selects into a new [`Table`];
//! snapshot tables are never modified.
//!
//! ```rust,ignore
//! let view = product_view(&snapshot, &ProductFilter {
//!     category: Some("Filters".into()),
//!     ..ProductFilter::default()
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::models::{columns, Table};
use crate::transform::pipeline::Snapshot;

/// Product tab selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductFilter {
    /// Category value; `None` or empty means all products.
    pub category: Option<String>,
    /// Normalized product key; `None` or empty means no filter.
    pub product_key: Option<String>,
    /// Columns to show; defaults to the category's available columns.
    pub columns: Option<Vec<String>>,
}

/// Multi-select on brand and reference values. Empty sets do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueSetFilter {
    pub brands: Vec<String>,
    pub references: Vec<String>,
}

/// Values that populate the selector widgets of the three views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorOptions {
    pub categories: Vec<String>,
    /// Product keys of the selected category, or of all products
    pub product_keys: Vec<String>,
    pub reference_brands: Vec<String>,
    pub reference_codes: Vec<String>,
    pub application_brands: Vec<String>,
    pub application_references: Vec<String>,
}

/// Composable row filter and projection over a table.
#[derive(Debug)]
pub struct TableQuery<'a> {
    table: &'a Table,
    equals: Vec<(String, String)>,
    any_of: Vec<(String, HashSet<String>)>,
    projection: Option<Vec<String>>,
}

impl<'a> TableQuery<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            equals: Vec::new(),
            any_of: Vec::new(),
            projection: None,
        }
    }

    /// Keep rows whose `column` equals `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((column.into(), value.into()));
        self
    }

    /// Keep rows whose `column` is one of `values`; an empty set keeps all.
    pub fn any_of<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = values.into_iter().map(Into::into).collect();
        if !set.is_empty() {
            self.any_of.push((column.into(), set));
        }
        self
    }

    /// Keep only these columns, in this order. Unknown names are skipped.
    pub fn project<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Run the query. A filter on a missing column matches no row.
    pub fn run(self) -> Table {
        let equals: Vec<(Option<usize>, &str)> = self
            .equals
            .iter()
            .map(|(col, val)| (self.table.column_index(col), val.as_str()))
            .collect();
        let any_of: Vec<(Option<usize>, &HashSet<String>)> = self
            .any_of
            .iter()
            .map(|(col, set)| (self.table.column_index(col), set))
            .collect();

        let selected: Vec<usize> = match &self.projection {
            Some(names) => names
                .iter()
                .filter_map(|n| self.table.column_index(n))
                .collect(),
            None => (0..self.table.width()).collect(),
        };

        let mut out = Table::new(selected.iter().map(|&i| self.table.headers[i].clone()));
        for row in &self.table.rows {
            let keep_eq = equals
                .iter()
                .all(|(idx, val)| idx.is_some_and(|i| row[i] == *val));
            let keep_any = any_of
                .iter()
                .all(|(idx, set)| idx.is_some_and(|i| set.contains(&row[i])));
            if keep_eq && keep_any {
                out.push_row(selected.iter().map(|&i| row[i].clone()).collect());
            }
        }
        out
    }
}

/// Sorted distinct non-blank values of a column.
pub fn distinct_values(table: &Table, column: &str) -> Vec<String> {
    table
        .column_values(column)
        .map(|values| {
            values
                .filter(|v| !v.trim().is_empty())
                .map(String::from)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

/// Sorted category values present in the merged table.
pub fn categories(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .category_columns
        .categories()
        .map(String::from)
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Products of a category, ready to feed an identifier selector.
pub fn product_keys(snapshot: &Snapshot, category: Option<&str>) -> Vec<String> {
    let mut query = TableQuery::new(&snapshot.merged);
    if let Some(cat) = category.filter(|c| !c.trim().is_empty()) {
        query = query.eq(snapshot.category_column.as_str(), cat);
    }
    distinct_values(&query.run(), &snapshot.product_key_column)
}

/// Everything the selectors need, with product keys narrowed to `category`.
pub fn selector_options(snapshot: &Snapshot, category: Option<&str>) -> SelectorOptions {
    SelectorOptions {
        categories: categories(snapshot),
        product_keys: product_keys(snapshot, category),
        reference_brands: distinct_values(&snapshot.references, columns::COMPANY_NAME),
        reference_codes: distinct_values(&snapshot.references, columns::RELATION_CODE),
        application_brands: distinct_values(&snapshot.applications, columns::BRAND_APP),
        application_references: distinct_values(&snapshot.applications, columns::REFERENCE_APP),
    }
}

/// Product tab: category, then identifier, then column projection.
pub fn product_view(snapshot: &Snapshot, filter: &ProductFilter) -> Table {
    let mut query = TableQuery::new(&snapshot.merged);
    let category = non_blank(&filter.category);

    if let Some(cat) = category {
        if snapshot.merged.has_column(&snapshot.category_column) {
            query = query.eq(snapshot.category_column.as_str(), cat);
        }
    }
    if let Some(key) = non_blank(&filter.product_key) {
        query = query.eq(snapshot.product_key_column.as_str(), key);
    }

    // Unindexed categories show every column
    let projection = match (&filter.columns, category) {
        (Some(cols), _) => Some(cols.clone()),
        (None, Some(cat)) => snapshot.category_columns.get(cat).map(<[String]>::to_vec),
        (None, None) => None,
    };
    if let Some(cols) = projection {
        query = query.project(cols);
    }

    query.run()
}

/// Reference tab over the uploaded reference table.
pub fn reference_view(snapshot: &Snapshot, filter: &ValueSetFilter) -> Table {
    TableQuery::new(&snapshot.references)
        .any_of(columns::COMPANY_NAME, filter.brands.iter().cloned())
        .any_of(columns::RELATION_CODE, filter.references.iter().cloned())
        .run()
}

/// Application tab over the normalized application table.
pub fn application_view(snapshot: &Snapshot, filter: &ValueSetFilter) -> Table {
    TableQuery::new(&snapshot.applications)
        .any_of(columns::BRAND_APP, filter.brands.iter().cloned())
        .any_of(columns::REFERENCE_APP, filter.references.iter().cloned())
        .run()
}
