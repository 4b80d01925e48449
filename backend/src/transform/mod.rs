//! Transformation module.
//!
//! This module reshapes the three input tables:
//! - Key: leading-zero tolerant join keys
//! - Pivot: repeated references to one wide row per code
//! - Merge: products left-joined with pivoted references
//! - Schema index: available columns per category
//! - Applications: comma-packed references to one row each
//! - Pipeline: composition into an immutable snapshot

pub mod applications;
pub mod key;
pub mod merge;
pub mod pipeline;
pub mod pivot;
pub mod schema_index;

pub use applications::{explode_record, normalize_applications, split_relations, ApplicationResult};
pub use key::normalize_key;
pub use merge::{merge_products, MergeResult};
pub use pipeline::*;
pub use pivot::{pivot_records, pivot_references, PivotResult};
pub use schema_index::index_categories;
