//! # Partlens - product, cross-reference and application table reshaping
//!
//! Partlens loads three tabular files (products, cross-references,
//! applications), reshapes them into a product-centric view and serves
//! filtered views of the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ CSV / XLSX   │────▶│   Parser    │────▶│  Transform   │────▶│  Snapshot   │
//! │ (3 files)    │     │  (auto-enc) │     │ pivot, merge │     │  (cached)   │
//! └──────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use partlens::{run_pipeline, InputFile, PipelineInputs, PipelineOptions};
//!
//! let inputs = PipelineInputs::new(
//!     InputFile::read("products.csv")?,
//!     InputFile::read("references.csv")?,
//!     InputFile::read("applications.xlsx")?,
//! );
//! let snapshot = run_pipeline(&inputs, &PipelineOptions::default())?;
//! println!("{} products, pivot width {}", snapshot.merged.len(), snapshot.pivot_width);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`models`] - Tables, join keys, diagnostics
//! - [`parser`] - CSV and workbook loading with auto-detection
//! - [`transform`] - Pivot, merge, category index, applications, pipeline
//! - [`cache`] - Fingerprinted snapshot cache
//! - [`query`] - Read-only views over a snapshot
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Loading
pub mod parser;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// Views
pub mod query;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{LoadError, LoadResult, PipelineError, PipelineResult, ServerError, ServerResult};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CategoryColumnMap, Degradation, Diagnostics, JoinKey, KeyOrigin, Row, Table, TableKind,
};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_delimited,
    parse_file_auto, LoadedTable, SourceFormat,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    index_categories, merge_products, normalize_applications, normalize_key, pivot_references,
    run_pipeline, run_tables, InputFile, PipelineInputs, PipelineOptions, Snapshot,
};

// =============================================================================
// Re-exports - Cache and views
// =============================================================================

pub use cache::{CacheOutcome, InputFingerprint, SnapshotCache};
pub use query::{ProductFilter, SelectorOptions, TableQuery, ValueSetFilter};

// Server
pub mod server {
    pub use crate::api::server::{build_router, start_server};
}
