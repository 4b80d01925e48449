//! Snapshot cache - reuse pipeline results for an unchanged batch
//!
//! A cache belongs to one session. It remembers the last snapshot together
//! with the fingerprint of the inputs that produced it; uploading the same
//! three files again returns that snapshot, anything else recomputes and
//! replaces it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::logs::{log_info, log_success};
use crate::error::PipelineResult;
use crate::models::TableKind;
use crate::transform::pipeline::{run_fingerprinted, PipelineInputs, PipelineOptions, Snapshot};

/// SHA-256 over the three input files and the pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputFingerprint(String);

impl InputFingerprint {
    /// Hash file contents (not names) and options.
    pub fn compute(inputs: &PipelineInputs, options: &PipelineOptions) -> Self {
        let mut hasher = Sha256::new();

        for kind in TableKind::ALL {
            hasher.update(kind.as_str().as_bytes());
            match inputs.get(kind) {
                Some(file) => {
                    hasher.update((file.bytes.len() as u64).to_le_bytes());
                    hasher.update(&file.bytes);
                }
                None => hasher.update([0u8]),
            }
        }

        hasher.update(options.product_id_column.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.category_column.as_bytes());
        hasher.update([0u8]);
        hasher.update((options.min_pivot_width as u64).to_le_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

/// A snapshot and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub snapshot: Arc<Snapshot>,
    pub cached: bool,
}

/// Single-entry cache of the current snapshot
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entry: Option<(InputFingerprint, Arc<Snapshot>)>,
    hits: u64,
    misses: u64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot for these inputs or compute a new one.
    ///
    /// On error the previous snapshot stays in place.
    pub fn get_or_compute(
        &mut self,
        inputs: &PipelineInputs,
        options: &PipelineOptions,
    ) -> PipelineResult<CacheOutcome> {
        inputs.ensure_complete()?;
        let fingerprint = InputFingerprint::compute(inputs, options);

        if let Some((cached, snapshot)) = &self.entry {
            if *cached == fingerprint {
                self.hits += 1;
                log_success(format!("♻️  Inputs unchanged ({}), reusing snapshot", fingerprint.short()));
                return Ok(CacheOutcome {
                    snapshot: Arc::clone(snapshot),
                    cached: true,
                });
            }
        }

        self.misses += 1;
        log_info(format!("New batch {}, running pipeline", fingerprint.short()));
        let snapshot = Arc::new(run_fingerprinted(inputs, options, fingerprint.clone())?);
        self.entry = Some((fingerprint, Arc::clone(&snapshot)));

        Ok(CacheOutcome {
            snapshot,
            cached: false,
        })
    }

    /// The current snapshot, if any.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.entry.as_ref().map(|(_, s)| Arc::clone(s))
    }

    /// Drop the current snapshot.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::transform::pipeline::InputFile;

    fn file(content: &str) -> InputFile {
        InputFile::new(Some("f.csv".into()), content.as_bytes().to_vec())
    }

    fn inputs(products: &str) -> PipelineInputs {
        PipelineInputs::new(
            file(products),
            file("code,company_name,relation_code\n7,X,R1\n"),
            file("code,company_name,relation_code\nS1,B,\"1,2\"\n"),
        )
    }

    #[test]
    fn test_same_inputs_hit_cache() {
        let mut cache = SnapshotCache::new();
        let opts = PipelineOptions::default();

        let first = cache.get_or_compute(&inputs("product_code\n7\n"), &opts).unwrap();
        let second = cache.get_or_compute(&inputs("product_code\n7\n"), &opts).unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_changed_input_recomputes() {
        let mut cache = SnapshotCache::new();
        let opts = PipelineOptions::default();

        let first = cache.get_or_compute(&inputs("product_code\n7\n"), &opts).unwrap();
        let second = cache.get_or_compute(&inputs("product_code\n8\n"), &opts).unwrap();

        assert!(!second.cached);
        assert!(!Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert!(Arc::ptr_eq(&cache.current().unwrap(), &second.snapshot));
    }

    #[test]
    fn test_changed_options_recompute() {
        let mut cache = SnapshotCache::new();
        let batch = inputs("product_code\n7\n");

        cache.get_or_compute(&batch, &PipelineOptions::default()).unwrap();
        let opts = PipelineOptions {
            min_pivot_width: 4,
            ..PipelineOptions::default()
        };
        let outcome = cache.get_or_compute(&batch, &opts).unwrap();

        assert!(!outcome.cached);
        assert_eq!(outcome.snapshot.pivot_width, 4);
    }

    #[test]
    fn test_failed_batch_keeps_previous_snapshot() {
        let mut cache = SnapshotCache::new();
        let opts = PipelineOptions::default();
        let good = cache.get_or_compute(&inputs("product_code\n7\n"), &opts).unwrap();

        let err = cache.get_or_compute(&inputs(""), &opts).unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
        assert!(Arc::ptr_eq(&cache.current().unwrap(), &good.snapshot));
    }

    #[test]
    fn test_fingerprint_ignores_file_names() {
        let opts = PipelineOptions::default();
        let a = inputs("product_code\n7\n");
        let mut b = a.clone();
        b.products.as_mut().unwrap().name = Some("renamed.csv".into());

        assert_eq!(InputFingerprint::compute(&a, &opts), InputFingerprint::compute(&b, &opts));
        assert_eq!(InputFingerprint::compute(&a, &opts).as_str().len(), 64);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = SnapshotCache::new();
        cache
            .get_or_compute(&inputs("product_code\n7\n"), &PipelineOptions::default())
            .unwrap();
        cache.invalidate();
        assert!(cache.current().is_none());
    }
}
