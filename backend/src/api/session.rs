//! Per-user sessions.
//!
//! Each session owns the files uploaded so far and its own
//! [`SnapshotCache`]. Files may arrive in several uploads; the pipeline runs
//! once all three are present.
//!
//! The store lock only guards the id → session map. A pipeline run holds
//! its own session's work lock, so other sessions and snapshot reads are
//! never blocked by it. Sessions idle for longer than the store's TTL are
//! evicted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api::logs::{log_info, with_session, LogEntry, LOG_BROADCASTER};
use crate::cache::{CacheOutcome, SnapshotCache};
use crate::error::{ServerError, ServerResult};
use crate::models::TableKind;
use crate::transform::pipeline::{InputFile, PipelineInputs, PipelineOptions, Snapshot};

const ENV_SESSION_TTL_SECS: &str = "PARTLENS_SESSION_TTL_SECS";

/// Idle time after which a session is dropped
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

fn lock<T>(mutex: &Mutex<T>) -> ServerResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ServerError::Internal("session lock poisoned".to_string()))
}

/// Uploaded files and the cache built from them
#[derive(Debug, Default)]
struct SessionWork {
    inputs: PipelineInputs,
    cache: SnapshotCache,
}

/// One user's uploads and cached snapshot
#[derive(Debug)]
pub struct Session {
    pub created_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
    /// Held for the whole pipeline run
    work: Mutex<SessionWork>,
    /// Last successful snapshot, readable while a run is in progress
    published: Mutex<Option<Arc<Snapshot>>>,
}

impl Session {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
            work: Mutex::new(SessionWork::default()),
            published: Mutex::new(None),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_access.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Session TTL from `PARTLENS_SESSION_TTL_SECS`, or the default.
pub fn idle_ttl_from_env() -> Duration {
    match std::env::var(ENV_SESSION_TTL_SECS) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(value = %raw, "ignoring invalid {}", ENV_SESSION_TTL_SECS);
                DEFAULT_IDLE_TTL
            }
        },
        Err(_) => DEFAULT_IDLE_TTL,
    }
}

/// Shared map of sessions, cheap to clone into handlers
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    options: Arc<PipelineOptions>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            options: Arc::new(options),
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Look a session up and mark it as used.
    fn get(&self, id: &str) -> ServerResult<Arc<Session>> {
        let session = lock(&self.sessions)?
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))?;
        session.touch();
        Ok(session)
    }

    /// Create an empty session and return its id.
    pub fn create(&self) -> ServerResult<String> {
        self.evict_idle()?;

        let id = Uuid::new_v4().to_string();
        lock(&self.sessions)?.insert(id.clone(), Arc::new(Session::new()));
        LOG_BROADCASTER.log(LogEntry::info(format!("Session {} created", id)).for_session(&id));
        Ok(id)
    }

    /// Discard a session and its snapshot.
    pub fn remove(&self, id: &str) -> ServerResult<()> {
        lock(&self.sessions)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))
    }

    /// Drop sessions idle for longer than the TTL; returns how many.
    ///
    /// Sessions with a pipeline run in progress are never evicted.
    pub fn evict_idle(&self) -> ServerResult<usize> {
        let ttl = self.idle_ttl;
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < ttl || session.work.try_lock().is_err());
        let evicted = before - sessions.len();
        drop(sessions);

        if evicted > 0 {
            log_info(format!("Evicted {} idle session(s)", evicted));
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store uploaded files and run the pipeline if the batch is complete.
    ///
    /// Files from earlier uploads are kept, so the three tables can arrive
    /// separately. An incomplete batch fails with `MissingInput`. Uploads to
    /// the same session run one at a time.
    pub fn upload(&self, id: &str, files: Vec<(TableKind, InputFile)>) -> ServerResult<CacheOutcome> {
        let session = self.get(id)?;
        let mut work = lock(&session.work)?;

        for (kind, file) in files {
            work.inputs.set(kind, file);
        }

        let SessionWork { inputs, cache } = &mut *work;
        let outcome = with_session(id, || cache.get_or_compute(inputs, &self.options))?;

        *lock(&session.published)? = Some(Arc::clone(&outcome.snapshot));
        session.touch();
        Ok(outcome)
    }

    /// The session's current snapshot.
    pub fn snapshot(&self, id: &str) -> ServerResult<Arc<Snapshot>> {
        let session = self.get(id)?;
        let published = lock(&session.published)?.clone();
        published.ok_or_else(|| ServerError::NoSnapshot(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn file(content: &str) -> InputFile {
        InputFile::new(None, content.as_bytes().to_vec())
    }

    fn store() -> SessionStore {
        SessionStore::new(PipelineOptions::default())
    }

    #[test]
    fn test_unknown_session() {
        let store = store();
        assert!(matches!(store.snapshot("nope"), Err(ServerError::SessionNotFound(_))));
        assert!(matches!(store.remove("nope"), Err(ServerError::SessionNotFound(_))));
    }

    #[test]
    fn test_files_accumulate_across_uploads() {
        let store = store();
        let id = store.create().unwrap();

        let first = store.upload(
            &id,
            vec![(TableKind::Products, file("product_code,category_text\n007,A\n"))],
        );
        match first {
            Err(ServerError::Pipeline(PipelineError::MissingInput(kinds))) => {
                assert_eq!(kinds, vec![TableKind::References, TableKind::Applications]);
            }
            other => panic!("expected MissingInput, got {:?}", other.map(|o| o.cached)),
        }
        assert!(matches!(store.snapshot(&id), Err(ServerError::NoSnapshot(_))));

        let outcome = store
            .upload(
                &id,
                vec![
                    (TableKind::References, file("code,company_name,relation_code\n7,X,R1\n")),
                    (TableKind::Applications, file("code,company_name,relation_code\nS,B,1\n")),
                ],
            )
            .unwrap();

        assert!(!outcome.cached);
        let snapshot = store.snapshot(&id).unwrap();
        assert_eq!(snapshot.merged.row(0).unwrap().value("brand1"), "X");
    }

    #[test]
    fn test_reupload_same_files_is_cached() {
        let store = store();
        let id = store.create().unwrap();
        let batch = || {
            vec![
                (TableKind::Products, file("product_code\n1\n")),
                (TableKind::References, file("code,company_name,relation_code\n1,X,R\n")),
                (TableKind::Applications, file("code,company_name,relation_code\nS,B,1\n")),
            ]
        };

        assert!(!store.upload(&id, batch()).unwrap().cached);
        assert!(store.upload(&id, batch()).unwrap().cached);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = store();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store
            .upload(
                &a,
                vec![
                    (TableKind::Products, file("product_code\n1\n")),
                    (TableKind::References, file("code,company_name,relation_code\n1,X,R\n")),
                    (TableKind::Applications, file("code,company_name,relation_code\nS,B,1\n")),
                ],
            )
            .unwrap();

        assert!(store.snapshot(&a).is_ok());
        assert!(matches!(store.snapshot(&b), Err(ServerError::NoSnapshot(_))));

        store.remove(&a).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_running_upload_does_not_block_other_sessions() {
        use std::sync::mpsc;

        let store = store();
        let busy = store.create().unwrap();
        let idle = store.create().unwrap();

        // Hold the busy session's work lock as a running pipeline would
        let session = store.get(&busy).unwrap();
        let _running = session.work.lock().unwrap();

        let (tx, rx) = mpsc::channel();
        let reader = store.clone();
        std::thread::spawn(move || {
            let other = reader.snapshot(&idle);
            let same = reader.snapshot(&busy);
            let count = reader.len();
            let _ = tx.send((other.is_err(), same.is_err(), count));
        });

        let (other_err, same_err, count) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reads must not wait for a running upload");
        assert!(other_err);
        assert!(same_err);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let store = store().with_idle_ttl(Duration::ZERO);
        let id = store.create().unwrap();

        assert_eq!(store.evict_idle().unwrap(), 1);
        assert!(store.is_empty());
        assert!(matches!(store.snapshot(&id), Err(ServerError::SessionNotFound(_))));
    }

    #[test]
    fn test_busy_session_survives_eviction() {
        let store = store().with_idle_ttl(Duration::ZERO);
        let id = store.create().unwrap();

        let session = store.get(&id).unwrap();
        let running = session.work.lock().unwrap();
        assert_eq!(store.evict_idle().unwrap(), 0);

        drop(running);
        assert_eq!(store.evict_idle().unwrap(), 1);
    }

    #[test]
    fn test_active_sessions_are_kept() {
        let store = store().with_idle_ttl(Duration::from_secs(3600));
        let id = store.create().unwrap();

        assert_eq!(store.evict_idle().unwrap(), 0);
        assert!(matches!(store.snapshot(&id), Err(ServerError::NoSnapshot(_))));
    }

    #[test]
    fn test_failed_upload_keeps_previous_snapshot() {
        let store = store();
        let id = store.create().unwrap();
        store
            .upload(
                &id,
                vec![
                    (TableKind::Products, file("product_code\n1\n")),
                    (TableKind::References, file("code,company_name,relation_code\n1,X,R\n")),
                    (TableKind::Applications, file("code,company_name,relation_code\nS,B,1\n")),
                ],
            )
            .unwrap();

        let failed = store.upload(&id, vec![(TableKind::Products, file(""))]);
        assert!(matches!(failed, Err(ServerError::Pipeline(PipelineError::Load { .. }))));
        assert_eq!(store.snapshot(&id).unwrap().merged.len(), 1);
    }
}
