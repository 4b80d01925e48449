//! Pipeline log stream.
//!
//! Pipeline progress is published on a broadcast channel that the SSE
//! endpoint forwards to clients, and mirrored as `tracing` events for the
//! process log.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tokio::sync::broadcast;

/// Log level for frontend display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth for display
    #[serde(default)]
    pub indent: u8,
    /// Session the entry belongs to; `None` for server-wide entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
            session_id: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Whether a stream subscribed to `session` should receive this entry.
    ///
    /// Server-wide entries go to everyone, session entries only to that
    /// session's stream.
    pub fn visible_to(&self, session: Option<&str>) -> bool {
        match (&self.session_id, session) {
            (None, _) => true,
            (Some(own), Some(wanted)) => own == wanted,
            (Some(_), None) => false,
        }
    }
}

thread_local! {
    static SESSION_SCOPE: RefCell<Option<String>> = const { RefCell::new(None) };
}

struct ScopeGuard(Option<String>);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.0.take();
        SESSION_SCOPE.with(|scope| *scope.borrow_mut() = previous);
    }
}

/// Run `f` with every log entry it emits on this thread tagged with
/// `session_id`.
pub fn with_session<R>(session_id: &str, f: impl FnOnce() -> R) -> R {
    let previous = SESSION_SCOPE.with(|scope| scope.replace(Some(session_id.to_string())));
    let _guard = ScopeGuard(previous);
    f()
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all connected SSE clients
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, mut entry: LogEntry) {
        if entry.session_id.is_none() {
            entry.session_id = SESSION_SCOPE.with(|scope| scope.borrow().clone());
        }

        let indent = entry.indent;
        let session = entry.session_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Info => tracing::info!(indent, session, "{}", entry.message),
            LogLevel::Success => tracing::info!(indent, session, success = true, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(indent, session, "{}", entry.message),
            LogLevel::Error => tracing::error!(indent, session, "{}", entry.message),
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::info(msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_receives_entries() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.log(LogEntry::warning("missing column").with_indent(1));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.message, "missing column");
        assert_eq!(entry.indent, 1);
    }

    #[test]
    fn test_session_scope_tags_entries() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        with_session("abc", || broadcaster.log(LogEntry::info("pivoting")));
        broadcaster.log(LogEntry::info("server started"));

        let tagged = rx.try_recv().unwrap();
        assert_eq!(tagged.session_id.as_deref(), Some("abc"));
        let untagged = rx.try_recv().unwrap();
        assert_eq!(untagged.session_id, None);
    }

    #[test]
    fn test_entries_only_reach_their_session() {
        let own = LogEntry::info("merging").for_session("a");
        assert!(own.visible_to(Some("a")));
        assert!(!own.visible_to(Some("b")));
        assert!(!own.visible_to(None));

        let global = LogEntry::info("listening");
        assert!(global.visible_to(Some("b")));
        assert!(global.visible_to(None));
    }

    #[test]
    fn test_log_without_subscribers_does_not_fail() {
        LogBroadcaster::new().log(LogEntry::info("nobody listening"));
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(LogEntry::success("done")).unwrap();
        assert_eq!(json["level"], "success");
        assert_eq!(json["message"], "done");
        assert_eq!(json["indent"], 0);
        assert!(json.get("sessionId").is_none());
    }
}
