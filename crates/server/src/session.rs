//! Session Management
//!
//! Bounded in-memory registry of conversation sessions.
//!
//! Each entry wraps its [`ConversationSession`] in a `tokio::sync::Mutex`
//! that is held for a whole turn, oracle calls included, so messages for
//! one session are processed one at a time. The registry map itself sits
//! behind a `parking_lot::RwLock` that is never held across an await.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use loan_agent_agent::ConversationSession;
use loan_agent_config::SessionConfig;

use crate::metrics::{record_session_created, record_sessions_evicted};

/// A registered session
pub struct SessionEntry {
    pub id: String,
    pub session: tokio::sync::Mutex<ConversationSession>,
    last_activity: Mutex<Instant>,
}

impl SessionEntry {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            session: tokio::sync::Mutex::new(ConversationSession::new(id)),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.lock().elapsed() > timeout
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    max_sessions: usize,
    idle_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(
            config.max_sessions,
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.cleanup_interval_secs),
        )
    }

    pub fn with_limits(max_sessions: usize, idle_timeout: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically evicts idle sessions
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed = removed,
                                remaining = manager.count(),
                                "Session cleanup"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a session with a server-assigned id
    pub fn create(&self) -> Arc<SessionEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        self.get_or_create(&id)
    }

    /// Fetch a session, creating it on first use
    pub fn get_or_create(&self, id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.get(id) {
            entry.touch();
            return entry;
        }

        let mut sessions = self.sessions.write();
        // Another request may have created it between the two locks
        if let Some(entry) = sessions.get(id) {
            entry.touch();
            return entry.clone();
        }

        if sessions.len() >= self.max_sessions {
            self.make_room(&mut sessions);
        }

        let entry = Arc::new(SessionEntry::new(id));
        sessions.insert(id.to_string(), entry.clone());
        record_session_created();
        tracing::info!(session_id = %id, total = sessions.len(), "Created session");

        entry
    }

    /// Get a session by id
    pub fn get(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session, returning whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    /// Get active session count
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// List all session ids
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Evict sessions idle longer than the timeout
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<SessionEntry>>) -> usize {
        let timeout = self.idle_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "Expired session");
        }
        if !expired.is_empty() {
            record_sessions_evicted(expired.len());
        }
        expired.len()
    }

    /// Free a slot: expired sessions first, then the least recently active
    fn make_room(&self, sessions: &mut HashMap<String, Arc<SessionEntry>>) {
        self.cleanup_expired_internal(sessions);
        if sessions.len() < self.max_sessions {
            return;
        }

        let oldest = sessions
            .iter()
            .min_by_key(|(_, s)| s.last_activity())
            .map(|(id, _)| id.clone());

        if let Some(id) = oldest {
            sessions.remove(&id);
            record_sessions_evicted(1);
            tracing::warn!(session_id = %id, "Session registry full, evicted least recently active");
        }
    }
}
