use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::session::{Session, SessionSummary};

/// Owns all live sessions. The per-session `Mutex` serializes message
/// processing for one session id; the outer map only guards registry
/// mutation, so concurrent traffic on different sessions never contends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session);
    async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>>;
    async fn remove(&self, id: Uuid) -> bool;
    async fn summaries(&self) -> HashMap<Uuid, SessionSummary>;
    /// Drop sessions idle longer than `max_idle`. Sessions currently
    /// processing a message are skipped. Returns the number evicted.
    async fn evict_idle(&self, max_idle: Duration) -> usize;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, Arc::new(Mutex::new(session)));
    }

    async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).cloned()
    }

    async fn remove(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id).is_some()
    }

    async fn summaries(&self) -> HashMap<Uuid, SessionSummary> {
        let handles: Vec<(Uuid, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.read().await;
            sessions.iter().map(|(id, s)| (*id, s.clone())).collect()
        };
        let mut out = HashMap::new();
        for (id, handle) in handles {
            let session = handle.lock().await;
            out.insert(
                id,
                SessionSummary {
                    last_activity: session.last_activity,
                    message_count: session.messages.len(),
                    preloaded_data: session.preloaded,
                },
            );
        }
        out
    }

    async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let handles: Vec<(Uuid, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.read().await;
            sessions.iter().map(|(id, s)| (*id, s.clone())).collect()
        };
        let mut stale = Vec::new();
        for (id, handle) in handles {
            // A locked session is mid-turn and therefore not idle.
            if let Ok(session) = handle.try_lock() {
                if session.last_activity < cutoff {
                    stale.push(id);
                }
            }
        }
        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for id in stale {
            if sessions.remove(&id).is_some() {
                tracing::info!(session_id = %id, "evicted idle session");
                evicted += 1;
            }
        }
        evicted
    }
}
