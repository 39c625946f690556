use crate::error::{Error, Result};
use crate::session::Transcript;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct ChatSession {
    pub transcript: Transcript,
}

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    created_at: DateTime<Utc>,
    last_used: Instant,
}

/// Live chat sessions. Each session sits behind its own lock so one
/// interaction at a time touches its transcript.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, system_prompt: String) -> Uuid {
        let id = Uuid::new_v4();
        let entry = SessionEntry {
            session: Arc::new(Mutex::new(ChatSession {
                transcript: Transcript::new(system_prompt),
            })),
            created_at: Utc::now(),
            last_used: Instant::now(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, entry);
        id
    }

    /// Fetch a session and mark it as used.
    pub async fn get(&self, id: &Uuid) -> Result<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        entry.last_used = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Drop sessions untouched for at least `max_idle`. A session still held
    /// by an interaction is kept. Returns how many were dropped.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, entry| {
            let in_use = Arc::strong_count(&entry.session) > 1;
            if in_use || entry.last_used.elapsed() < max_idle {
                return true;
            }
            let age = Utc::now() - entry.created_at;
            tracing::info!(session = %id, age_mins = age.num_minutes(), "session expired");
            false
        });

        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically drop idle sessions until the process exits.
pub fn spawn_expiry(store: Arc<SessionStore>, max_idle: Duration) -> tokio::task::JoinHandle<()> {
    let period = (max_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let dropped = store.expire_idle(max_idle).await;
            if dropped > 0 {
                let remaining = store.len().await;
                tracing::debug!(dropped, remaining, "idle sessions swept");
            }
        }
    })
}
