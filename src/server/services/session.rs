use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::server::models::chat::{Message, MessageError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    InvalidMessage(#[from] MessageError),
}

/// A server-held conversation transcript. `messages` is in insertion order
/// and is sent verbatim to the model as conversation history.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// In-memory session registry shared by every handler. All mutation goes
/// through the write lock; readers get point-in-time clones so a concurrent
/// append can never produce a torn view of a session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh session with an empty transcript. UUIDv7 ids are
    /// time-ordered and unique even for creates in the same nanosecond.
    pub async fn create(&self) -> Session {
        let now = Utc::now();
        let session = Session {
            id: format!("sess_{}", Uuid::now_v7()),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        debug!(session = %session.id, "created session");
        session
    }

    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    /// Validates the message, then appends it and advances `updated_at`.
    /// A message that fails validation never touches the transcript.
    pub async fn append(&self, id: &str, message: Message) -> Result<(), SessionError> {
        message.validate()?;
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        session.messages.push(message);
        let now = Utc::now();
        // updated_at must strictly advance even if the clock is too coarse
        // to have moved since the last write
        session.updated_at = if now > session.updated_at {
            now
        } else {
            session.updated_at + chrono::Duration::nanoseconds(1)
        };
        Ok(())
    }

    /// Point-in-time snapshot of every session, taken under one read lock.
    pub async fn list(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(SessionError::NotFound)
    }

    /// Removes every session idle for longer than `idle_timeout` and returns
    /// how many were dropped. Holds the write lock for the whole pass, so a
    /// session being appended to in the same epoch cannot be swept.
    pub async fn sweep_once(&self, idle_timeout: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(idle_timeout)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return 0;
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at >= cutoff);
        before - sessions.len()
    }

    /// Periodic expiration sweep, bound to the process lifetime. Runs until
    /// the shutdown signal flips, then returns so shutdown is deterministic.
    pub async fn run_sweeper(
        &self,
        idle_timeout: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            timeout_secs = idle_timeout.as_secs(),
            interval_secs = interval.as_secs(),
            "session sweeper started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; skip it so sweeps happen
        // one full interval apart
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_once(idle_timeout).await;
                    if removed > 0 {
                        info!(removed, "expired idle sessions");
                    }
                }
                _ = shutdown.changed() => {
                    info!("session sweeper stopping");
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    async fn backdate(&self, id: &str, updated_at: DateTime<Utc>) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.updated_at = updated_at;
        }
    }
}
