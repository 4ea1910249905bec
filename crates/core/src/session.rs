//! In-Process Conversation Memory
//!
//! This module implements the session store: a process-lifetime map from an
//! opaque thread identifier to an ordered, append-only conversation history.
//! Threads are created implicitly on first use and never destroyed.
//!
//! Each thread's history sits behind its own async mutex so that a request's
//! read-then-append sequence can be serialized against other requests on the
//! same thread, while requests on different threads proceed independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// Errors raised by the session store.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Thread '{0}' not found")]
    NotFound(String),
}

/// The author of a single turn within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message within a thread's history. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a user turn stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an assistant turn stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A single conversation context: an identifier plus its ordered turns.
///
/// The turn list is append-only; it is only reachable through the store's
/// per-thread mutex, which is what serializes concurrent access.
#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: String,
    pub created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl Thread {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// The turns recorded so far, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Appends a turn to the end of the history.
    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

/// Owns all conversation threads for the lifetime of the process.
///
/// The outer `RwLock` guards only map membership. Mutating a thread's
/// history requires locking that thread's own mutex, so holding the handle
/// returned by [`SessionStore::thread`] across an await point (for example a
/// model call) serializes same-thread requests without blocking others.
#[derive(Default)]
pub struct SessionStore {
    threads: RwLock<HashMap<String, Arc<Mutex<Thread>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a caller-supplied thread id, creating the thread on first
    /// use, or generates a fresh identifier when none was supplied.
    ///
    /// A known id is returned unchanged without touching its history.
    pub async fn resolve_or_create(&self, thread_id: Option<&str>) -> String {
        let id = match thread_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut threads = self.threads.write().await;
        threads.entry(id.clone()).or_insert_with(|| {
            info!(thread_id = %id, "Creating new conversation thread");
            Arc::new(Mutex::new(Thread::new(id.clone())))
        });
        id
    }

    /// Returns the handle for a thread's history.
    ///
    /// Callers that read the history and later append to it must keep the
    /// handle's mutex locked for the whole sequence.
    pub async fn thread(&self, thread_id: &str) -> Result<Arc<Mutex<Thread>>, SessionError> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(thread_id.to_string()))
    }

    /// Snapshot of a thread's turns, oldest first.
    pub async fn get_history(&self, thread_id: &str) -> Result<Vec<Turn>, SessionError> {
        let handle = self.thread(thread_id).await?;
        let thread = handle.lock().await;
        Ok(thread.turns().to_vec())
    }

    /// Appends a turn to the end of a thread's history.
    pub async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), SessionError> {
        let handle = self.thread(thread_id).await?;
        handle.lock().await.record(turn);
        Ok(())
    }

    /// Whether a thread exists under the given identifier.
    pub async fn contains(&self, thread_id: &str) -> bool {
        self.threads.read().await.contains_key(thread_id)
    }
}
