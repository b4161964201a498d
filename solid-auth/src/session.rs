//! Session store
//!
//! Maps opaque session ids to credentials. Each entry owns a timer task that
//! deletes it once its TTL has elapsed; lookups additionally refuse entries
//! whose deadline has passed, so an expired session is never observable even
//! if its timer has not run yet.

use crate::credential::Credential;
use crate::error::{Result, SolidError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Longest accepted session lifetime
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const MISSING_SESSION: &str =
    "Missing sessionId. Please login first using the 'solid_login' tool to obtain one.";
pub(crate) const UNKNOWN_SESSION: &str =
    "Session not found or expired. Please login again using the 'solid_login' tool.";

/// Opaque session identifier (random UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public metadata of a live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub web_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

struct SessionEntry {
    credential: Credential,
    info: SessionInfo,
    deadline: Instant,
    expiry: AbortHandle,
}

impl SessionEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.deadline
    }
}

type SessionMap = HashMap<String, SessionEntry>;

/// Sole owner of the session id -> credential mapping
#[derive(Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential under a fresh id and schedule its removal
    pub async fn create(
        &self,
        credential: Credential,
        web_id: impl Into<String>,
        ttl: Duration,
    ) -> SessionId {
        let ttl = ttl.min(MAX_SESSION_TTL);
        let id = SessionId::generate();
        let deadline = Instant::now() + ttl;
        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());

        let mut sessions = self.sessions.write().await;

        let weak = Arc::downgrade(&self.sessions);
        let key = id.to_string();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(sessions) = weak.upgrade() {
                if sessions.write().await.remove(&key).is_some() {
                    info!(session_id = %key, "Session expired");
                }
            }
        })
        .abort_handle();

        sessions.insert(
            id.to_string(),
            SessionEntry {
                credential,
                info: SessionInfo {
                    web_id: web_id.into(),
                    created_at,
                    expires_at,
                },
                deadline,
                expiry,
            },
        );

        info!(session_id = %id, ttl_secs = ttl.as_secs(), "Session created");
        id
    }

    /// Look up the credential of a live session. Does not extend its TTL.
    pub async fn resolve(&self, session_id: Option<&str>) -> Result<Credential> {
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SolidError::BadRequest(MISSING_SESSION.to_string()))?;

        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) if entry.is_live() => Ok(entry.credential.clone()),
            _ => {
                debug!(session_id, "Rejected unknown or expired session");
                Err(SolidError::Unauthorized(UNKNOWN_SESSION.to_string()))
            }
        }
    }

    /// Remove a session before its TTL; returns whether a live one existed
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(entry) => {
                entry.expiry.abort();
                let live = entry.is_live();
                if live {
                    info!(session_id, "Session removed");
                }
                live
            }
            None => false,
        }
    }

    /// Metadata of a live session
    pub async fn info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.info.clone())
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Ok(sessions) = self.sessions.try_read() {
            for entry in sessions.values() {
                entry.expiry.abort();
            }
        }
    }
}
