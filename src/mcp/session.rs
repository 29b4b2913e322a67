//! Client sessions and per-request accounting.
//!
//! A session moves `Connected -> Active` on its first request, `Active ->
//! Idle` when its last in-flight request finishes, and ends `Closed` on
//! disconnect, idle timeout, transport error or shutdown. Each in-flight
//! request holds a [`RequestGuard`]; dropping the guard (completion, error
//! or cancellation) decrements the open-request count exactly once.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session key: a fresh UUID for stdio, the transport's id for HTTP
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connected,
    Active,
    Idle,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnect,
    IdleTimeout,
    TransportError,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::ClientDisconnect => "client disconnect",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::TransportError => "transport error",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown or closed session: {0}")]
    Unknown(SessionId),
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub open_requests: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub idle_for: Duration,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    created_at: DateTime<Utc>,
    last_activity: Instant,
    open_requests: usize,
    /// Exempt from idle reaping; the stdio session lives as long as its pipe
    pinned: bool,
    token: CancellationToken,
}

impl Session {
    fn new(pinned: bool) -> Self {
        Self {
            state: SessionState::Connected,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            open_requests: 0,
            pinned,
            token: CancellationToken::new(),
        }
    }
}

/// Tracks every live session
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session subject to idle reaping
    pub fn open(&self) -> SessionId {
        self.insert(false)
    }

    /// Open a session that only closes explicitly
    pub fn open_pinned(&self) -> SessionId {
        self.insert(true)
    }

    fn insert(&self, pinned: bool) -> SessionId {
        let id = SessionId::new();
        self.lock().insert(id.clone(), Session::new(pinned));
        tracing::info!(session = %id, pinned, "Session opened");
        id
    }

    /// Track a session whose id was issued by the transport; returns whether it was new
    pub fn join(&self, id: &SessionId) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(id.clone(), Session::new(false));
        tracing::info!(session = %id, "Session opened");
        true
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one in-flight request
    pub fn begin_request(&self, id: &SessionId) -> Result<RequestGuard, SessionError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::Unknown(id.clone()))?;

        session.open_requests += 1;
        session.state = SessionState::Active;
        session.last_activity = Instant::now();

        Ok(RequestGuard {
            manager: self.clone(),
            session: id.clone(),
            token: session.token.child_token(),
        })
    }

    fn finish_request(&self, id: &SessionId) {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(id) else {
            return;
        };
        session.open_requests = session.open_requests.saturating_sub(1);
        session.last_activity = Instant::now();
        if session.open_requests == 0 {
            session.state = SessionState::Idle;
        }
    }

    /// Close a session, cancelling its in-flight requests
    pub fn close(&self, id: &SessionId, reason: CloseReason) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(session) => {
                session.token.cancel();
                tracing::info!(
                    session = %id,
                    %reason,
                    open_requests = session.open_requests,
                    "Session closed"
                );
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<(SessionId, Session)> = self.lock().drain().collect();
        for (id, session) in &drained {
            session.token.cancel();
            tracing::debug!(session = %id, %reason, "Session closed");
        }
        drained.len()
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<SessionInfo> {
        self.lock().get(id).map(|s| SessionInfo {
            id: id.clone(),
            state: s.state,
            open_requests: s.open_requests,
            created_at: s.created_at,
            idle_for: s.last_activity.elapsed(),
        })
    }

    /// State of a session; unknown sessions report `Closed`
    pub fn state(&self, id: &SessionId) -> SessionState {
        self.lock()
            .get(id)
            .map(|s| s.state)
            .unwrap_or(SessionState::Closed)
    }

    /// Close unpinned sessions with no open requests idle for at least the timeout
    pub fn reap_idle(&self) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .lock()
            .iter()
            .filter(|(_, s)| {
                !s.pinned
                    && s.open_requests == 0
                    && s.last_activity.elapsed() >= self.idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.close(id, CloseReason::IdleTimeout);
        }
        expired
    }
}

/// Holds one request open; dropping it completes the request
#[derive(Debug)]
pub struct RequestGuard {
    manager: SessionManager,
    session: SessionId,
    token: CancellationToken,
}

impl RequestGuard {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the session is closed under the request
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.manager.finish_request(&self.session);
    }
}
