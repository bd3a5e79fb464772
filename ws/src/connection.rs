use dashmap::DashMap;
use events::Scope;
use log::*;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedSender;

/// Outbound half of a client connection. Serialized text frames pushed here
/// are written to the socket by the connection's forwarder task.
pub type ConnectionHandle = UnboundedSender<String>;

/// Unique identifier for a session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
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

/// Registry entry. The handle is owned here for as long as the connection is open.
#[derive(Debug)]
struct SessionEntry {
    handle: ConnectionHandle,
    scope: Option<Scope>,
}

/// A stable view of one live session, taken from a registry snapshot.
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub id: SessionId,
    pub scope: Option<Scope>,
    handle: ConnectionHandle,
}

impl LiveSession {
    /// Unscoped sessions receive everything; scoped sessions only receive
    /// broadcasts and envelopes addressed to their own scope.
    pub fn accepts(&self, target: Option<&Scope>) -> bool {
        match (&self.scope, target) {
            (None, _) | (_, None) => true,
            (Some(scope), Some(target)) => scope == target,
        }
    }

    pub fn send(&self, frame: String) -> Result<(), SendError<String>> {
        self.handle.send(frame)
    }
}

/// Tracks every live client connection and its subscription scope.
///
/// Iteration never holds a map lock while invoking caller code: a snapshot of
/// live entries is taken first, so sessions can be registered or unregistered
/// from other tasks (or from the iteration callback itself) at any time.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new connection. A handle that is already registered keeps
    /// its existing session id.
    pub fn register(&self, handle: ConnectionHandle) -> SessionId {
        if let Some(existing) = self
            .sessions
            .iter()
            .find(|entry| entry.value().handle.same_channel(&handle))
        {
            warn!(
                "Connection handle already registered as session {}",
                existing.key().as_str()
            );
            return existing.key().clone();
        }

        let session_id = SessionId::new();
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                handle,
                scope: None,
            },
        );
        session_id
    }

    /// Replace the scope of a session. Returns false if the session is gone.
    pub fn set_scope(&self, session_id: &SessionId, scope: Option<Scope>) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                entry.scope = scope;
                true
            }
            None => false,
        }
    }

    /// Remove a session. Returns false if it was already removed.
    pub fn unregister(&self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Send a frame to a single session.
    pub fn send_to(&self, session_id: &SessionId, frame: String) -> bool {
        let Some(handle) = self
            .sessions
            .get(session_id)
            .map(|entry| entry.handle.clone())
        else {
            return false;
        };
        handle.send(frame).is_ok()
    }

    /// Invoke `f` once per live session.
    ///
    /// Sessions whose connection has already closed are pruned instead of
    /// visited. Sessions unregistered after the snapshot was taken are skipped.
    pub fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(&LiveSession),
    {
        let mut closed = Vec::new();
        let mut snapshot = Vec::with_capacity(self.sessions.len());
        for entry in self.sessions.iter() {
            if entry.value().handle.is_closed() {
                closed.push(entry.key().clone());
            } else {
                snapshot.push(LiveSession {
                    id: entry.key().clone(),
                    scope: entry.value().scope.clone(),
                    handle: entry.value().handle.clone(),
                });
            }
        }

        // Shard guards are released once the loop above ends.
        for session_id in closed {
            debug!("Pruning closed session {}", session_id.as_str());
            self.sessions.remove(&session_id);
        }

        for session in &snapshot {
            if !self.sessions.contains_key(&session.id) {
                trace!("Skipping session {} removed mid-iteration", session.id.as_str());
                continue;
            }
            f(session);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
