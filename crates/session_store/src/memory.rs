use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    Error, EventStream, MANAGED_BY_KEY, MANAGED_BY_VALUE, OAuthSession, OAuthSessionSpec,
    OAuthSessionStatus, SessionEvent, SessionStore, keys::session_key,
};

const EVENT_BUFFER: usize = 64;

/// In-memory [`SessionStore`] with the same key derivation and watch
/// semantics as the cluster-backed store. Used by the broker test suites and
/// useful for running the broker against no cluster at all.
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, OAuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine; the store is the source of truth.
        let _ = self.events.send(event);
    }

    #[cfg(test)]
    fn backdate(&self, state: &str, by: Duration) {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        if let Some(session) = sessions.get_mut(&session_key(state)) {
            session.spec.created_at = session.spec.created_at - by;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, state: &str, verifier: &str) -> Result<OAuthSession, Error> {
        let name = session_key(state);
        let mut session = OAuthSession::new(
            &name,
            OAuthSessionSpec {
                state: state.to_string(),
                verifier: verifier.to_string(),
                created_at: Utc::now(),
            },
        );
        session.metadata.labels = Some(BTreeMap::from([(
            MANAGED_BY_KEY.to_string(),
            MANAGED_BY_VALUE.to_string(),
        )]));

        let mut sessions = self.sessions.lock().expect("session table poisoned");
        if sessions.contains_key(&name) {
            return Err(Error::AlreadyExists(name));
        }
        sessions.insert(name, session.clone());
        drop(sessions);

        self.publish(SessionEvent {
            state: state.to_string(),
            status: OAuthSessionStatus::default(),
        });
        Ok(session)
    }

    async fn get(&self, state: &str) -> Result<OAuthSession, Error> {
        let name = session_key(state);
        let sessions = self.sessions.lock().expect("session table poisoned");
        sessions.get(&name).cloned().ok_or(Error::NotFound(name))
    }

    async fn update_status(&self, state: &str, status: OAuthSessionStatus) -> Result<(), Error> {
        let name = session_key(state);
        let mut status = status;
        if status.is_terminal() && status.completed_at.is_none() {
            status.completed_at = Some(Utc::now());
        }

        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let session = sessions.get_mut(&name).ok_or(Error::NotFound(name))?;
        session.status = Some(status.clone());
        let state = session.spec.state.clone();
        drop(sessions);

        self.publish(SessionEvent { state, status });
        Ok(())
    }

    async fn delete(&self, state: &str) -> Result<(), Error> {
        let name = session_key(state);
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        sessions.remove(&name).map(|_| ()).ok_or(Error::NotFound(name))
    }

    async fn watch(&self) -> Result<EventStream, Error> {
        // Subscribe before snapshotting so a transition between the two is
        // duplicated rather than lost.
        let receiver = self.events.subscribe();
        let current: Vec<SessionEvent> = {
            let sessions = self.sessions.lock().expect("session table poisoned");
            sessions
                .values()
                .map(|session| SessionEvent {
                    state: session.spec.state.clone(),
                    status: session.status.clone().unwrap_or_default(),
                })
                .collect()
        };

        let live = BroadcastStream::new(receiver)
            // A lagged receiver only means dropped duplicates; the initial
            // replay plus the get path cover correctness.
            .filter_map(|event| async move { event.ok().map(Ok) });

        Ok(futures::stream::iter(current.into_iter().map(Ok))
            .chain(live)
            .boxed())
    }

    async fn cleanup_older_than(&self, ttl: Duration) -> Result<usize, Error> {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let before = sessions.len();
        sessions.retain(|_, session| session.spec.created_at >= cutoff);
        Ok(before - sessions.len())
    }
}
