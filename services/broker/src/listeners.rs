//! Replica-local listener table for open `/watch` streams.
//!
//! Each open stream registers one capacity-1 channel under its session
//! `state`. The notifier delivers terminal statuses with a non-blocking send:
//! a full channel means the listener was already served. The table only
//! retains senders for dispatch; the receiving half is owned by the handler,
//! and the registration guard removes the entry on every exit path,
//! including cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use session_store::OAuthSessionStatus;
use tokio::sync::mpsc;

struct Entry {
    id: u64,
    tx: mpsc::Sender<OAuthSessionStatus>,
}

#[derive(Clone, Default)]
pub struct ListenerTable {
    inner: Arc<Mutex<HashMap<String, Vec<Entry>>>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener for `state`. Dropping the returned registration
    /// removes it again; the key disappears once its listener list empties.
    #[must_use]
    pub fn register(
        &self,
        state: &str,
    ) -> (ListenerRegistration, mpsc::Receiver<OAuthSessionStatus>) {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut table = self.inner.lock().expect("listener table poisoned");
        table.entry(state.to_string()).or_default().push(Entry { id, tx });
        drop(table);

        let registration = ListenerRegistration {
            table: self.clone(),
            state: state.to_string(),
            id,
        };
        (registration, rx)
    }

    /// Deliver a terminal status to every listener registered for `state`.
    ///
    /// Senders are snapshotted under the lock and the sends happen outside
    /// it; a full or closed channel is skipped. Returns how many listeners
    /// accepted the delivery.
    pub fn notify(&self, state: &str, status: &OAuthSessionStatus) -> usize {
        let senders: Vec<mpsc::Sender<OAuthSessionStatus>> = {
            let table = self.inner.lock().expect("listener table poisoned");
            table
                .get(state)
                .map(|entries| entries.iter().map(|entry| entry.tx.clone()).collect())
                .unwrap_or_default()
        };

        senders
            .into_iter()
            .filter(|tx| tx.try_send(status.clone()).is_ok())
            .count()
    }

    /// Number of states with at least one listener.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.inner.lock().expect("listener table poisoned").len()
    }

    fn remove(&self, state: &str, id: u64) {
        let mut table = self.inner.lock().expect("listener table poisoned");
        if let Some(entries) = table.get_mut(state) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                table.remove(state);
            }
        }
    }
}

/// Removes the listener from the table when dropped.
pub struct ListenerRegistration {
    table: ListenerTable,
    state: String,
    id: u64,
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.table.remove(&self.state, self.id);
    }
}
