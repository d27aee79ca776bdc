//! Durable, cluster-wide login session records with change notifications.
//!
//! Every broker replica talks to the same namespaced `OAuthSession` custom
//! resource: any replica can create a pending record, any replica can write
//! the terminal status from the provider callback, and any replica can watch
//! for the transition to wake its local `/watch` streams. The store is the
//! source of truth; notifications are best-effort on top of it.
//!
//! [`KubeSessionStore`] is the production implementation. [`MemoryStore`]
//! implements the same [`SessionStore`] trait in memory and backs the broker
//! test suites.

use async_trait::async_trait;
use chrono::Duration;
use futures::stream::BoxStream;

mod client;
mod error;
mod keys;
mod memory;
mod resource;

pub use client::KubeSessionStore;
pub use error::Error;
pub use keys::{KEY_PREFIX, sanitize_state, session_key};
pub use memory::MemoryStore;
pub use resource::{OAuthSession, OAuthSessionSpec, OAuthSessionStatus};

/// Label key applied to every record so the cleanup sweep can list them.
pub const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
/// Label value identifying records owned by this broker.
pub const MANAGED_BY_VALUE: &str = "kauth";
/// List/watch selector over [`MANAGED_BY_KEY`].
pub const MANAGED_BY_SELECTOR: &str = "app.kubernetes.io/managed-by=kauth";

/// One observed change of a session record.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// Original `state` from the record spec.
    pub state: String,
    pub status: OAuthSessionStatus,
}

impl SessionEvent {
    fn from_session(session: &OAuthSession) -> Self {
        Self {
            state: session.spec.state.clone(),
            status: session.status.clone().unwrap_or_default(),
        }
    }
}

/// Stream of record changes. Ends when the underlying watch terminates;
/// consumers reconnect with backoff.
pub type EventStream = BoxStream<'static, Result<SessionEvent, Error>>;

/// Storage operations the broker needs for login sessions.
///
/// A fresh `watch()` connection first surfaces all records currently in the
/// store and only then follows live changes, so a terminal transition that
/// happened while the consumer was disconnected is observed again on
/// reconnect. Duplicates are allowed; losing a terminal transition is not.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a pending record for `state`.
    async fn create(&self, state: &str, verifier: &str) -> Result<OAuthSession, Error>;

    /// Fetch the record for `state`. [`Error::NotFound`] if absent.
    async fn get(&self, state: &str) -> Result<OAuthSession, Error>;

    /// Write the record status. Terminal statuses are stamped with
    /// `completedAt`.
    async fn update_status(&self, state: &str, status: OAuthSessionStatus) -> Result<(), Error>;

    /// Remove the record for `state`.
    async fn delete(&self, state: &str) -> Result<(), Error>;

    /// Open a change stream over all records owned by the broker.
    async fn watch(&self) -> Result<EventStream, Error>;

    /// Delete records whose `createdAt` is older than `ttl`. Returns how
    /// many records were removed.
    async fn cleanup_older_than(&self, ttl: Duration) -> Result<usize, Error>;
}
