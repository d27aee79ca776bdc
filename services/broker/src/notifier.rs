//! Background tasks: the session watch consumer and the record cleanup
//! ticker. One of each runs per replica, spawned at broker init and aborted
//! on shutdown. Both tolerate transient store failures and never terminate
//! silently.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use session_store::SessionStore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::listeners::ListenerTable;

const INITIAL_WATCH_BACKOFF: Duration = Duration::from_secs(5);
const MAX_WATCH_BACKOFF: Duration = Duration::from_secs(60);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
/// Records older than this are deleted by the sweep. Long enough for a
/// browser round-trip to the provider, short enough that abandoned logins
/// do not accumulate.
const SESSION_RECORD_TTL_SECS: i64 = 60;

/// Consume the store's watch stream and fan terminal transitions out to the
/// local listener table. This is the only cross-replica correlation
/// mechanism; delivery is best-effort because the record itself is the
/// source of truth.
pub fn spawn_notifier(store: Arc<dyn SessionStore>, listeners: ListenerTable) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = INITIAL_WATCH_BACKOFF;
        loop {
            match store.watch().await {
                Ok(mut events) => {
                    info!("watching session records");
                    backoff = INITIAL_WATCH_BACKOFF;

                    while let Some(event) = events.next().await {
                        match event {
                            Ok(event) if event.status.is_terminal() => {
                                let delivered = listeners.notify(&event.state, &event.status);
                                if delivered > 0 {
                                    debug!(listeners = delivered, "woke local watch streams");
                                }
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!("session watch error: {err}");
                                break;
                            }
                        }
                    }
                    warn!("session watch ended, reconnecting");
                }
                Err(err) => {
                    error!("failed to start session watch: {err}");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_WATCH_BACKOFF);
        }
    })
}

/// Periodically delete session records older than the record TTL. Errors are
/// logged and retried on the next tick.
pub fn spawn_cleanup(store: Arc<dyn SessionStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            match store
                .cleanup_older_than(chrono::Duration::seconds(SESSION_RECORD_TTL_SECS))
                .await
            {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired session records"),
                Err(err) => warn!("session cleanup failed: {err}"),
            }
        }
    })
}
