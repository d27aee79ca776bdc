use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchEvent, WatchParams};
use tracing::{debug, warn};

use crate::{
    Error, EventStream, MANAGED_BY_KEY, MANAGED_BY_SELECTOR, MANAGED_BY_VALUE, OAuthSession,
    OAuthSessionSpec, OAuthSessionStatus, SessionEvent, SessionStore, keys::session_key,
};

/// [`SessionStore`] backed by the `OAuthSession` custom resource.
///
/// Reads are read-your-writes within a replica (served by the API server),
/// and the watch stream carries changes made by any replica.
#[derive(Clone)]
pub struct KubeSessionStore {
    api: Api<OAuthSession>,
}

impl KubeSessionStore {
    #[must_use]
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl SessionStore for KubeSessionStore {
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

        self.api
            .create(&PostParams::default(), &session)
            .await
            .map_err(|err| classify(err, &name))
    }

    async fn get(&self, state: &str) -> Result<OAuthSession, Error> {
        let name = session_key(state);
        self.api.get(&name).await.map_err(|err| classify(err, &name))
    }

    async fn update_status(&self, state: &str, status: OAuthSessionStatus) -> Result<(), Error> {
        let name = session_key(state);
        let mut status = status;
        if status.is_terminal() && status.completed_at.is_none() {
            status.completed_at = Some(Utc::now());
        }

        let patch = serde_json::json!({ "status": status });
        self.api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify(err, &name))?;
        Ok(())
    }

    async fn delete(&self, state: &str) -> Result<(), Error> {
        let name = session_key(state);
        self.api
            .delete(&name, &DeleteParams::default())
            .await
            .map_err(|err| classify(err, &name))?;
        Ok(())
    }

    async fn watch(&self) -> Result<EventStream, Error> {
        let api = self.api.clone();

        // List first: records that turned terminal while we were not
        // watching are replayed as synthetic events, then the live watch
        // resumes from the list's resource version.
        let list = api
            .list(&ListParams::default().labels(MANAGED_BY_SELECTOR))
            .await?;
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();

        let stream = async_stream::try_stream! {
            for session in &list.items {
                yield SessionEvent::from_session(session);
            }

            let params = WatchParams::default().labels(MANAGED_BY_SELECTOR);
            let events = api.watch(&params, &resource_version).await?;
            futures::pin_mut!(events);

            while let Some(event) = events.next().await {
                match event? {
                    WatchEvent::Added(session) | WatchEvent::Modified(session) => {
                        yield SessionEvent::from_session(&session);
                    }
                    WatchEvent::Deleted(_) | WatchEvent::Bookmark(_) => {}
                    WatchEvent::Error(status) => {
                        Err(Error::Watch(status.to_string()))?;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn cleanup_older_than(&self, ttl: Duration) -> Result<usize, Error> {
        let list = self
            .api
            .list(&ListParams::default().labels(MANAGED_BY_SELECTOR))
            .await?;

        let cutoff = Utc::now() - ttl;
        let mut removed = 0usize;

        for session in list.items {
            if session.spec.created_at >= cutoff {
                continue;
            }
            match self.delete(&session.spec.state).await {
                Ok(()) => removed += 1,
                // Another replica sweeping concurrently is fine.
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!("failed to delete expired session record: {err}");
                }
            }
        }

        if removed > 0 {
            debug!(removed, "cleaned up expired session records");
        }
        Ok(removed)
    }
}

fn classify(err: kube::Error, name: &str) -> Error {
    match &err {
        kube::Error::Api(response) if response.code == 404 => Error::NotFound(name.to_string()),
        kube::Error::Api(response) if response.code == 409 => {
            Error::AlreadyExists(name.to_string())
        }
        _ => Error::Kube(err),
    }
}
