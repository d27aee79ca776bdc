use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A temporary login session, shared by every broker replica.
///
/// Created by `/start-login`, mutated exactly once by whichever replica
/// receives the provider callback, observed by `/watch` via get or watch,
/// and garbage-collected by the periodic sweep once it ages out.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kauth.io",
    version = "v1alpha1",
    kind = "OAuthSession",
    namespaced,
    status = "OAuthSessionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSessionSpec {
    /// OAuth `state` parameter, original and untruncated.
    pub state: String,
    /// PKCE verifier for the code exchange.
    pub verifier: String,
    /// Creation time, used by the cleanup sweep.
    pub created_at: DateTime<Utc>,
}

/// Observed outcome of a login session.
///
/// A record is pending while the status is default, and terminal once
/// `ready` is set or `error` is non-empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSessionStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeconfig: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OAuthSessionStatus {
    /// Successful completion: kubeconfig and rotatable refresh envelope.
    #[must_use]
    pub fn ready(email: impl Into<String>, kubeconfig: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            ready: true,
            email: email.into(),
            kubeconfig: kubeconfig.into(),
            refresh_token: refresh_token.into(),
            ..Self::default()
        }
    }

    /// Failed completion. An empty `error` means no error, so callers must
    /// pass a non-empty reason.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    /// True once the session reached `Ready` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.ready || !self.error.is_empty()
    }
}
