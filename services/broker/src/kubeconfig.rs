//! Kubeconfig rendering for authenticated users.
//!
//! The generated document references the `kauth` exec credential plugin
//! instead of embedding tokens, so `kubectl` refreshes transparently and the
//! file on disk never holds a usable credential by itself.

/// Renders per-user kubeconfig documents for one cluster.
#[derive(Debug, Clone)]
pub struct KubeconfigRenderer {
    cluster_name: String,
    cluster_server: String,
    /// Base64-encoded PEM bundle.
    cluster_ca: String,
}

impl KubeconfigRenderer {
    #[must_use]
    pub fn new(cluster_name: &str, cluster_server: &str, cluster_ca: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            cluster_server: cluster_server.to_string(),
            cluster_ca: cluster_ca.to_string(),
        }
    }

    /// Render the kubeconfig for `email`: one cluster, one exec-plugin user,
    /// one context, and `current-context` pointing at it.
    #[must_use]
    pub fn render(&self, email: &str) -> String {
        format!(
            r"apiVersion: v1
kind: Config
clusters:
- name: {cluster}
  cluster:
    server: {server}
    certificate-authority-data: {ca}
users:
- name: {email}
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1
      command: kauth
      args:
      - get-token
      interactiveMode: Never
contexts:
- name: {cluster}
  context:
    cluster: {cluster}
    user: {email}
current-context: {cluster}
",
            cluster = self.cluster_name,
            server = self.cluster_server,
            ca = self.cluster_ca,
            email = email,
        )
    }
}
