//! Cluster identity inputs: the API server URL and the CA bundle users will
//! trust. Both fall back to in-cluster sources so a plain in-cluster
//! deployment needs no explicit configuration.

use std::env;
use std::fs;

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD};

const IN_CLUSTER_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Resolve the base64-encoded cluster CA, trying explicit base64 data, then
/// a file path, then the in-cluster service account mount.
///
/// # Errors
/// Fails when a configured file cannot be read, or when no source yields a
/// CA at all.
pub fn resolve_cluster_ca(data: Option<&str>, file: Option<&str>) -> Result<String> {
    if let Some(data) = data.filter(|value| !value.is_empty()) {
        return Ok(data.to_string());
    }

    if let Some(path) = file.filter(|value| !value.is_empty()) {
        let pem = fs::read(path).with_context(|| format!("failed to read CA file {path}"))?;
        return Ok(STANDARD.encode(pem));
    }

    if let Ok(pem) = fs::read(IN_CLUSTER_CA_PATH) {
        return Ok(STANDARD.encode(pem));
    }

    bail!("no cluster CA found; set --cluster-ca-data or --cluster-ca-file, or run in-cluster")
}

/// Resolve the API server URL from explicit configuration or the in-cluster
/// environment.
///
/// # Errors
/// Fails when neither is available.
pub fn resolve_cluster_server(explicit: Option<&str>) -> Result<String> {
    if let Some(server) = explicit.filter(|value| !value.is_empty()) {
        return Ok(server.to_string());
    }

    if let (Ok(host), Ok(port)) = (
        env::var("KUBERNETES_SERVICE_HOST"),
        env::var("KUBERNETES_SERVICE_PORT"),
    ) && !host.is_empty()
    {
        return Ok(format!("https://{host}:{port}"));
    }

    bail!("no cluster server configured; set --cluster-server or run in-cluster")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ca_data_wins() {
        let ca = resolve_cluster_ca(Some("Y2EtcGVt"), Some("/does/not/exist")).expect("ca");
        assert_eq!(ca, "Y2EtcGVt");
    }

    #[test]
    fn ca_file_is_read_and_encoded() {
        let dir = std::env::temp_dir().join("kauth-ca-test");
        fs::create_dir_all(&dir).expect("tempdir");
        let path = dir.join("ca.crt");
        fs::write(&path, b"ca-pem").expect("write");

        let ca = resolve_cluster_ca(None, path.to_str()).expect("ca");
        assert_eq!(ca, STANDARD.encode(b"ca-pem"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        assert!(resolve_cluster_ca(None, Some("/does/not/exist.crt")).is_err());
    }

    #[test]
    fn explicit_server_wins() {
        let server = temp_env::with_vars(
            [
                ("KUBERNETES_SERVICE_HOST", Some("10.0.0.1")),
                ("KUBERNETES_SERVICE_PORT", Some("443")),
            ],
            || resolve_cluster_server(Some("https://k8s.example.com:6443")),
        )
        .expect("server");
        assert_eq!(server, "https://k8s.example.com:6443");
    }

    #[test]
    fn in_cluster_env_builds_server_url() {
        let server = temp_env::with_vars(
            [
                ("KUBERNETES_SERVICE_HOST", Some("10.0.0.1")),
                ("KUBERNETES_SERVICE_PORT", Some("443")),
            ],
            || resolve_cluster_server(None),
        )
        .expect("server");
        assert_eq!(server, "https://10.0.0.1:443");
    }

    #[test]
    fn no_server_source_is_an_error() {
        let result = temp_env::with_vars(
            [
                ("KUBERNETES_SERVICE_HOST", None::<&str>),
                ("KUBERNETES_SERVICE_PORT", None::<&str>),
            ],
            || resolve_cluster_server(None),
        );
        assert!(result.is_err());
    }
}
