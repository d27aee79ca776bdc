use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;

use crate::cli::actions::{Action, server::Args};
use crate::config::TlsSettings;

/// Turn parsed CLI matches into the action to execute.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen_addr = matches
        .get_one::<SocketAddr>("listen-addr")
        .copied()
        .context("missing required argument: --listen-addr")?;
    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .context("missing required argument: --base-url")?;

    let issuer_url = matches
        .get_one::<String>("issuer-url")
        .cloned()
        .context("missing required argument: --issuer-url")?;
    let client_id = matches
        .get_one::<String>("client-id")
        .cloned()
        .context("missing required argument: --client-id")?;
    let client_secret = matches
        .get_one::<String>("client-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --client-secret")?;

    let cluster_name = matches
        .get_one::<String>("cluster-name")
        .cloned()
        .unwrap_or_else(|| "kubernetes".to_string());
    let namespace = matches
        .get_one::<String>("namespace")
        .cloned()
        .unwrap_or_else(|| "default".to_string());

    let tls = match (
        matches.get_one::<String>("tls-cert"),
        matches.get_one::<String>("tls-key"),
    ) {
        (Some(cert), Some(key)) => Some(TlsSettings {
            cert: PathBuf::from(cert),
            key: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => bail!("TLS requires both --tls-cert and --tls-key"),
    };

    let session_ttl = duration_arg(matches, "session-ttl")?;
    let refresh_token_ttl = duration_arg(matches, "refresh-token-ttl")?;

    let rotation_window = matches
        .get_one::<u32>("rotation-window")
        .copied()
        .unwrap_or(2);
    if rotation_window == 0 {
        bail!("--rotation-window must be at least 1");
    }

    Ok(Action::Server(Args {
        listen_addr,
        base_url,
        issuer_url,
        client_id,
        client_secret,
        cluster_name,
        cluster_server: matches.get_one::<String>("cluster-server").cloned(),
        cluster_ca_data: matches.get_one::<String>("cluster-ca-data").cloned(),
        cluster_ca_file: matches.get_one::<String>("cluster-ca-file").cloned(),
        namespace,
        signing_key: matches.get_one::<String>("signing-key").cloned(),
        content_key: matches.get_one::<String>("content-key").cloned(),
        tls,
        session_ttl,
        refresh_token_ttl,
        allowed_origins: list_arg(matches, "allowed-origins"),
        allowed_groups: list_arg(matches, "allowed-groups"),
        rate_limit_rps: matches
            .get_one::<f64>("rate-limit-rps")
            .copied()
            .unwrap_or(10.0),
        rate_limit_burst: matches
            .get_one::<u32>("rate-limit-burst")
            .copied()
            .unwrap_or(20),
        rotation_window,
    }))
}

fn duration_arg(matches: &clap::ArgMatches, name: &str) -> Result<chrono::Duration> {
    let duration = matches
        .get_one::<std::time::Duration>(name)
        .copied()
        .with_context(|| format!("missing required argument: --{name}"))?;
    chrono::Duration::from_std(duration).with_context(|| format!("--{name} is out of range"))
}

fn list_arg(matches: &clap::ArgMatches, name: &str) -> Vec<String> {
    matches
        .get_many::<String>(name)
        .map(|values| {
            values
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
