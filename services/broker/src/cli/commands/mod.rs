mod cluster;
mod keys;
pub mod logging;
mod oidc;
mod policy;
mod tls;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("kauth-broker")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("listen-addr")
                .short('l')
                .long("listen-addr")
                .help("Address and port to listen on")
                .default_value("0.0.0.0:8080")
                .env("KAUTH_LISTEN_ADDR")
                .value_parser(clap::value_parser!(std::net::SocketAddr)),
        )
        .arg(
            Arg::new("base-url")
                .short('b')
                .long("base-url")
                .help("Externally reachable base URL (e.g. https://kauth.example.com)")
                .env("KAUTH_BASE_URL")
                .required(true),
        );

    let command = oidc::with_args(command);
    let command = cluster::with_args(command);
    let command = keys::with_args(command);
    let command = policy::with_args(command);
    let command = tls::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_args() -> Vec<&'static str> {
        vec![
            "kauth-broker",
            "--base-url",
            "https://kauth.example.com",
            "--issuer-url",
            "https://issuer.example.com",
            "--client-id",
            "kauth",
            "--client-secret",
            "secret",
        ]
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "kauth-broker");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let matches = new().get_matches_from(required_args());

        assert_eq!(
            matches
                .get_one::<std::net::SocketAddr>("listen-addr")
                .copied(),
            Some("0.0.0.0:8080".parse().expect("addr"))
        );
        assert_eq!(
            matches.get_one::<String>("cluster-name").cloned(),
            Some("kubernetes".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("namespace").cloned(),
            Some("default".to_string())
        );
        assert_eq!(matches.get_one::<f64>("rate-limit-rps").copied(), Some(10.0));
        assert_eq!(matches.get_one::<u32>("rate-limit-burst").copied(), Some(20));
        assert_eq!(matches.get_one::<u32>("rotation-window").copied(), Some(2));
    }

    #[test]
    fn test_missing_required_args_fails() {
        let result = new().try_get_matches_from(vec!["kauth-broker"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("KAUTH_BASE_URL", Some("https://kauth.example.com")),
                ("KAUTH_ISSUER_URL", Some("https://issuer.example.com")),
                ("KAUTH_CLIENT_ID", Some("kauth")),
                ("KAUTH_CLIENT_SECRET", Some("secret")),
                ("KAUTH_LISTEN_ADDR", Some("127.0.0.1:9443")),
                ("KAUTH_NAMESPACE", Some("kauth-system")),
                ("KAUTH_ALLOWED_GROUPS", Some("admins,ops")),
                ("KAUTH_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["kauth-broker"]);
                assert_eq!(
                    matches
                        .get_one::<std::net::SocketAddr>("listen-addr")
                        .copied(),
                    Some("127.0.0.1:9443".parse().expect("addr"))
                );
                assert_eq!(
                    matches.get_one::<String>("namespace").cloned(),
                    Some("kauth-system".to_string())
                );
                let groups: Vec<String> = matches
                    .get_many::<String>("allowed-groups")
                    .expect("groups")
                    .cloned()
                    .collect();
                assert_eq!(groups, vec!["admins".to_string(), "ops".to_string()]);
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_tls_args_require_each_other() {
        let mut args = required_args();
        args.extend(["--tls-cert", "/tmp/cert.pem"]);
        let result = new().try_get_matches_from(args);
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::MissingRequiredArgument)
        );
    }

    #[test]
    fn test_cluster_ca_sources_conflict() {
        let mut args = required_args();
        args.extend([
            "--cluster-ca-data",
            "Y2E=",
            "--cluster-ca-file",
            "/tmp/ca.crt",
        ]);
        let result = new().try_get_matches_from(args);
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::ArgumentConflict)
        );
    }
}
