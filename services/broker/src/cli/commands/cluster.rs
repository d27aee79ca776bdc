use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("cluster-name")
                .long("cluster-name")
                .help("Cluster name used in generated kubeconfigs")
                .default_value("kubernetes")
                .env("KAUTH_CLUSTER_NAME"),
        )
        .arg(
            Arg::new("cluster-server")
                .long("cluster-server")
                .help("API server URL users connect to; defaults to the in-cluster environment")
                .env("KAUTH_CLUSTER_SERVER"),
        )
        .arg(
            Arg::new("cluster-ca-data")
                .long("cluster-ca-data")
                .help("Base64-encoded cluster CA bundle")
                .env("KAUTH_CLUSTER_CA_DATA"),
        )
        .arg(
            Arg::new("cluster-ca-file")
                .long("cluster-ca-file")
                .help("Path to a PEM cluster CA bundle")
                .env("KAUTH_CLUSTER_CA_FILE")
                .conflicts_with("cluster-ca-data"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .help("Namespace holding the login session records")
                .default_value("default")
                .env("KAUTH_NAMESPACE"),
        )
}
