use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("tls-cert")
                .long("tls-cert")
                .help("Path to the PEM server certificate chain")
                .env("KAUTH_TLS_CERT")
                .requires("tls-key"),
        )
        .arg(
            Arg::new("tls-key")
                .long("tls-key")
                .help("Path to the PEM server private key")
                .env("KAUTH_TLS_KEY")
                .requires("tls-cert"),
        )
}
