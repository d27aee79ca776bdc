use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("issuer-url")
                .long("issuer-url")
                .help("OIDC issuer URL (must serve .well-known/openid-configuration)")
                .env("KAUTH_ISSUER_URL")
                .required(true),
        )
        .arg(
            Arg::new("client-id")
                .long("client-id")
                .help("OAuth client ID registered with the provider")
                .env("KAUTH_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new("client-secret")
                .long("client-secret")
                .help("OAuth client secret")
                .env("KAUTH_CLIENT_SECRET")
                .required(true),
        )
}
