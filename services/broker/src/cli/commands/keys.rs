use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("signing-key")
                .long("signing-key")
                .help("Envelope MAC key, base64 or raw (at least 32 bytes)")
                .long_help(
                    "Envelope MAC key, base64 or raw bytes, at least 32 bytes. Generate with: openssl rand -base64 32. When unset, a random pair is generated at startup; envelopes then die with the process and cannot be shared between replicas.",
                )
                .env("KAUTH_SIGNING_KEY"),
        )
        .arg(
            Arg::new("content-key")
                .long("content-key")
                .help("Envelope encryption key, base64 or raw (exactly 32 bytes)")
                .env("KAUTH_CONTENT_KEY"),
        )
}
