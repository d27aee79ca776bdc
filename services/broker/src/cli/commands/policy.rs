use std::time::Duration;

use clap::{Arg, Command, builder::ValueParser};

#[must_use]
pub fn validator_duration() -> ValueParser {
    ValueParser::from(
        move |value: &str| -> std::result::Result<Duration, String> {
            parse_duration(value).ok_or_else(|| {
                format!("invalid duration {value:?}; use seconds or a s/m/h/d suffix")
            })
        },
    )
}

// Bare numbers are seconds; otherwise one of the s/m/h/d suffixes.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let (number, unit) = value.split_at(value.len().checked_sub(1)?);
    let number: u64 = number.trim().parse().ok()?;
    let secs = match unit {
        "s" => number,
        "m" => number.checked_mul(60)?,
        "h" => number.checked_mul(60 * 60)?,
        "d" => number.checked_mul(60 * 60 * 24)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Login session lifetime (e.g. 15m)")
                .default_value("15m")
                .env("KAUTH_SESSION_TTL")
                .value_parser(validator_duration()),
        )
        .arg(
            Arg::new("refresh-token-ttl")
                .long("refresh-token-ttl")
                .help("Refresh envelope lifetime (e.g. 7d)")
                .default_value("7d")
                .env("KAUTH_REFRESH_TOKEN_TTL")
                .value_parser(validator_duration()),
        )
        .arg(
            Arg::new("allowed-origins")
                .long("allowed-origins")
                .help("Comma-separated CORS allow-list; empty disables CORS")
                .env("KAUTH_ALLOWED_ORIGINS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("allowed-groups")
                .long("allowed-groups")
                .help("Comma-separated groups permitted to log in; empty permits any authenticated user")
                .env("KAUTH_ALLOWED_GROUPS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("rate-limit-rps")
                .long("rate-limit-rps")
                .help("Sustained per-IP requests per second")
                .default_value("10")
                .env("KAUTH_RATE_LIMIT_RPS")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("rate-limit-burst")
                .long("rate-limit-burst")
                .help("Per-IP burst size")
                .default_value("20")
                .env("KAUTH_RATE_LIMIT_BURST")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("rotation-window")
                .long("rotation-window")
                .help("Accepted refresh rotation counter lag (reserved for strict replay checks)")
                .default_value("2")
                .env("KAUTH_ROTATION_WINDOW")
                .value_parser(clap::value_parser!(u32)),
        )
}
