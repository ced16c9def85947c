use anyhow::{bail, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_BASE_URL: &str = "base-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub ttl_seconds: u64,
    /// Session token issuer; `None` falls back to `http://localhost:<port>`.
    pub base_url: Option<String>,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = match matches.get_one::<String>(ARG_SESSION_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => bail!("missing required argument: --{ARG_SESSION_SECRET}"),
        };

        Ok(Self {
            secret,
            ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(8 * 60 * 60),
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("HMAC secret used to sign session tokens")
                .env("HEALTHU_SESSION_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("HEALTHU_SESSION_TTL_SECONDS")
                .default_value("28800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL of this service, used as the session token issuer")
                .env("HEALTHU_BASE_URL"),
        )
}
