use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_IDP_PROVIDER: &str = "idp-provider";
pub const ARG_IDP_ISSUER: &str = "idp-issuer";
pub const ARG_IDP_AUTHORIZATION_ENDPOINT: &str = "idp-authorization-endpoint";
pub const ARG_IDP_TOKEN_ENDPOINT: &str = "idp-token-endpoint";
pub const ARG_IDP_JWKS_URI: &str = "idp-jwks-uri";
pub const ARG_IDP_CLIENT_ID: &str = "idp-client-id";
pub const ARG_IDP_CLIENT_SECRET: &str = "idp-client-secret";
pub const ARG_IDP_REDIRECT_URI: &str = "idp-redirect-uri";
pub const ARG_IDP_SCOPES: &str = "idp-scopes";
pub const ARG_IDP_TIMEOUT_SECONDS: &str = "idp-timeout-seconds";
pub const ARG_CALLBACK_SCHEME: &str = "callback-scheme";

#[derive(Debug, Clone)]
pub struct Options {
    pub provider: String,
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,
    pub scopes: String,
    pub timeout_seconds: u64,
    pub callback_scheme: String,
}

impl Options {
    /// Parse identity provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or an endpoint is not a valid URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        // Env vars set to "" count as unset.
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |id: &str| match get_non_empty(id) {
            Some(value) => Ok(value),
            None => bail!("missing required argument: --{id}"),
        };
        let endpoint = |id: &str| -> Result<Url> {
            let value = required(id)?;
            Url::parse(&value).with_context(|| format!("invalid URL for --{id}: {value}"))
        };

        Ok(Self {
            provider: get_non_empty(ARG_IDP_PROVIDER).unwrap_or_else(|| "uci".to_string()),
            issuer: required(ARG_IDP_ISSUER)?,
            authorization_endpoint: endpoint(ARG_IDP_AUTHORIZATION_ENDPOINT)?,
            token_endpoint: endpoint(ARG_IDP_TOKEN_ENDPOINT)?,
            jwks_uri: endpoint(ARG_IDP_JWKS_URI)?,
            client_id: required(ARG_IDP_CLIENT_ID)?,
            client_secret: get_non_empty(ARG_IDP_CLIENT_SECRET).map(SecretString::from),
            redirect_uri: required(ARG_IDP_REDIRECT_URI)?,
            scopes: get_non_empty(ARG_IDP_SCOPES)
                .unwrap_or_else(|| "openid profile email".to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_IDP_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            callback_scheme: required(ARG_CALLBACK_SCHEME)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDP_PROVIDER)
                .long(ARG_IDP_PROVIDER)
                .help("Provider name used in the /auth/{provider} routes")
                .env("HEALTHU_IDP_PROVIDER")
                .default_value("uci"),
        )
        .arg(
            Arg::new(ARG_IDP_ISSUER)
                .long(ARG_IDP_ISSUER)
                .help("Expected ID token issuer (iss)")
                .env("HEALTHU_IDP_ISSUER"),
        )
        .arg(
            Arg::new(ARG_IDP_AUTHORIZATION_ENDPOINT)
                .long(ARG_IDP_AUTHORIZATION_ENDPOINT)
                .help("IdP authorization endpoint URL")
                .env("HEALTHU_IDP_AUTHORIZATION_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_IDP_TOKEN_ENDPOINT)
                .long(ARG_IDP_TOKEN_ENDPOINT)
                .help("IdP token endpoint URL")
                .env("HEALTHU_IDP_TOKEN_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_IDP_JWKS_URI)
                .long(ARG_IDP_JWKS_URI)
                .help("IdP JWKS URL used to verify ID token signatures")
                .long_help(
                    "IdP JWKS URL used to verify ID token signatures.\n\nKeys are cached for an hour and refreshed once when a token names an unknown `kid`.",
                )
                .env("HEALTHU_IDP_JWKS_URI"),
        )
        .arg(
            Arg::new(ARG_IDP_CLIENT_ID)
                .long(ARG_IDP_CLIENT_ID)
                .help("OAuth client id; also the expected ID token audience")
                .env("HEALTHU_IDP_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_IDP_CLIENT_SECRET)
                .long(ARG_IDP_CLIENT_SECRET)
                .help("OAuth client secret, for confidential clients")
                .env("HEALTHU_IDP_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_IDP_REDIRECT_URI)
                .long(ARG_IDP_REDIRECT_URI)
                .help("Redirect URI registered with the IdP")
                .env("HEALTHU_IDP_REDIRECT_URI"),
        )
        .arg(
            Arg::new(ARG_IDP_SCOPES)
                .long(ARG_IDP_SCOPES)
                .help("Space separated scopes requested at the IdP")
                .env("HEALTHU_IDP_SCOPES")
                .default_value("openid profile email"),
        )
        .arg(
            Arg::new(ARG_IDP_TIMEOUT_SECONDS)
                .long(ARG_IDP_TIMEOUT_SECONDS)
                .help("Timeout for token and JWKS requests, in seconds")
                .env("HEALTHU_IDP_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CALLBACK_SCHEME)
                .long(ARG_CALLBACK_SCHEME)
                .help("URL scheme the mobile client listens on for the IdP redirect")
                .env("HEALTHU_CALLBACK_SCHEME"),
        )
}
