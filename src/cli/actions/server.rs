use crate::{
    api,
    cli::commands::{idp, policy, session},
    oidc::{FlowVault, LoginService, PolicyConfig, PolicyEngine, ProviderConfig, SessionIssuer},
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub idp: idp::Options,
    pub policy: policy::Options,
    pub session: session::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the login pipeline cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let login = Arc::new(login_service(&args)?);

    api::new(args.port, login, args.allowed_origin.as_deref()).await
}

/// Wire the login pipeline from parsed arguments.
///
/// # Errors
/// Returns an error if the IdP HTTP clients cannot be built.
pub fn login_service(args: &Args) -> Result<LoginService> {
    let provider = ProviderConfig::new(
        args.idp.provider.clone(),
        args.idp.issuer.clone(),
        args.idp.authorization_endpoint.clone(),
        args.idp.token_endpoint.clone(),
        args.idp.jwks_uri.clone(),
        args.idp.client_id.clone(),
        args.idp.redirect_uri.clone(),
        args.idp.callback_scheme.clone(),
    )
    .with_client_secret(args.idp.client_secret.clone())
    .with_scopes(args.idp.scopes.clone())
    .with_http_timeout(Duration::from_secs(args.idp.timeout_seconds));

    let sessions = SessionIssuer::new(args.session.secret.clone(), session_issuer(args))
        .with_ttl(Duration::from_secs(args.session.ttl_seconds));

    let policy = PolicyEngine::new(
        PolicyConfig::new(&args.policy.allowed_email_domain)
            .with_require_student(args.policy.require_student)
            .with_require_mfa(args.policy.require_mfa),
    );

    let service = LoginService::new(provider, sessions)
        .context("Failed to build identity provider HTTP clients")?
        .with_policy(policy)
        .with_flow_vault(FlowVault::in_memory(Duration::from_secs(
            args.policy.flow_ttl_seconds,
        )));

    Ok(service)
}

fn session_issuer(args: &Args) -> String {
    args.session
        .base_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", args.port))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("provider", args.idp.provider.clone()),
        ("issuer", args.idp.issuer.clone()),
        ("client_id", args.idp.client_id.clone()),
        (
            "client_secret_set",
            args.idp.client_secret.is_some().to_string(),
        ),
        ("redirect_uri", args.idp.redirect_uri.clone()),
        ("callback_scheme", args.idp.callback_scheme.clone()),
        (
            "allowed_email_domain",
            args.policy.allowed_email_domain.clone(),
        ),
        ("require_student", args.policy.require_student.to_string()),
        ("require_mfa", args.policy.require_mfa.to_string()),
        ("session_issuer", session_issuer(args)),
        (
            "allowed_origin",
            args.allowed_origin
                .clone()
                .unwrap_or_else(|| "any".to_string()),
        ),
    ];
    info!("{}", format_entries("Startup configuration", &entries));
}

fn format_entries(title: &str, entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn short_commit(hash: &str) -> String {
    hash.trim().chars().take(7).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use url::Url;

    fn args(base_url: Option<&str>) -> Result<Args> {
        Ok(Args {
            port: 4100,
            allowed_origin: None,
            idp: idp::Options {
                provider: "uci".to_string(),
                issuer: "https://login.uci.test".to_string(),
                authorization_endpoint: Url::parse("https://login.uci.test/authorize")?,
                token_endpoint: Url::parse("https://login.uci.test/token")?,
                jwks_uri: Url::parse("https://login.uci.test/jwks")?,
                client_id: "healthu-client".to_string(),
                client_secret: Some(SecretString::from("idp-secret".to_string())),
                redirect_uri: "healthu://auth/callback".to_string(),
                scopes: "openid profile email".to_string(),
                timeout_seconds: 5,
                callback_scheme: "healthu".to_string(),
            },
            policy: policy::Options {
                allowed_email_domain: "uci.edu".to_string(),
                require_student: false,
                require_mfa: true,
                flow_ttl_seconds: 120,
            },
            session: session::Options {
                secret: SecretString::from("session-secret".to_string()),
                ttl_seconds: 3600,
                base_url: base_url.map(str::to_string),
            },
        })
    }

    #[test]
    fn session_issuer_defaults_to_localhost_port() -> Result<()> {
        assert_eq!(session_issuer(&args(None)?), "http://localhost:4100");
        assert_eq!(
            session_issuer(&args(Some("https://api.healthu.test"))?),
            "https://api.healthu.test"
        );
        Ok(())
    }

    #[test]
    fn login_service_carries_configuration() -> Result<()> {
        let service = login_service(&args(None)?)?;
        assert_eq!(service.provider().name(), "uci");
        assert_eq!(service.sessions().issuer(), "http://localhost:4100");
        assert_eq!(service.sessions().ttl(), Duration::from_secs(3600));
        assert_eq!(service.vault().ttl(), Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn startup_entries_are_aligned() {
        let entries = [
            ("client_secret_set", "true".to_string()),
            ("issuer", "https://login.uci.test".to_string()),
        ];
        let message = format_entries("Startup configuration", &entries);
        assert!(message.contains("Startup configuration:"));
        assert!(message.contains("\n  client_secret_set: true"));
        assert!(message.contains(&format!("\n  issuer:{} https://login.uci.test", " ".repeat(11))));
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }
}
