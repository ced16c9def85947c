use clap::{Arg, ArgMatches, Command};

pub const ARG_ALLOWED_EMAIL_DOMAIN: &str = "allowed-email-domain";
pub const ARG_REQUIRE_STUDENT: &str = "require-student";
pub const ARG_REQUIRE_MFA: &str = "require-mfa";
pub const ARG_FLOW_TTL_SECONDS: &str = "flow-ttl-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub allowed_email_domain: String,
    pub require_student: bool,
    pub require_mfa: bool,
    pub flow_ttl_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            allowed_email_domain: matches
                .get_one::<String>(ARG_ALLOWED_EMAIL_DOMAIN)
                .cloned()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "uci.edu".to_string()),
            require_student: matches
                .get_one::<bool>(ARG_REQUIRE_STUDENT)
                .copied()
                .unwrap_or(true),
            require_mfa: matches
                .get_one::<bool>(ARG_REQUIRE_MFA)
                .copied()
                .unwrap_or(true),
            flow_ttl_seconds: matches
                .get_one::<u64>(ARG_FLOW_TTL_SECONDS)
                .copied()
                .unwrap_or(600),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ALLOWED_EMAIL_DOMAIN)
                .long(ARG_ALLOWED_EMAIL_DOMAIN)
                .help("Only emails under this domain may sign in")
                .env("HEALTHU_ALLOWED_EMAIL_DOMAIN")
                .default_value("uci.edu"),
        )
        .arg(
            Arg::new(ARG_REQUIRE_STUDENT)
                .long(ARG_REQUIRE_STUDENT)
                .help("Reject accounts without a student affiliation claim")
                .long_help(
                    "Reject accounts without a student affiliation claim.\n\nWhen false the check is advisory: the login proceeds and `isStudent` is reported as false.",
                )
                .env("HEALTHU_REQUIRE_STUDENT")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_REQUIRE_MFA)
                .long(ARG_REQUIRE_MFA)
                .help("Reject ID tokens whose amr shows no second factor")
                .env("HEALTHU_REQUIRE_MFA")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_FLOW_TTL_SECONDS)
                .long(ARG_FLOW_TTL_SECONDS)
                .help("How long a started login may take before its state expires")
                .env("HEALTHU_FLOW_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
