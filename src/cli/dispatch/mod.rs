//! Command-line argument dispatch.
//!
//! Validated CLI matches are mapped to the action to run, which for now is
//! always the API server with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{idp, policy, session, ARG_ALLOWED_ORIGIN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(4000);
    let allowed_origin = matches
        .get_one::<String>(ARG_ALLOWED_ORIGIN)
        .cloned()
        .filter(|value| !value.trim().is_empty());

    let idp = idp::Options::parse(matches)?;
    let policy = policy::Options::parse(matches);
    let session = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        allowed_origin,
        idp,
        policy,
        session,
    }))
}
