//! Verbosity from repeated `-v` flags or `HEALTHU_LOG_LEVEL`.
//!
//! Both forms end up as the same count: `error` is 0 and each further level
//! adds one, so `-vv` and `HEALTHU_LOG_LEVEL=info` are equivalent.

use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const MAX_VERBOSITY: u8 = 5;

/// Accept either a count or a level name, case-insensitively.
fn parse_verbosity(value: &str) -> Result<u8, String> {
    let value = value.trim();
    if let Ok(count) = value.parse::<u8>() {
        if count <= MAX_VERBOSITY {
            return Ok(count);
        }
        return Err(format!("verbosity {count} is above {MAX_VERBOSITY}"));
    }

    LEVEL_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(value))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "unknown log level '{value}', expected one of: {}",
                LEVEL_NAMES.join(", ")
            )
        })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Repeat to raise verbosity (error, warn, info, debug, trace; default: error)")
            .env("HEALTHU_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_verbosity)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_map_to_counts() {
        assert_eq!(parse_verbosity("error"), Ok(0));
        assert_eq!(parse_verbosity("WARN"), Ok(1));
        assert_eq!(parse_verbosity(" Debug "), Ok(3));
        assert_eq!(parse_verbosity("trace"), Ok(4));
    }

    #[test]
    fn counts_are_bounded() {
        assert_eq!(parse_verbosity("5"), Ok(5));
        assert!(parse_verbosity("6").is_err());
        assert!(parse_verbosity("loud").is_err());
    }
}
