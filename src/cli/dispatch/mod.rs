//! Map parsed arguments to the action the binary runs.

use crate::{
    api::{Config, DEFAULT_PORT},
    cli::{
        actions::{server::Args, Action},
        commands::{
            admin, limiter, ARG_ACTIVATION_URL, ARG_AUTHENTICATION_URL, ARG_CORS_TRUSTED_ORIGINS,
            ARG_ENV, ARG_PORT, ARG_SHUTDOWN_TIMEOUT_SECONDS,
        },
    },
};
use anyhow::Result;

/// Build the server action from validated CLI matches.
///
/// # Errors
/// Returns an error if the arguments are inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(ARG_PORT)
        .copied()
        .unwrap_or(DEFAULT_PORT);

    let mut config = Config::new()
        .with_rate_limit(limiter::parse(matches))
        .with_cors_trusted_origins(
            matches
                .get_one::<String>(ARG_CORS_TRUSTED_ORIGINS)
                .map(|origins| split_origins(origins))
                .unwrap_or_default(),
        )
        .with_admin(admin::parse(matches));

    if let Some(env) = matches.get_one::<String>(ARG_ENV) {
        config = config.with_env(env.as_str());
    }
    if let Some(url) = matches.get_one::<String>(ARG_ACTIVATION_URL) {
        config = config.with_activation_url(url.as_str());
    }
    if let Some(url) = matches.get_one::<String>(ARG_AUTHENTICATION_URL) {
        config = config.with_authentication_url(url.as_str());
    }
    if let Some(seconds) = matches.get_one::<u64>(ARG_SHUTDOWN_TIMEOUT_SECONDS) {
        config = config.with_shutdown_timeout_seconds(*seconds);
    }

    Ok(Action::Server(Args { port, config }))
}

fn split_origins(origins: &str) -> Vec<String> {
    origins
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
