use crate::api::AdminBootstrap;
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_EMAIL: &str = "admin-email";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Create an activated administrator with this email at startup")
                .env("LEADHUB_ADMIN_EMAIL")
                .requires(ARG_ADMIN_PASSWORD),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Password for the bootstrap administrator")
                .env("LEADHUB_ADMIN_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_ADMIN_EMAIL),
        )
}

/// Bootstrap credentials, present only when both flags are set.
#[must_use]
pub fn parse(matches: &clap::ArgMatches) -> Option<AdminBootstrap> {
    let email = matches.get_one::<String>(ARG_ADMIN_EMAIL)?;
    let password = matches.get_one::<String>(ARG_ADMIN_PASSWORD)?;
    Some(AdminBootstrap {
        email: email.clone(),
        password: SecretString::from(password.clone()),
    })
}
