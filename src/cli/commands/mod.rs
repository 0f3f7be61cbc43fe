pub mod admin;
pub mod limiter;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ArgMatches, ColorChoice, Command,
};
use tracing::Level;

pub const ARG_PORT: &str = "port";
pub const ARG_ENV: &str = "env";
pub const ARG_ACTIVATION_URL: &str = "activation-url";
pub const ARG_AUTHENTICATION_URL: &str = "authentication-url";
pub const ARG_CORS_TRUSTED_ORIGINS: &str = "cors-trusted-origins";
pub const ARG_SHUTDOWN_TIMEOUT_SECONDS: &str = "shutdown-timeout-seconds";
pub const ARG_VERBOSE: &str = "verbose";
pub const ARG_LOG_LEVEL: &str = "log-level";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("leadhub")
        .about("Multi-tenant trade lead API")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("4000")
                .env("LEADHUB_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENV)
                .long(ARG_ENV)
                .help("Environment name reported by the health check")
                .default_value("development")
                .env("LEADHUB_ENV")
                .value_parser(["development", "staging", "production"]),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_URL)
                .long(ARG_ACTIVATION_URL)
                .help("Prefix of the activation link sent in the welcome email")
                .default_value("http://localhost:4000/v1/api/activated/token=")
                .env("LEADHUB_ACTIVATION_URL"),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATION_URL)
                .long(ARG_AUTHENTICATION_URL)
                .help("Login URL sent once an account is activated")
                .default_value("http://localhost:4000/v1/api")
                .env("LEADHUB_AUTHENTICATION_URL"),
        )
        .arg(
            Arg::new(ARG_CORS_TRUSTED_ORIGINS)
                .long(ARG_CORS_TRUSTED_ORIGINS)
                .help("Trusted CORS origins, separated by spaces or commas")
                .env("LEADHUB_CORS_TRUSTED_ORIGINS"),
        )
        .arg(
            Arg::new(ARG_SHUTDOWN_TIMEOUT_SECONDS)
                .long(ARG_SHUTDOWN_TIMEOUT_SECONDS)
                .help("Seconds to wait for background tasks on shutdown")
                .default_value("30")
                .env("LEADHUB_SHUTDOWN_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_VERBOSE)
                .short('v')
                .long(ARG_VERBOSE)
                .help("Raise log verbosity; repeat up to -vvvv for TRACE")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log level name, used when no -v is given")
                .env("LEADHUB_LOG_LEVEL")
                .value_parser(|level: &str| level.parse::<Level>()),
        );

    let command = limiter::with_args(command);
    admin::with_args(command)
}

/// Level to log at. `-v` flags win over `--log-level`; `None` keeps the default
/// filter.
#[must_use]
pub fn log_level(matches: &ArgMatches) -> Option<Level> {
    match matches.get_count(ARG_VERBOSE) {
        0 => matches.get_one::<Level>(ARG_LOG_LEVEL).copied(),
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_VARS: [&str; 12] = [
        "LEADHUB_PORT",
        "LEADHUB_ENV",
        "LEADHUB_ACTIVATION_URL",
        "LEADHUB_AUTHENTICATION_URL",
        "LEADHUB_CORS_TRUSTED_ORIGINS",
        "LEADHUB_SHUTDOWN_TIMEOUT_SECONDS",
        "LEADHUB_LIMITER_RPS",
        "LEADHUB_LIMITER_BURST",
        "LEADHUB_LIMITER_ENABLED",
        "LEADHUB_ADMIN_EMAIL",
        "LEADHUB_ADMIN_PASSWORD",
        "LEADHUB_LOG_LEVEL",
    ];

    // Run with every LEADHUB_* variable unset, then apply `vars` on top.
    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let mut all: Vec<(&str, Option<&str>)> = ENV_VARS.iter().map(|k| (*k, None)).collect();
        for &(key, value) in vars {
            all.retain(|(k, _)| *k != key);
            all.push((key, Some(value)));
        }
        temp_env::with_vars(all, f);
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "leadhub");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Multi-tenant trade lead API".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        with_env(&[], || {
            let matches = new().get_matches_from(vec!["leadhub"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(4000));
            assert_eq!(
                matches.get_one::<String>(ARG_ENV).cloned(),
                Some("development".to_string())
            );
            assert_eq!(
                matches.get_one::<f64>(limiter::ARG_LIMITER_RPS).copied(),
                Some(5.0)
            );
            assert_eq!(
                matches.get_one::<u32>(limiter::ARG_LIMITER_BURST).copied(),
                Some(10)
            );
            assert_eq!(
                matches.get_one::<bool>(limiter::ARG_LIMITER_ENABLED).copied(),
                Some(true)
            );
            assert_eq!(
                matches.get_one::<u64>(ARG_SHUTDOWN_TIMEOUT_SECONDS).copied(),
                Some(30)
            );
            assert!(matches.get_one::<String>(ARG_CORS_TRUSTED_ORIGINS).is_none());
            assert!(admin::parse(&matches).is_none());
        });
    }

    #[test]
    fn test_check_args() {
        with_env(&[], || {
            let matches = new().get_matches_from(vec![
                "leadhub",
                "--port",
                "8080",
                "--env",
                "production",
                "--limiter-rps",
                "2.5",
                "--limiter-burst",
                "4",
                "--limiter-enabled",
                "false",
            ]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
            assert_eq!(
                matches.get_one::<String>(ARG_ENV).cloned(),
                Some("production".to_string())
            );

            let limits = limiter::parse(&matches);
            assert!((limits.requests_per_second - 2.5).abs() < f64::EPSILON);
            assert_eq!(limits.burst, 4);
            assert!(!limits.enabled);
        });
    }

    #[test]
    fn test_check_env() {
        with_env(
            &[
                ("LEADHUB_PORT", "443"),
                ("LEADHUB_ENV", "staging"),
                ("LEADHUB_LIMITER_BURST", "20"),
                ("LEADHUB_ADMIN_EMAIL", "root@leadhub.dev"),
                ("LEADHUB_ADMIN_PASSWORD", "change-me-now"),
                ("LEADHUB_LOG_LEVEL", "info"),
            ],
            || {
                let matches = new().get_matches_from(vec!["leadhub"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<u32>(limiter::ARG_LIMITER_BURST).copied(),
                    Some(20)
                );
                assert_eq!(log_level(&matches), Some(Level::INFO));
                let admin = admin::parse(&matches);
                assert_eq!(
                    admin.map(|a| a.email),
                    Some("root@leadhub.dev".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = [
            ("error", Level::ERROR),
            ("WARN", Level::WARN),
            ("info", Level::INFO),
            ("debug", Level::DEBUG),
            ("trace", Level::TRACE),
        ];
        for (name, level) in levels {
            with_env(&[("LEADHUB_LOG_LEVEL", name)], || {
                let matches = new().get_matches_from(vec!["leadhub"]);
                assert_eq!(log_level(&matches), Some(level));
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let expected = [
            None,
            Some(Level::WARN),
            Some(Level::INFO),
            Some(Level::DEBUG),
            Some(Level::TRACE),
            Some(Level::TRACE),
        ];
        for (count, level) in expected.into_iter().enumerate() {
            with_env(&[], || {
                let mut args = vec!["leadhub".to_string()];
                if count > 0 {
                    args.push(format!("-{}", "v".repeat(count)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(log_level(&matches), level);
            });
        }
    }

    #[test]
    fn test_verbose_flag_overrides_log_level() {
        with_env(&[("LEADHUB_LOG_LEVEL", "error")], || {
            let matches = new().get_matches_from(vec!["leadhub", "-vvv"]);
            assert_eq!(log_level(&matches), Some(Level::DEBUG));
        });
    }

    #[test]
    fn test_invalid_values_fail() {
        with_env(&[], || {
            for args in [
                vec!["leadhub", "--limiter-rps", "0"],
                vec!["leadhub", "--limiter-burst", "0"],
                vec!["leadhub", "--limiter-enabled", "maybe"],
                vec!["leadhub", "--env", "qa"],
                vec!["leadhub", "--port", "70000"],
                vec!["leadhub", "--log-level", "loud"],
            ] {
                assert!(new().try_get_matches_from(args.clone()).is_err(), "{args:?}");
            }
        });
    }

    #[test]
    fn test_admin_requires_both_flags() {
        with_env(&[], || {
            let result =
                new().try_get_matches_from(vec!["leadhub", "--admin-email", "root@leadhub.dev"]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::MissingRequiredArgument)
            );
        });
    }
}
