use crate::api::interceptor::RateLimitConfig;
use clap::{Arg, ArgAction, Command};

pub const ARG_LIMITER_RPS: &str = "limiter-rps";
pub const ARG_LIMITER_BURST: &str = "limiter-burst";
pub const ARG_LIMITER_ENABLED: &str = "limiter-enabled";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LIMITER_RPS)
                .long(ARG_LIMITER_RPS)
                .help("Sustained requests per second allowed per client IP")
                .env("LEADHUB_LIMITER_RPS")
                .default_value("5")
                .value_parser(parse_rate),
        )
        .arg(
            Arg::new(ARG_LIMITER_BURST)
                .long(ARG_LIMITER_BURST)
                .help("Requests a client may send at once before being limited")
                .env("LEADHUB_LIMITER_BURST")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIMITER_ENABLED)
                .long(ARG_LIMITER_ENABLED)
                .help("Enable per-client rate limiting")
                .env("LEADHUB_LIMITER_ENABLED")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
}

fn parse_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err("rate must be a positive number".to_string())
    }
}

/// Rate limiter settings, falling back to the built-in defaults.
#[must_use]
pub fn parse(matches: &clap::ArgMatches) -> RateLimitConfig {
    let defaults = RateLimitConfig::default();
    RateLimitConfig {
        requests_per_second: matches
            .get_one::<f64>(ARG_LIMITER_RPS)
            .copied()
            .unwrap_or(defaults.requests_per_second),
        burst: matches
            .get_one::<u32>(ARG_LIMITER_BURST)
            .copied()
            .unwrap_or(defaults.burst),
        enabled: matches
            .get_one::<bool>(ARG_LIMITER_ENABLED)
            .copied()
            .unwrap_or(defaults.enabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate_rejects_non_positive() {
        assert_eq!(parse_rate("2.5"), Ok(2.5));
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("-1").is_err());
        assert!(parse_rate("fast").is_err());
        assert!(parse_rate("inf").is_err());
    }
}
