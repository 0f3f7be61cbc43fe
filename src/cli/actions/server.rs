use crate::{api, cli::telemetry};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub config: api::Config,
}

/// Run the API server until a shutdown signal arrives.
///
/// # Errors
/// Returns an error if the server fails to start or stops abnormally.
pub async fn execute(args: Args) -> Result<()> {
    debug!(port = args.port, env = %args.config.env, "starting server");

    let result = api::new(args.port, args.config).await;

    telemetry::shutdown_tracer();

    result
}
