use crate::data::{
    users::hash_password,
    validator::{validate_email, validate_password_plaintext},
    with_deadline, MemoryStore, Models, Tenant, User, Validator, PERMISSION_ADMIN_WRITE,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;

pub mod background;
pub mod error;
pub mod handlers;
pub mod interceptor;
pub mod mail;
mod openapi;

pub use self::openapi::ApiDoc;

use self::{
    background::Background,
    error::ApiError,
    handlers::{health, tenants, trade_leads, users},
    interceptor::{
        Authenticate, Chain, Metrics, RateLimit, RateLimitConfig, RateLimiter, RecoverPanic,
        RequestMetrics, RequireActivatedUser, RequireAuthenticatedUser, RequirePermission,
    },
    mail::{LogMailer, Mailer},
};

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_ENV: &str = "development";
pub const DEFAULT_ACTIVATION_URL: &str = "http://localhost:4000/v1/api/activated/token=";
pub const DEFAULT_AUTHENTICATION_URL: &str = "http://localhost:4000/v1/api";
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// An activated administrator created at startup.
#[derive(Clone, Debug)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: SecretString,
}

/// Runtime settings for the API server.
#[derive(Clone, Debug)]
pub struct Config {
    pub env: String,
    pub rate_limit: RateLimitConfig,
    pub activation_url: String,
    pub authentication_url: String,
    pub cors_trusted_origins: Vec<String>,
    pub shutdown_timeout: Duration,
    pub admin: Option<AdminBootstrap>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: DEFAULT_ENV.to_string(),
            rate_limit: RateLimitConfig::default(),
            activation_url: DEFAULT_ACTIVATION_URL.to_string(),
            authentication_url: DEFAULT_AUTHENTICATION_URL.to_string(),
            cors_trusted_origins: Vec::new(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECONDS),
            admin: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn with_activation_url(mut self, url: impl Into<String>) -> Self {
        self.activation_url = url.into();
        self
    }

    #[must_use]
    pub fn with_authentication_url(mut self, url: impl Into<String>) -> Self {
        self.authentication_url = url.into();
        self
    }

    #[must_use]
    pub fn with_cors_trusted_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_trusted_origins = origins;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout_seconds(mut self, seconds: u64) -> Self {
        self.shutdown_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_admin(mut self, admin: Option<AdminBootstrap>) -> Self {
        self.admin = admin;
        self
    }
}

/// Everything a handler can reach, shared behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub models: Models,
    pub background: Background,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: Arc<RateLimiter>,
    /// Request counters; `None` when they could not be registered.
    pub metrics: Option<Arc<RequestMetrics>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, models: Models, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let metrics = match RequestMetrics::new() {
            Ok(metrics) => Some(Arc::new(metrics)),
            Err(err) => {
                error!("failed to register request metrics: {err}");
                None
            }
        };
        Self {
            config,
            models,
            background: Background::new(),
            mailer,
            limiter,
            metrics,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

/// Build the full application router.
///
/// Every route, including the fallback, runs through metrics, recover panic,
/// rate limit and authenticate in that order. Tenant and trade lead routes add
/// the activated-user gate; their admin routes add the `admin:write` permission
/// gate after it.
///
/// # Errors
/// Returns an error if a trusted CORS origin is not a valid URL.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let models = &state.models;

    let user_routes = Router::new()
        .route("/v1/api", post(users::register))
        .route("/v1/api/activated", put(users::activate))
        .route("/v1/api/authentication", post(users::authenticate));

    let admin_routes = Chain::new()
        .with(RequirePermission::new(
            PERMISSION_ADMIN_WRITE,
            models.permissions.clone(),
        ))
        .route_layer(
            Router::new()
                .route(
                    "/v1/tenants/admin",
                    post(tenants::create_tenant).get(tenants::list_tenants),
                )
                .route(
                    "/v1/tenants/admin/:tenant_id/:version",
                    patch(tenants::update_tenant),
                )
                .route("/v1/trade_leads/admin", get(trade_leads::list_trade_leads))
                .route(
                    "/v1/trade_leads/admin/stats",
                    get(trade_leads::trade_lead_stats),
                )
                .route(
                    "/v1/trade_leads/admin/:lead_id/:version",
                    patch(trade_leads::update_trade_lead_status),
                ),
        );

    let tenant_routes = Chain::new()
        .with(RequireAuthenticatedUser)
        .with(RequireActivatedUser)
        .route_layer(
            Router::new()
                .route("/v1/tenants", get(tenants::get_own_tenant))
                .route(
                    "/v1/trade_leads",
                    post(trade_leads::create_trade_lead).get(trade_leads::list_own_trade_leads),
                )
                .merge(admin_routes),
        );

    let routes = Router::new()
        .route("/v1/health", get(health::health))
        .merge(user_routes)
        .merge(tenant_routes)
        .fallback(not_found);

    let mut global = Chain::new();
    if let Some(metrics) = &state.metrics {
        global = global.with(Metrics::new(metrics.clone()));
    }
    let global = global
        .with(RecoverPanic)
        .with(RateLimit::new(state.limiter.clone()))
        .with(Authenticate::new(models.tokens.clone()));

    let cors = cors_layer(&state.config.cors_trusted_origins)?;

    Ok(global.layer(routes).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(state)),
    ))
}

async fn not_found() -> Response {
    ApiError::NotFound.into_response()
}

/// Start the server and block until it has shut down.
///
/// # Errors
/// Returns an error if bootstrapping, binding or serving fails.
pub async fn new(port: u16, config: Config) -> Result<()> {
    let models = Models::from_store(Arc::new(MemoryStore::new()));
    if let Some(admin) = &config.admin {
        bootstrap_admin(&models, admin).await?;
    }

    let state = Arc::new(AppState::new(config, models, Arc::new(LogMailer)));

    let shutdown = CancellationToken::new();
    let sweeper = state.limiter.spawn_sweeper(shutdown.clone());

    let app = router(state.clone())?;

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!(
        env = %state.config.env,
        rate_limit = ?state.config.rate_limit,
        "Listening on [::]:{}",
        port
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        warn!("rate limiter sweeper ended abnormally: {err}");
    }

    if !state.background.shutdown(state.config.shutdown_timeout).await {
        warn!("shutdown timeout reached with background tasks still running");
    }

    if let Some(metrics) = &state.metrics {
        info!(
            requests_received = metrics.requests_received(),
            responses_sent = metrics.responses_sent(),
            processing_time_us = metrics.processing_time_us(),
            "request totals"
        );
    }

    info!("Gracefully shutdown");
    Ok(())
}

/// Create the administrator, its tenant and the `admin:write` grant.
///
/// Credentials go through the same checks as a registration; a bad email or
/// password stops startup.
async fn bootstrap_admin(models: &Models, admin: &AdminBootstrap) -> Result<()> {
    let mut v = Validator::new();
    validate_email(&mut v, &admin.email);
    validate_password_plaintext(&mut v, admin.password.expose_secret());
    if !v.valid() {
        let problems = v
            .into_errors()
            .into_iter()
            .map(|(field, message)| format!("{field} {message}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(anyhow!("Invalid admin credentials: {problems}"));
    }

    let mut tenant = Tenant::new(
        "leadhub".to_string(),
        admin.email.clone(),
        "Service operators".to_string(),
    );
    with_deadline(models.tenants.insert_tenant(&mut tenant))
        .await
        .context("Failed to create admin tenant")?;

    let mut user = User::new(tenant.id, "admin".to_string(), admin.email.clone());
    let password = admin.password.clone();
    user.password.hash = Some(
        tokio::task::spawn_blocking(move || hash_password(password.expose_secret()))
            .await
            .context("Admin password hashing task failed")??,
    );
    with_deadline(models.users.insert(&mut user))
        .await
        .context("Failed to create admin user")?;

    user.activated = true;
    with_deadline(models.users.update(&mut user))
        .await
        .context("Failed to activate admin user")?;
    with_deadline(
        models
            .permissions
            .add_for_user(user.id, &[PERMISSION_ADMIN_WRITE]),
    )
    .await
    .context("Failed to grant admin permission")?;

    info!(user_id = user.id, tenant_id = tenant.id, "bootstrapped admin user");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!("Failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn cors_layer(trusted_origins: &[String]) -> Result<CorsLayer> {
    let origins = trusted_origins
        .iter()
        .map(|origin| origin_header(origin))
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([HeaderName::from_static("link")])
        .max_age(Duration::from_secs(300)))
}

fn origin_header(origin: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(origin).with_context(|| format!("Invalid trusted CORS origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Trusted CORS origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build CORS origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn origin_header_strips_path() {
        assert_eq!(
            origin_header("https://app.leadhub.dev/dashboard").unwrap(),
            "https://app.leadhub.dev"
        );
        assert_eq!(
            origin_header("http://localhost:5173").unwrap(),
            "http://localhost:5173"
        );
        assert!(origin_header("not a url").is_err());
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = Config::new()
            .with_env("production")
            .with_rate_limit(RateLimitConfig::disabled())
            .with_shutdown_timeout_seconds(5);
        assert_eq!(config.env, "production");
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.activation_url, DEFAULT_ACTIVATION_URL);
    }

    #[tokio::test]
    async fn bootstrap_admin_grants_permission() {
        let models = Models::from_store(Arc::new(MemoryStore::new()));
        let admin = AdminBootstrap {
            email: "root@leadhub.dev".to_string(),
            password: SecretString::from("change-me-now".to_string()),
        };
        bootstrap_admin(&models, &admin).await.unwrap();

        let user = models.users.get_by_email("root@leadhub.dev").await.unwrap();
        assert!(user.activated);
        assert!(models
            .permissions
            .get_all_for_user(user.id)
            .await
            .unwrap()
            .includes(PERMISSION_ADMIN_WRITE));
        assert!(models.tenants.get_tenant_by_id(user.tenant_id).await.is_ok());
    }

    #[tokio::test]
    async fn bootstrap_admin_rejects_bad_credentials() {
        let models = Models::from_store(Arc::new(MemoryStore::new()));
        for (email, password) in [
            ("not-an-email", "change-me-now"),
            ("root@leadhub.dev", "short"),
            ("root@leadhub.dev", ""),
        ] {
            let admin = AdminBootstrap {
                email: email.to_string(),
                password: SecretString::from(password.to_string()),
            };
            let err = bootstrap_admin(&models, &admin).await.unwrap_err();
            assert!(
                err.to_string().starts_with("Invalid admin credentials"),
                "{email}: {err}"
            );
        }

        // nothing was created
        assert!(models
            .tenants
            .list("", &crate::data::Filters::default())
            .await
            .is_err());
    }
}
