use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, response::IntoResponse};
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod clock;
mod config;
mod db;
mod error;
mod middleware;
mod recurrence;
mod routes;
mod services;

use clock::{Clock, SystemClock};
use config::{Config, LoggingConfig};
use db::SqliteStore;
use error::AppError;
use recurrence::expand::Expander;
use services::{
    auth::AuthService, events::EventService, init, routines::RoutineService, tasks::TaskService,
};

pub struct AppState {
    pub store: SqliteStore,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn events(&self) -> EventService<'_, SqliteStore> {
        EventService::new(
            &self.store,
            self.clock.as_ref(),
            Expander::new(self.config.recurrence.expansion_max_steps),
        )
    }

    pub fn routines(&self) -> RoutineService<'_, SqliteStore> {
        RoutineService::new(
            &self.store,
            self.clock.as_ref(),
            self.config.recurrence.streak_lookback_days,
        )
    }

    pub fn tasks(&self) -> TaskService<'_, SqliteStore> {
        TaskService::new(&self.store, self.clock.as_ref())
    }

    pub fn auth(&self) -> AuthService<'_, SqliteStore> {
        AuthService::new(
            &self.store,
            &self.config.jwt,
            self.config.security.bcrypt_cost,
        )
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "life_organizer=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Rate limiter rejections in the same JSON shape as every other error.
fn rate_limit_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut resp = AppError::RateLimited.into_response();
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut()
                .insert(http::header::RETRY_AFTER, HeaderValue::from(wait_time));
            resp
        }
        GovernorError::UnableToExtractKey => {
            AppError::BadRequest("Unable to determine client IP for rate limiting".to_string())
                .into_response()
        }
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to bind SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    tracing::info!("Starting life organizer backend");

    let pool = init::init_db(&config).await?;
    let app_state = Arc::new(AppState {
        store: SqliteStore::new(pool.clone()),
        config: config.clone(),
        clock: Arc::new(SystemClock),
    });

    // Per-IP limiter for the credential endpoints.
    let mut auth_builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    auth_builder
        .per_second(config.rate_limit.auth_per_second.into())
        .burst_size(config.rate_limit.auth_burst)
        .error_handler(rate_limit_response);
    let auth_gov_conf = Arc::new(
        auth_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build auth governor config"))?,
    );

    let limiter_cleanup = {
        let limiter = auth_gov_conf.limiter().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                tracing::debug!("auth rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let auth_rate_layer = GovernorLayer {
        config: auth_gov_conf,
    };

    let app = routes::router()
        .merge(routes::auth::public_router().layer(auth_rate_layer))
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::csp::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(config.server.frontend_url.parse::<HeaderValue>()?)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                    http::Method::PATCH,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                ])
                .allow_credentials(true),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    limiter_cleanup.abort();
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
