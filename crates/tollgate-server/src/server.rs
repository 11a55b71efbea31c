use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tollgate_auth::oauth::{AuthorizationConfig, AuthorizationService};
use tollgate_auth::storage::{MemoryStore, Stores};
use tollgate_auth::token::TokenService;
use tollgate_auth::{OAuthState, oauth_router};
use tower_http::trace::TraceLayer;

use crate::bootstrap;
use crate::config::AppConfig;

pub struct TollgateServer {
    addr: SocketAddr,
    app: Router,
    store: Arc<MemoryStore>,
    cleanup_interval: Duration,
}

/// Wires the OAuth services over `stores` and mounts their routes.
pub fn build_app(cfg: &AppConfig, stores: Stores) -> anyhow::Result<Router> {
    let jwt_service = bootstrap::jwt_service(&cfg.auth)?;

    let authorization_service = Arc::new(AuthorizationService::new(
        stores.clone(),
        AuthorizationConfig::from(&cfg.auth),
    ));
    let token_service = Arc::new(TokenService::new(jwt_service, stores, &cfg.auth));

    let app = oauth_router(OAuthState::new(authorization_service, token_service))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes));

    Ok(app)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<TollgateServer> {
        let store = bootstrap::seed_store(&self.config)?;
        let app = build_app(&self.config, Stores::in_memory(store.clone()))?;

        Ok(TollgateServer {
            addr: self.addr,
            app,
            store,
            cleanup_interval: Duration::from_secs(self.config.server.cleanup_interval_secs),
        })
    }
}

impl TollgateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = bootstrap::spawn_cleanup(self.store, self.cleanup_interval);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        cleanup.abort();
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
