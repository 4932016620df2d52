use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use corner::auth::RemoteIdentity;
use corner::config::AppConfig;
use corner::openapi::ApiDoc;
use corner::rate_limit::{InMemoryRateLimiter, RateLimit, RateLimitConfig, RateLimiterFacade};
use corner::repo::pg::PgRepo;
use corner::{config, security, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        port = cfg.port,
        origins = ?cfg.cors_origins,
        rate_limit_max = cfg.rate_limit_max,
        rate_limit_window_ms = cfg.rate_limit_window.as_millis() as u64,
        production = cfg.production,
        hsts = cfg.enable_hsts,
        "bootstrapping yslids-api"
    );

    let anon_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&cfg.database_url)
        .context("DATABASE_URL is not a valid Postgres URL")?;
    let service_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&cfg.database_service_url)
        .context("DATABASE_SERVICE_URL is not a valid Postgres URL")?;

    if cfg.run_migrations {
        sqlx::migrate!("./migrations").run(&service_pool).await.context("applying migrations")?;
        info!("migrations applied");
    }

    let state = AppState {
        repo: Arc::new(PgRepo::new(anon_pool)),
        admin_repo: Arc::new(PgRepo::new(service_pool)),
        identity: Arc::new(RemoteIdentity::new(cfg.auth_url.clone(), cfg.auth_anon_key.clone())),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(true),
            RateLimitConfig::new(cfg.rate_limit_max, cfg.rate_limit_window),
        ),
    };
    let sweeper = state.rate_limiter.clone();
    actix_web::rt::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            sweeper.sweep();
        }
    });

    let openapi = ApiDoc::openapi();
    let port = cfg.port;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RateLimit::public())
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(cfg.enable_hsts))
            .wrap(security::cors(&cfg.cors_origins))
            .app_data(web::Data::new(state.clone()))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(("0.0.0.0", port))?;

    info!("listening on http://0.0.0.0:{port}");
    server.run().await?;
    Ok(())
}
