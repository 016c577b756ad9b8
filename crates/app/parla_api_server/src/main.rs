//! Parla API server binary.
//!
//! Connects to PostgreSQL, runs migrations, wires the auth and chat
//! collaborators together and serves the HTTP API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parla_api::config::ApiConfig;
use parla_core::auth::jwt::JwtSigner;
use parla_core::auth::password::BcryptHasher;
use parla_core::auth::service::AuthService;
use parla_core::auth::store::PgRefreshTokenStore;
use parla_core::auth::users::PgUserStore;
use parla_core::chat::openai::{OpenAiConfig, OpenAiProvider};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "parla_api_server", about = "Parla API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// Port to listen on; overrides the port of `--bind-addr` (0 = ephemeral).
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/parla"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Mark session cookies `Secure` (serve over HTTPS).
    #[arg(long, env = "COOKIE_SECURE", default_value_t = false)]
    cookie_secure: bool,

    /// Seconds between sweeps of expired refresh tokens.
    #[arg(long, default_value_t = 3600)]
    purge_interval_secs: u64,
}

impl Args {
    fn listen_addr(&self) -> String {
        match self.port {
            Some(port) => {
                let host = self
                    .bind_addr
                    .rsplit_once(':')
                    .map_or(self.bind_addr.as_str(), |(host, _)| host);
                format!("{host}:{port}")
            }
            None => self.bind_addr.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parla_api=debug,parla_core=debug")),
        )
        .init();

    let args = Args::parse();
    let bind_addr = args.listen_addr();

    info!(version = parla_core::version(), bind_addr = %bind_addr, "starting parla_api_server");
    info!(max_connections = args.max_connections, "configuring connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    parla_api::migrate(&pool).await?;

    // Secrets come from the environment (or their persisted files); the
    // command line wins for everything else.
    let config = ApiConfig {
        bind_addr,
        pg_connection_url: args.database_url.clone(),
        cookie_secure: args.cookie_secure,
        ..ApiConfig::from_env()
    };

    let signer = JwtSigner::new(
        config.access_token_secret.as_bytes(),
        config.refresh_token_secret.as_bytes(),
    )?;
    let auth = AuthService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(signer),
        Arc::new(BcryptHasher::new()),
    );

    let openai = OpenAiConfig::from_env();
    if openai.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; chat replies and speech are unavailable");
    }
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let chat = Arc::new(OpenAiProvider::new(http, openai));

    spawn_token_purge(auth.clone(), Duration::from_secs(args.purge_interval_secs.max(1)));

    let state = parla_api::AppState {
        pool,
        config: config.clone(),
        auth,
        chat,
    };
    let app = parla_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Periodically delete refresh tokens past their absolute expiry.
fn spawn_token_purge(auth: AuthService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match auth.purge_expired_tokens().await {
                Ok(0) => debug!("no expired refresh tokens"),
                Ok(removed) => info!(removed, "purged expired refresh tokens"),
                Err(e) => warn!(error = %e, "refresh token purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_overrides_bind_addr_port() {
        let args = Args::parse_from(["parla_api_server", "--bind-addr", "0.0.0.0:8080", "--port", "0"]);
        assert_eq!(args.listen_addr(), "0.0.0.0:0");
    }

    #[test]
    fn bind_addr_is_used_without_port() {
        let args = Args::parse_from(["parla_api_server", "--bind-addr", "127.0.0.1:9000"]);
        assert_eq!(args.listen_addr(), "127.0.0.1:9000");
    }
}
