use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tokenkeeper::auth::{KeyManager, PasswordHasher};
use tokenkeeper::configuration::{get_configuration, StoreBackend};
use tokenkeeper::session::sweeper::spawn_sweeper;
use tokenkeeper::session::{InMemorySessionStore, PgSessionStore, SessionStore};
use tokenkeeper::startup::{build_gate, run};
use tokenkeeper::telemetry::init_telemetry;
use tokenkeeper::users::{InMemoryUserStore, PgUserStore, UserStore};

fn startup_error(kind: std::io::ErrorKind, what: &str) -> std::io::Error {
    std::io::Error::new(kind, what.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read configuration");
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    // Load the signing keypair, generating one on first start
    let key_settings = configuration.keys.clone();
    let keys = tokio::task::spawn_blocking(move || KeyManager::ensure_keypair(&key_settings))
        .await
        .map_err(|e| startup_error(std::io::ErrorKind::Other, &e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load signing keys");
            startup_error(std::io::ErrorKind::InvalidData, "Key error")
        })?;
    let keys = Arc::new(keys);

    let store_timeout = configuration.session_store.timeout();
    let (sessions, users): (Arc<dyn SessionStore>, Arc<dyn UserStore>) =
        match configuration.session_store.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory stores; sessions and users are lost on restart");
                (
                    Arc::new(InMemorySessionStore::new()),
                    Arc::new(InMemoryUserStore::new()),
                )
            }
            StoreBackend::Postgres => {
                tracing::info!("Attempting to connect to database");
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(store_timeout)
                    .connect(&configuration.database.connection_string())
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to create connection pool");
                        startup_error(
                            std::io::ErrorKind::ConnectionRefused,
                            "Database connection error",
                        )
                    })?;

                sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    startup_error(std::io::ErrorKind::Other, "Migration error")
                })?;
                tracing::info!("Database connection pool created successfully");

                (
                    Arc::new(PgSessionStore::new(pool.clone(), store_timeout)),
                    Arc::new(PgUserStore::new(pool, store_timeout)),
                )
            }
        };

    let sweep_every = configuration.session_store.sweep_interval_seconds;
    if sweep_every > 0 {
        spawn_sweeper(sessions.clone(), Duration::from_secs(sweep_every));
        tracing::info!(interval_seconds = sweep_every, "Session sweeper started");
    }

    let gate = build_gate(&configuration, keys, sessions);
    let hasher = PasswordHasher::new(configuration.password.cost);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    let server = run(listener, gate, users, hasher)?;
    server.await
}
