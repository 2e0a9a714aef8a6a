use std::sync::Arc;
use tokio::net::TcpListener;

use karaoke_server::config::{generate_config_template, Config};
use karaoke_server::party::{MemoryPartyStore, PartyStore, SqlitePartyStore};
use karaoke_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("karaoke_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Karaoke server v{} starting", env!("CARGO_PKG_VERSION"));

    let parties: Arc<dyn PartyStore> = if config.in_memory {
        tracing::info!("Using in-memory party store");
        Arc::new(MemoryPartyStore::new())
    } else {
        Arc::new(SqlitePartyStore::new(db::init_db(&config.data_dir)?))
    };

    let state = state::AppState::new(parties).with_keepalive(config.keepalive());
    let app = routes::build_router(state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
