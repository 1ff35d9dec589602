// Nexus Equity - Web Server
// Accreditation + dilution REST API over the local scenario store

use anyhow::{Context, Result};
use nexus_equity::api::{router, AppState};
use nexus_equity::{init_tracing, setup_database, AppConfig};
use rusqlite::Connection;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config file as the only argument
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_tracing(&config);

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    setup_database(&conn)?;
    tracing::info!(db = ?config.db_path, "database opened");

    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
