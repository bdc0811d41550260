use std::sync::Arc;
use tracing::info;

use veranda::{api::server::ApiServer, bus::EventBus, entity::Role, manager::Marketplace, store::Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Veranda daemon starting...");

    // Initialize the EventBus
    let bus = Arc::new(EventBus::new());

    // Initialize the Store
    // We use ~/.veranda/veranda.db unless VERANDA_DB points elsewhere
    let db_path = match std::env::var("VERANDA_DB") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            std::path::Path::new(&home_dir)
                .join(".veranda")
                .join("veranda.db")
        }
    };

    info!("Initializing store at {}", db_path.display());
    let store = Store::new(&db_path).await?;
    store.init().await?;

    // The first admin comes from the environment; every further role is
    // granted in-band by that admin.
    if let Ok(admin) = std::env::var("VERANDA_ADMIN") {
        info!("Granting admin role to {}", admin);
        store.grant_role(&admin, Role::Admin).await?;
    }

    let marketplace = Arc::new(Marketplace::new(Arc::new(store.clone()), bus.clone()));

    let app = ApiServer::new(marketplace).router();

    let port: u16 = std::env::var("VERANDA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    info!("Starting API server on port {}", port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                info!("Server stopped with error: {}", e);
            }
        }
    }

    store.close().await;

    Ok(())
}
