use std::sync::Arc;

use tavola::http::{self, AppState};
use tavola::registry::GameRegistry;
use tavola::store::{self, Store};
use tavola::{config, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let store = Store::new(config::data_path().join("games.db"));
    store.init()?;
    tokio::spawn(store::sweep_loop(store.clone()));

    let registry = Arc::new(GameRegistry::new(store));
    let app = http::router(AppState { registry });

    let addr = config::server_addr();
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
