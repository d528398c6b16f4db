//! Main entry point for the Latchkey demo server.
//!
//! Loads configuration, builds the script executor for the configured
//! backend and serves the session and cache APIs over HTTP.

use actix_web::{App, HttpServer, middleware::Logger, web};
use tracing::info;

use latchkey_server::{AppState, Configuration, api, startup};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let metrics_handle = if configuration.metrics_enabled() {
        Some(web::Data::new(startup::init_metrics()?))
    } else {
        None
    };

    let store = configuration.store_config()?;
    let executor = latchkey_store::build_executor(&store)?;
    info!(
        backend = executor.backend_name(),
        key_prefix = %store.key_prefix,
        default_ttl_secs = store.default_ttl_secs,
        "Store configured"
    );

    let state = web::Data::new(AppState::new(executor, &store, &configuration));
    let address = configuration.server_address();
    let port = configuration.server_port();
    info!("Starting Latchkey server on {}:{}", address, port);

    let mut server = HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(api::routes);
        if let Some(handle) = metrics_handle.clone() {
            app = app.app_data(handle).service(api::render_metrics);
        }
        app
    });
    if let Some(workers) = configuration.server_workers() {
        server = server.workers(workers);
    }

    server.bind((address.as_str(), port))?.run().await?;
    info!("Latchkey server stopped");
    Ok(())
}
