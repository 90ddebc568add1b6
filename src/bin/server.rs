//! Thin HTTP binary (SPEC_FULL.md §4.12.5). Boots config, wires `TurnRunner`
//! behind the axum router in `offer_engine::api`, and serves it. Contains no
//! workflow logic of its own.

use std::sync::Arc;

use offer_engine::api::{build_router, AppState};
use offer_engine::catalog::{DomainCatalog, InMemoryCatalog};
use offer_engine::classify::{LlmAdapter, NullLlmAdapter};
use offer_engine::config::KernelConfig;
use offer_engine::turn_runner::TurnRunner;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match KernelConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    log::info!("starting offer-engine server (env={})", config.env);

    let catalog: Arc<dyn DomainCatalog> = Arc::new(InMemoryCatalog::new(Vec::new(), Vec::new()));
    let llm: Arc<dyn LlmAdapter> = Arc::new(NullLlmAdapter);
    let config = Arc::new(config);
    let runner = Arc::new(TurnRunner::new((*config).clone(), catalog, llm));

    let addr = std::env::var("OE_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    log::info!("listening on {addr}");

    let router = build_router(AppState { runner, config });
    if let Err(e) = axum::serve(listener, router).await {
        log::error!("server exited with error: {e}");
        std::process::exit(1);
    }
}
