pub mod routes;

use crate::ai::ReportFetcher;
use crate::config::Config;
use crate::export::Rasterizer;
use crate::workflow::Workflow;
use anyhow::{Context, Result};
use axum::Router;
use rust_embed::RustEmbed;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::info;

#[derive(RustEmbed)]
#[folder = "frontend/dist"]
struct FrontendAssets;

pub async fn run_server(
    config: Arc<Config>,
    fetcher: ReportFetcher,
    rasterizer: Arc<dyn Rasterizer>,
) -> Result<()> {
    let port = config.api_port;
    let state = routes::ApiState {
        config,
        workflow: Arc::new(Mutex::new(Workflow::new())),
        fetcher,
        rasterizer,
    };
    let app: Router = routes::router(state);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard server: {addr}"))?;

    info!(address = %addr, "zhaowen dashboard started");

    axum::serve(listener, app)
        .await
        .context("Dashboard server failed")?;

    Ok(())
}

pub fn get_embedded_asset(path: &str) -> Option<(Vec<u8>, String)> {
    let normalized = path.trim_start_matches('/');
    let requested = if normalized.is_empty() {
        "index.html"
    } else {
        normalized
    };

    FrontendAssets::get(requested)
        .map(|content| (content, requested))
        .or_else(|| FrontendAssets::get("index.html").map(|content| (content, "index.html")))
        .map(|(content, served)| {
            let mime = mime_guess::from_path(served)
                .first_or_octet_stream()
                .to_string();
            (content.data.into_owned(), mime)
        })
}
