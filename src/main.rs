mod config;
mod controller;
mod errors;
mod pipeline;
mod routes;
mod storage;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Route;
use poem_openapi::OpenApiService;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

use crate::routes::AtriumApi;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(
    name = "atrium",
    version,
    about = "Image ingestion and compression service for the society management backend."
)]
struct Args {
    /// The path to the runtime config file (YAML or JSON).
    #[clap(short, long, env = "ATRIUM_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// The log filter directives passed to the tracing subscriber.
    #[clap(long, env = "ATRIUM_LOG", default_value = "info,atrium=debug")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    config::init(&args.config).await?;
    let cfg = config::config();

    let storage = cfg.backend.connect().await?;
    let global_limiter = cfg.max_concurrency.map(Semaphore::new).map(Arc::new);
    let controllers = controller::build_controllers(&cfg.profiles, global_limiter, storage);

    let app = OpenApiService::new(
        AtriumApi::new(controllers),
        "Atrium API",
        env!("CARGO_PKG_VERSION"),
    );
    let docs = app.redoc();
    let routes = Route::new().nest("/v1", app).nest("/docs", docs);

    let bind = format!("{}:{}", cfg.host, cfg.port);
    info!("Serving uploads @ http://{}/v1", bind);

    poem::Server::new(TcpListener::bind(bind)).run(routes).await?;

    Ok(())
}
