#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use runlog_adapter::http::{body_limit_bytes, router};
use runlog_adapter::AdapterRuntime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = env::var("RUNLOG_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = env::var("RUNLOG_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime = Arc::new(AdapterRuntime::default_from_env()?);
    let body_limit = body_limit_bytes(runtime.evidence_max_bytes());
    let app = router(runtime);

    info!(%addr, body_limit, "runlog_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
