//! Process bootstrap (§10.8): init tracing, load config, construct the
//! `Node`, mount the HTTP router, serve.

use causal_kvs::config::{Config, LISTEN_ADDR};
use causal_kvs::node::Node;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(self_addr = %config.self_addr, "starting node");

    let node = Node::new(config.self_addr);
    let app = causal_kvs::http::router(node);

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR).await?;
    tracing::info!(addr = LISTEN_ADDR, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
