use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = praxis::config::Config::from_env();
    info!(
        target: "praxis",
        "praxis starting: RUST_LOG='{}', http_port={}, front_end_base_url='{}', registration_token_ttl_hours={}, session_ttl_minutes={}",
        rust_log,
        config.http_port,
        config.front_end_base_url,
        config.registration_token_ttl_hours,
        config.session_ttl_minutes
    );

    praxis::server::run_with_config(config).await
}
