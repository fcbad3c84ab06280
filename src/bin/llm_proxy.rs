use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use witbot_gateway::{
    api::llm::{build_llm_router, LlmState},
    config::Config,
    services::LlmClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "witbot_gateway=debug,llm_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let state = LlmState {
        client: Arc::new(LlmClient::from_config(&config)?),
    };
    let app = build_llm_router(state, &config.llm_allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.host, config.llm_proxy_port).parse()?;
    tracing::info!("LLM proxy listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
