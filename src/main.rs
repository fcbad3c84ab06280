use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use witbot_gateway::{
    api,
    config::Config,
    constants::API_VERSION,
    storage::{KeyValueStore, MemoryStore, RedisStore},
    wallet::{EthersWallet, WalletConnector, WalletEvent, WalletEvents},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "witbot_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;
    let config = Arc::new(config);

    tracing::info!("Starting Witbot Gateway");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    let events = WalletEvents::new();
    let _event_log = events.subscribe(|event| match event {
        WalletEvent::Disconnected => tracing::warn!("Wallet disconnected"),
        other => tracing::info!("Wallet event: {:?}", other),
    });

    // Wallet connector (optional)
    let wallet: Option<Arc<dyn WalletConnector>> = match &config.wallet_private_key {
        Some(key) => {
            let wallet = EthersWallet::connect(
                key,
                config.chain_rpc_urls.clone(),
                config.default_chain_id,
                events.clone(),
            )
            .await?;
            Some(Arc::new(wallet) as Arc<dyn WalletConnector>)
        }
        None => None,
    };

    // Box cache backend
    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::connect(url, "witbot").await?),
        None => Arc::new(MemoryStore::new()),
    };

    let app_state = api::AppState::new(config.clone(), wallet, &events, store)?;
    let app = api::build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
