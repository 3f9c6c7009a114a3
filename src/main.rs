use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chattercraft_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    chattercraft_server::app::run().await
}
