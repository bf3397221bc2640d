use tracing_subscriber::EnvFilter;

use wordbowl::config;
use wordbowl::game::Registry;
use wordbowl::routes::{self, AppState};

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_dir = config::config_dir();
    config::init(&config_dir)?;

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()?;

    let game_config = config::load_game_config(&config_dir)?;
    let default_words = config::load_word_set(&config_dir)?;

    let registry = Registry::new(game_config, default_words);
    let app = routes::app(AppState { registry });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!("Wordbowl server running on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
