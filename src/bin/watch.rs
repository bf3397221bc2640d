//! Tails one game from the terminal by polling the server.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wordbowl::engine;
use wordbowl::poller::{self, HttpStateSource, PollSettings};
use wordbowl::sync::{SessionTransition, derive_transitions};
use wordbowl::timer::{self, Clock, SystemClock};
use wordbowl::types::GameSession;

fn report(prev: Option<&GameSession>, next: &GameSession) {
    if prev.is_none() {
        tracing::info!("Watching game {} in stage {}", next.id, next.stage);
    }
    for transition in derive_transitions(prev, next) {
        match transition {
            SessionTransition::GameReset => tracing::info!("New game started"),
            SessionTransition::StageChanged { stage } => match stage.mode() {
                Some(mode) if stage.is_active() => tracing::info!("Stage is now {} ({:?})", stage, mode),
                Some(mode) => tracing::info!("Stage {} done, {:?} is up next", stage, mode),
                None => tracing::info!("Stage is now {}", stage),
            },
            SessionTransition::TurnPassed { round, team } => {
                tracing::info!("Round {}: {} team's turn", round, team)
            }
            SessionTransition::GameWon { team } => tracing::info!("Game over, winner: {}", team),
        }
    }

    let left = timer::remaining(next, SystemClock.now());
    tracing::info!(
        "red {} / blue {} | {} words left | {}s on the clock",
        next.team_points.red,
        next.team_points.blue,
        engine::remaining(next),
        left.as_secs()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base_url = std::env::var("WORDBOWL_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let game_id = std::env::var("GAME_ID")?;
    let interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
        .unwrap_or_else(|_| "2000".to_string())
        .parse()?;

    let settings = PollSettings {
        interval: Duration::from_millis(interval_ms),
        ..PollSettings::default()
    };
    let source = HttpStateSource::new(base_url, settings.request_timeout)?;

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    poller::run(&source, &game_id, settings, cancel, report).await;
    Ok(())
}
