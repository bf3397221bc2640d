//! Client-side polling loop.
//!
//! One request is in flight at a time: the next poll is scheduled only after
//! the previous one settled, then after a fixed interval. Failures are logged
//! and retried on the next tick. The loop stops when its cancellation token
//! fires.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::GameError;
use crate::game::Registry;
use crate::sync::{self, SyncResponse};
use crate::types::GameSession;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Something that can answer fetch-state polls.
pub trait StateSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        game_id: &'a str,
        state_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<SyncResponse, PollError>>;
}

/// Polls a server over HTTP.
pub struct HttpStateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStateSource {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl StateSource for HttpStateSource {
    fn fetch<'a>(
        &'a self,
        game_id: &'a str,
        state_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<SyncResponse, PollError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/game-state", self.base_url))
                .json(&serde_json::json!({ "game_id": game_id, "state_id": state_id }))
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_MODIFIED {
                return Ok(SyncResponse::Unchanged);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PollError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let session: GameSession = response.json().await?;
            Ok(SyncResponse::Changed(Arc::new(session)))
        })
    }
}

/// In-process observers poll the registry directly.
impl StateSource for Registry {
    fn fetch<'a>(
        &'a self,
        game_id: &'a str,
        state_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<SyncResponse, PollError>> {
        Box::pin(async move { Ok(sync::fetch_state(self, game_id, state_id).await?) })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Polls `game_id` until `cancel` fires, calling `on_change(previous, latest)`
/// for every new snapshot. Returns the last snapshot seen.
pub async fn run<S, F>(
    source: &S,
    game_id: &str,
    settings: PollSettings,
    cancel: CancellationToken,
    mut on_change: F,
) -> Option<Arc<GameSession>>
where
    S: StateSource + ?Sized,
    F: FnMut(Option<&GameSession>, &GameSession),
{
    let mut last: Option<Arc<GameSession>> = None;

    loop {
        let token = last.as_ref().map(|s| s.version_token.clone());
        let poll = tokio::time::timeout(settings.request_timeout, source.fetch(game_id, token.as_deref()));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = poll => outcome,
        };

        match outcome {
            Ok(Ok(SyncResponse::Changed(session))) => {
                on_change(last.as_deref(), &session);
                last = Some(session);
            }
            Ok(Ok(SyncResponse::Unchanged)) => {}
            Ok(Err(e)) => tracing::warn!("Poll for game {} failed: {}", game_id, e),
            Err(_) => tracing::warn!("Poll for game {} timed out", game_id),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.interval) => {}
        }
    }

    tracing::debug!("Poller for game {} stopped", game_id);
    last
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::game::GameCommand;
    use crate::game::tests::{started_game, test_registry};

    /// Fails the first `failures` polls, then reports no change. Each poll
    /// takes `latency`; tracks how many were ever in flight at once.
    struct FlakySource {
        failures: usize,
        latency: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FlakySource {
        fn new(failures: usize, latency: Duration) -> Self {
            Self {
                failures,
                latency,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl StateSource for FlakySource {
        fn fetch<'a>(
            &'a self,
            _game_id: &'a str,
            _state_id: Option<&'a str>,
        ) -> BoxFuture<'a, Result<SyncResponse, PollError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.latency).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if call < self.failures {
                    Err(PollError::Game(GameError::Unavailable("down".into())))
                } else {
                    Ok(SyncResponse::Unchanged)
                }
            })
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(100),
            request_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_one_at_a_time_and_survives_failures() {
        let source = Arc::new(FlakySource::new(3, Duration::from_millis(250)));
        let cancel = CancellationToken::new();

        let task = {
            let source = source.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { run(source.as_ref(), "g", settings(), cancel, |_, _| {}).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(source.calls.load(Ordering::SeqCst) > 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_polls_time_out_and_retry() {
        let source = Arc::new(FlakySource::new(0, Duration::from_secs(60)));
        let cancel = CancellationToken::new();

        let task = {
            let source = source.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { run(source.as_ref(), "g", settings(), cancel, |_, _| {}).await })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        assert!(task.await.unwrap().is_none());
        assert!(source.calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poller_stops_scheduling() {
        let source = Arc::new(FlakySource::new(0, Duration::from_millis(10)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        run(source.as_ref(), "g", settings(), cancel, |_, _| {}).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_always_wins_over_a_ready_poll() {
        let source = FlakySource::new(0, Duration::ZERO);
        for _ in 0..64 {
            let cancel = CancellationToken::new();
            cancel.cancel();
            run(&source, "g", settings(), cancel, |_, _| {}).await;
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn observes_each_change_once() {
        let (registry, _) = test_registry();
        let handle = started_game(&registry, "watched").await;
        let cancel = CancellationToken::new();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::default();

        let task = {
            let registry = registry.clone();
            let cancel = cancel.clone();
            let seen = seen.clone();
            let fast = PollSettings {
                interval: Duration::from_millis(5),
                request_timeout: Duration::from_secs(1),
            };
            tokio::spawn(async move {
                run(registry.as_ref(), "watched", fast, cancel, |_, s| {
                    seen.lock().unwrap().push(s.round)
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.apply(GameCommand::EndTurn { expected_round: 0 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let last = task.await.unwrap().unwrap();
        assert_eq!(last.round, 1);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
