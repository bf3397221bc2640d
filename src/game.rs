use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::engine::{self, Applied, NewGame};
use crate::error::GameError;
use crate::scoring::{HighestScore, ScoringPolicy};
use crate::sync;
use crate::timer::{self, Clock, SystemClock};
use crate::types::*;

/// Commands the HTTP layer sends to a session task.
#[derive(Debug, Clone)]
pub enum GameCommand {
    AddPlayer {
        player_name: String,
    },
    ChangePlayer {
        old_player_name: String,
        team: Team,
        player_name: Option<String>,
    },
    DeletePlayer {
        player_name: String,
    },
    AddWord {
        word: String,
    },
    DeleteWord {
        word: String,
    },
    StartGame,
    StartNextStage,
    NextWord {
        correct: bool,
    },
    EndTurn {
        expected_round: u32,
    },
    /// Timer-driven end of `round`. Ignored unless that round is still running
    /// and its enforced timer has run out.
    ExpireTurn {
        round: u32,
    },
    NextGame {
        word_set: Option<Vec<String>>,
        timer_duration_ms: Option<u64>,
        enforce_timer: Option<bool>,
        random_words: Option<bool>,
        confirm: Option<String>,
    },
}

impl From<NextGameRequest> for GameCommand {
    fn from(req: NextGameRequest) -> Self {
        Self::NextGame {
            word_set: req.word_set,
            timer_duration_ms: req.timer_duration_ms,
            enforce_timer: req.enforce_timer,
            random_words: req.random_words,
            confirm: req.confirm,
        }
    }
}

/// What a session task answers to a command.
#[derive(Debug, Clone)]
pub enum Dispatched {
    Session(Arc<GameSession>),
    ConfirmationRequired { state_id: String },
}

struct Envelope {
    command: GameCommand,
    reply: oneshot::Sender<Result<Dispatched, GameError>>,
}

fn create_game_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn validate_game_id(game_id: &str) -> Result<(), GameError> {
    if game_id.trim().is_empty() || game_id.len() > 64 {
        return Err(GameError::validation("game id must be 1 to 64 characters"));
    }
    Ok(())
}

/// Cloneable entry point to one session task.
#[derive(Clone)]
pub struct GameHandle {
    pub game_id: String,
    instance: Uuid,
    cmd_tx: mpsc::Sender<Envelope>,
    snapshot_rx: watch::Receiver<Arc<GameSession>>,
    timeout: Duration,
}

impl GameHandle {
    /// Latest published state. Does not wait on the session task.
    pub fn snapshot(&self) -> Arc<GameSession> {
        self.snapshot_rx.borrow().clone()
    }

    /// Queues a command and waits for the task's answer, bounded by the
    /// configured command timeout.
    pub async fn dispatch(&self, command: GameCommand) -> Result<Dispatched, GameError> {
        let (reply, reply_rx) = oneshot::channel();
        let exchange = async {
            self.cmd_tx
                .send(Envelope { command, reply })
                .await
                .map_err(|_| GameError::Unavailable(format!("game {} closed", self.game_id)))?;
            reply_rx
                .await
                .map_err(|_| GameError::Unavailable(format!("game {} dropped the command", self.game_id)))?
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| GameError::Unavailable(format!("game {} timed out", self.game_id)))?
    }

    /// Dispatches a command that always answers with the session.
    pub async fn apply(&self, command: GameCommand) -> Result<Arc<GameSession>, GameError> {
        match self.dispatch(command).await? {
            Dispatched::Session(session) => Ok(session),
            Dispatched::ConfirmationRequired { .. } => {
                Err(GameError::precondition("next game needs confirmation"))
            }
        }
    }

    pub async fn next_game(&self, req: NextGameRequest) -> Result<NextGameOutcome, GameError> {
        match self.dispatch(req.into()).await? {
            Dispatched::Session(game) => Ok(NextGameOutcome::Reset {
                game: game.as_ref().clone(),
            }),
            Dispatched::ConfirmationRequired { state_id } => {
                Ok(NextGameOutcome::ConfirmationRequired {
                    game_id: self.game_id.clone(),
                    state_id,
                })
            }
        }
    }
}

/// Registry holds all live sessions.
pub struct Registry {
    /// game_id -> session handle
    pub games: dashmap::DashMap<String, GameHandle>,
    config: GameConfig,
    default_words: Vec<String>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn ScoringPolicy>,
    /// Last revision handed out, across all sessions and re-created ids.
    revision: AtomicU64,
}

impl Registry {
    pub fn new(config: GameConfig, default_words: Vec<String>) -> Arc<Self> {
        Self::with_parts(config, default_words, Arc::new(SystemClock), Arc::new(HighestScore))
    }

    pub fn with_parts(
        config: GameConfig,
        default_words: Vec<String>,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn ScoringPolicy>,
    ) -> Arc<Self> {
        let start = u64::try_from(clock.now().unix_timestamp_nanos()).unwrap_or(0);
        Arc::new(Self {
            games: dashmap::DashMap::new(),
            config,
            default_words,
            clock,
            policy,
            revision: AtomicU64::new(start),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn get(&self, game_id: &str) -> Result<GameHandle, GameError> {
        self.games
            .get(game_id)
            .map(|h| h.clone())
            .ok_or_else(|| GameError::not_found(game_id))
    }

    /// Returns the session for `game_id`, creating it in Setup if missing.
    /// `None` creates a session under a fresh id.
    pub fn get_or_create(self: &Arc<Self>, game_id: Option<&str>) -> Result<GameHandle, GameError> {
        let game_id = match game_id {
            Some(id) => {
                validate_game_id(id)?;
                id.to_string()
            }
            None => create_game_id(),
        };
        let handle = self
            .games
            .entry(game_id.clone())
            .or_insert_with(|| spawn_game(self.clone(), game_id))
            .clone();
        Ok(handle)
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Removes `game_id` only if it still points at `instance`.
    fn remove_instance(&self, game_id: &str, instance: Uuid) {
        self.games.remove_if(game_id, |_, h| h.instance == instance);
    }

    /// Dispatches to an existing session.
    pub async fn command(&self, game_id: &str, command: GameCommand) -> Result<Arc<GameSession>, GameError> {
        self.get(game_id)?.apply(command).await
    }
}

fn spawn_game(registry: Arc<Registry>, game_id: String) -> GameHandle {
    let now = registry.clock.now();
    let mut session = engine::new_session(
        &game_id,
        NewGame {
            seed: rand::rng().random(),
            perm_index: 0,
            word_set: registry.default_words.clone(),
            options: registry.config.default_options(),
        },
        &registry.config,
        now,
    );
    session.version_token = sync::version_token(registry.next_revision());
    let session = Arc::new(session);

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.clone());
    let instance = Uuid::new_v4();

    let handle = GameHandle {
        game_id: game_id.clone(),
        instance,
        cmd_tx,
        snapshot_rx,
        timeout: Duration::from_millis(registry.config.command_timeout_ms),
    };

    let task = SessionTask {
        game_id,
        instance,
        session,
        snapshot_tx,
        registry,
    };
    tokio::spawn(task.run(cmd_rx));

    tracing::info!("Game created: {}", handle.game_id);
    handle
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// The task that owns one session. All mutations of that session run here,
/// one at a time, in arrival order.
struct SessionTask {
    game_id: String,
    instance: Uuid,
    session: Arc<GameSession>,
    snapshot_tx: watch::Sender<Arc<GameSession>>,
    registry: Arc<Registry>,
}

impl SessionTask {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Envelope>) {
        let idle = Duration::from_secs(self.registry.config.session_idle_secs);
        let mut last_command = Instant::now();

        loop {
            let expiry = timer::until_expiry(&self.session, self.registry.clock.now());
            tokio::select! {
                envelope = cmd_rx.recv() => {
                    let Some(Envelope { command, reply }) = envelope else { break };
                    last_command = Instant::now();
                    let result = self.handle(command);
                    let _ = reply.send(result);
                }
                _ = sleep_for(expiry) => {
                    let round = self.session.round;
                    if let Err(e) = self.handle(GameCommand::ExpireTurn { round }) {
                        tracing::debug!("Game {} expiry for round {} not applied: {}", self.game_id, round, e);
                    }
                }
                _ = tokio::time::sleep_until(last_command + idle) => {
                    tracing::info!("Game {} idle, evicting", self.game_id);
                    break;
                }
            }
        }

        self.registry.remove_instance(&self.game_id, self.instance);
        tracing::info!("Game {} task ended", self.game_id);
    }

    fn current(&self) -> Dispatched {
        Dispatched::Session(self.session.clone())
    }

    fn handle(&mut self, command: GameCommand) -> Result<Dispatched, GameError> {
        let now = self.registry.clock.now();
        let config = &self.registry.config;
        let mut next = self.session.as_ref().clone();

        let applied = match command {
            GameCommand::AddPlayer { player_name } => {
                let tie_break = if rand::rng().random_bool(0.5) {
                    Team::Red
                } else {
                    Team::Blue
                };
                engine::add_player(&mut next, &player_name, tie_break)?
            }
            GameCommand::ChangePlayer {
                old_player_name,
                team,
                player_name,
            } => engine::change_player(&mut next, &old_player_name, team, player_name.as_deref())?,
            GameCommand::DeletePlayer { player_name } => {
                engine::delete_player(&mut next, &player_name)?
            }
            GameCommand::AddWord { word } => engine::add_word(&mut next, &word)?,
            GameCommand::DeleteWord { word } => engine::delete_word(&mut next, &word)?,
            GameCommand::StartGame => engine::start_game(&mut next, config)?,
            GameCommand::StartNextStage => {
                engine::advance_stage(&mut next, self.registry.policy.as_ref(), now)?
            }
            GameCommand::NextWord { correct } => engine::next_word(&mut next, correct),
            GameCommand::EndTurn { expected_round } => engine::end_turn(&mut next, expected_round, now)?,
            GameCommand::ExpireTurn { round } => {
                if round != next.round || !timer::is_expired(&next, now) {
                    tracing::debug!("Game {} ignoring expiry for round {}", self.game_id, round);
                    return Ok(self.current());
                }
                tracing::debug!("Game {} timer expired in round {}", self.game_id, round);
                engine::end_turn(&mut next, round, now)?
            }
            GameCommand::NextGame {
                word_set,
                timer_duration_ms,
                enforce_timer,
                random_words,
                confirm,
            } => {
                let discards_play = !next.is_finished()
                    && (next.stage != Stage::Setup
                        || !next.team_players.is_empty()
                        || !next.words.is_empty());
                if discards_play {
                    match confirm {
                        None => {
                            return Ok(Dispatched::ConfirmationRequired {
                                state_id: next.version_token.clone(),
                            });
                        }
                        Some(token) if token != next.version_token => {
                            return Err(GameError::stale_state(&token, &next.version_token));
                        }
                        Some(_) => {}
                    }
                }

                let word_set = word_set.unwrap_or_else(|| next.word_set.clone());
                let options = GameOptions {
                    timer_duration_ms: timer_duration_ms.unwrap_or(next.options.timer_duration_ms),
                    enforce_timer: enforce_timer.unwrap_or(next.options.enforce_timer),
                    random_words: random_words.unwrap_or(next.options.random_words),
                };
                let (seed, perm_index) =
                    engine::next_deck(&next, &word_set, config.words_per_game, rand::rng().random());
                next = engine::new_session(
                    &self.game_id,
                    NewGame {
                        seed,
                        perm_index,
                        word_set,
                        options,
                    },
                    config,
                    now,
                );
                tracing::info!("Game {} reset for a new game", self.game_id);
                Applied::Changed
            }
        };

        if applied == Applied::Changed {
            self.publish(next);
        }
        Ok(self.current())
    }

    fn publish(&mut self, mut next: GameSession) {
        let previous = &self.session;
        if next.stage != previous.stage {
            tracing::info!("Game {} entered stage {}", self.game_id, next.stage);
        }
        if let (None, Some(team)) = (previous.winning_team, next.winning_team) {
            tracing::info!("Game {} won by {}", self.game_id, team);
        }

        next.version_token = sync::version_token(self.registry.next_revision());
        next.updated_at = self.registry.clock.now();
        self.session = Arc::new(next);
        self.snapshot_tx.send_replace(self.session.clone());
    }
}
