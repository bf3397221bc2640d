use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A team. Players are always `Red` or `Blue`; `Neutral` only appears as the
/// winner of a drawn game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
    Neutral,
}

impl Team {
    pub fn other(self) -> Team {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
            Self::Neutral => Self::Neutral,
        }
    }

    pub fn is_playable(self) -> bool {
        matches!(self, Self::Red | Self::Blue)
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Gameplay mode of an active stage. Display metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Explain,
    Gestures,
    OneWord,
}

/// Phases of a game, serialized as their ordinal.
///
/// Odd ordinals are interstitials (timer frozen, no turn-taking), even non-zero
/// ordinals are active stages. `EndOneWord` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Setup,
    EndSetup,
    Explain,
    EndExplain,
    Gestures,
    EndGestures,
    OneWord,
    EndOneWord,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Self::Setup,
        Self::EndSetup,
        Self::Explain,
        Self::EndExplain,
        Self::Gestures,
        Self::EndGestures,
        Self::OneWord,
        Self::EndOneWord,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Explain | Self::Gestures | Self::OneWord)
    }

    pub fn is_interstitial(self) -> bool {
        matches!(
            self,
            Self::EndSetup | Self::EndExplain | Self::EndGestures | Self::EndOneWord
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::EndOneWord
    }

    /// The stage after this one, or `None` at the terminal interstitial.
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// Mode played in this stage, or the mode coming up next for an interstitial.
    pub fn mode(self) -> Option<Mode> {
        match self {
            Self::EndSetup | Self::Explain => Some(Mode::Explain),
            Self::EndExplain | Self::Gestures => Some(Mode::Gestures),
            Self::EndGestures | Self::OneWord => Some(Mode::OneWord),
            Self::Setup | Self::EndOneWord => None,
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage.ordinal()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown stage {value}"))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::EndSetup => write!(f, "endsetup"),
            Self::Explain => write!(f, "explain"),
            Self::EndExplain => write!(f, "endexplain"),
            Self::Gestures => write!(f, "gestures"),
            Self::EndGestures => write!(f, "endgestures"),
            Self::OneWord => write!(f, "oneword"),
            Self::EndOneWord => write!(f, "endoneword"),
        }
    }
}

/// A player in a game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub player_name: String,
    pub team: Team,
}

/// Accumulated score per team. Both teams are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPoints {
    pub red: u32,
    pub blue: u32,
}

impl TeamPoints {
    pub fn get(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red,
            Team::Blue => self.blue,
            Team::Neutral => 0,
        }
    }

    pub fn award(&mut self, team: Team) {
        match team {
            Team::Red => self.red += 1,
            Team::Blue => self.blue += 1,
            Team::Neutral => {}
        }
    }
}

/// Per-game options chosen at next-game time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOptions {
    pub timer_duration_ms: u64,
    pub enforce_timer: bool,
    #[serde(default)]
    pub random_words: bool,
}

/// Server configuration loaded from game.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub min_words_to_start: usize,
    pub min_players_per_team: usize,
    pub words_per_game: usize,
    pub default_timer_duration_ms: u64,
    pub enforce_timer_by_default: bool,
    pub command_timeout_ms: u64,
    pub session_idle_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_words_to_start: 5,
            min_players_per_team: 1,
            words_per_game: 25,
            default_timer_duration_ms: 60_000,
            enforce_timer_by_default: true,
            command_timeout_ms: 2_000,
            session_idle_secs: 6 * 60 * 60,
        }
    }
}

impl GameConfig {
    pub fn default_options(&self) -> GameOptions {
        GameOptions {
            timer_duration_ms: self.default_timer_duration_ms,
            enforce_timer: self.enforce_timer_by_default,
            random_words: false,
        }
    }
}

/// Full client-visible state of one game. Field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    #[serde(rename = "state_id")]
    pub version_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub stage: Stage,
    pub round: u32,
    pub starting_team: Team,
    pub team_players: Vec<Player>,
    pub routing_order: Vec<Player>,
    pub current_player_index: usize,
    pub words: Vec<String>,
    pub revealed: Vec<bool>,
    pub current_word: Option<String>,
    pub team_points: TeamPoints,
    #[serde(with = "time::serde::rfc3339")]
    pub round_started_at: OffsetDateTime,
    #[serde(flatten)]
    pub options: GameOptions,
    pub winning_team: Option<Team>,
    pub seed: u64,
    pub perm_index: usize,
    pub word_set: Vec<String>,
}

impl GameSession {
    pub fn current_player(&self) -> Option<&Player> {
        self.routing_order.get(self.current_player_index)
    }

    pub fn is_finished(&self) -> bool {
        self.winning_team.is_some()
    }

    pub fn players_on(&self, team: Team) -> usize {
        self.team_players.iter().filter(|p| p.team == team).count()
    }
}

// ─── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FetchStateRequest {
    pub game_id: String,
    #[serde(default)]
    pub state_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameIdRequest {
    pub game_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerRequest {
    pub game_id: String,
    pub player_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePlayerRequest {
    pub game_id: String,
    pub old_player_name: String,
    pub team: Team,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordRequest {
    pub game_id: String,
    pub word: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextWordRequest {
    pub game_id: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndTurnRequest {
    pub game_id: String,
    pub current_round: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextGameRequest {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub word_set: Option<Vec<String>>,
    #[serde(default)]
    pub timer_duration_ms: Option<u64>,
    #[serde(default)]
    pub enforce_timer: Option<bool>,
    #[serde(default)]
    pub random_words: Option<bool>,
    #[serde(default)]
    pub confirm: Option<String>,
}

// ─── Responses ────────────────────────────────────────────────────

/// Result of a next-game call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextGameOutcome {
    /// The current game is unfinished; repeat the call with `confirm = state_id`.
    ConfirmationRequired { game_id: String, state_id: String },
    /// A fresh Setup session replaced the previous one.
    Reset { game: GameSession },
}
