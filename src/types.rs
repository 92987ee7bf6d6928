use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Instructions,
    Playing,
    PoojariWin,
    ChaathanWin,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PoojariWin | Self::ChaathanWin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Instructions => "instructions",
            Self::Playing => "playing",
            Self::PoojariWin => "poojari_win",
            Self::ChaathanWin => "chaathan_win",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Competitive,
    Survival,
}

impl GameMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "competitive" => Some(Self::Competitive),
            "survival" => Some(Self::Survival),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "poojari")]
    Cooperator,
    #[serde(rename = "chaathan")]
    Antagonist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AntagonistKind {
    Chaathan,
    Yakshi,
    Odiyan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LampKind {
    Mini,
    Grand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LampState {
    Unlit,
    Lit,
    Flickering,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    Open,
    Sealed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Flicker,
    Extinguish,
    Seal,
    Push,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TalismanLossReason {
    Aura,
    Caught,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Timeout,
    RitualComplete,
    AllDead,
    ChaathanLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Patrol,
    Hunt,
    Stunned,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub role: Option<Role>,
    pub x: f32,
    pub y: f32,
    pub alive: bool,
    pub talismans: u32,
    pub aura: f32,
    pub salt_charges: u32,
    pub invulnerable_until: u64,
    pub ready: bool,
    pub is_carrying_item: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LampView {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub kind: LampKind,
    pub state: LampState,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorView {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub orientation: Orientation,
    pub state: DoorState,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AntagonistView {
    pub id: String,
    pub kind: AntagonistKind,
    pub x: f32,
    pub y: f32,
    pub state: AgentMode,
    pub target_id: Option<String>,
    pub stunned_until: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemView {
    pub x: f32,
    pub y: f32,
    pub carrier: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SaltView {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub picked: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RitualCircleView {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub progress: u64,
    pub total: u64,
    pub active: bool,
    pub qualifying_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub phase: Phase,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub duration_ms: u64,
    pub time_remaining: u64,
    pub players: Vec<PlayerView>,
    pub lamps: Vec<LampView>,
    pub doors: Vec<DoorView>,
    pub chaathans: Vec<AntagonistView>,
    pub ritual_item: Option<ItemView>,
    pub salts: Vec<SaltView>,
    pub ritual_circle: RitualCircleView,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub phase: Phase,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub player_count: usize,
    pub max_players: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    JoinedRoom {
        room_id: String,
        player: PlayerView,
        state: Box<RoomSnapshot>,
    },
    PlayerJoined {
        player: PlayerView,
        player_count: usize,
    },
    PlayerLeft {
        player_id: String,
    },
    ShowInstructions {
        role: Role,
        name: String,
        mode: GameMode,
    },
    PlayerReadyUpdate {
        player_id: String,
        ready_count: usize,
        total: usize,
    },
    GameStart {
        state: Box<RoomSnapshot>,
        your_role: Role,
        your_id: String,
    },
    PlayerMoved {
        player_id: String,
        x: f32,
        y: f32,
        is_carrying_item: bool,
    },
    LampUpdate {
        lamp: LampView,
    },
    DoorUpdate {
        door: DoorView,
    },
    GrandLampActivated {
        lamp: LampView,
    },
    ItemPickup {
        player_id: String,
        item: ItemView,
    },
    ItemDrop {
        player_id: String,
        item: ItemView,
    },
    PlayerPushed {
        player_id: String,
        x: f32,
        y: f32,
    },
    TimerUpdate {
        time_remaining: u64,
    },
    RitualProgress {
        progress: u64,
        total: u64,
    },
    RitualDisrupted,
    CooldownUpdate {
        ability: Ability,
        cooldown_end: u64,
    },
    ChaathanUpdate {
        chaathans: Vec<AntagonistView>,
    },
    ChaathanStunned {
        chaathan_id: String,
        by: String,
        until: u64,
    },
    SaltUpdate {
        salt: Option<SaltView>,
        player_id: String,
        salt_charges: u32,
    },
    AuraUpdate {
        player_id: String,
        aura: f32,
    },
    TalismanUpdate {
        player_id: String,
        talismans: u32,
        reason: TalismanLossReason,
    },
    PlayerDied {
        player_id: String,
    },
    PlayerRespawn {
        player_id: String,
        x: f32,
        y: f32,
        aura: f32,
        talismans: u32,
    },
    GameOver {
        winner: Phase,
        reason: GameOverReason,
    },
    RoomList {
        rooms: Vec<RoomSummary>,
    },
    Pong {
        t: f64,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Per-tick snapshots the transport may drop when a client lags.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::ChaathanUpdate { .. })
    }
}

/// An event with its recipients resolved at emit time.
#[derive(Clone, Debug)]
pub struct Outbound {
    pub to: Vec<String>,
    pub event: ServerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kebab_type_and_camel_fields() {
        let value = serde_json::to_value(ServerEvent::TimerUpdate {
            time_remaining: 4_000,
        })
        .expect("event should serialize");
        assert_eq!(value["type"], "timer-update");
        assert_eq!(value["timeRemaining"], 4_000);

        let value = serde_json::to_value(ServerEvent::RitualDisrupted)
            .expect("event should serialize");
        assert_eq!(value["type"], "ritual-disrupted");
    }

    #[test]
    fn roles_and_phases_use_wire_names() {
        assert_eq!(
            serde_json::to_value(Role::Cooperator).expect("role"),
            "poojari"
        );
        assert_eq!(
            serde_json::to_value(Role::Antagonist).expect("role"),
            "chaathan"
        );
        assert_eq!(
            serde_json::to_value(Phase::ChaathanWin).expect("phase"),
            "chaathan_win"
        );
    }
}
