use crate::types::{AntagonistKind, Difficulty};

pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const MAX_PLAYERS: usize = 4;
pub const DEFAULT_GAME_DURATION_MS: u64 = 300_000;
pub const MIN_GAME_DURATION_MS: u64 = 60_000;
pub const MAX_GAME_DURATION_MS: u64 = 60 * 60_000;
pub const COUNTDOWN_STEP_MS: u64 = 1_000;

pub const MAP_WIDTH: f32 = 2400.0;
pub const MAP_HEIGHT: f32 = 1800.0;
pub const ROOM_WIDTH: f32 = 800.0;
pub const ROOM_HEIGHT: f32 = 600.0;
pub const ROOM_COLS: i32 = 3;
pub const ROOM_ROWS: i32 = 3;
pub const TILE_SIZE: f32 = 32.0;
pub const DOOR_OPENING_TILES: i32 = 1;
pub const BODY_RADIUS: f32 = 12.0;
/// Longest distance one move intent may cover.
pub const MAX_MOVE_STEP: f32 = 64.0;

pub const INTERACTION_DISTANCE: f32 = 60.0;
pub const REFUEL_RADIUS: f32 = 80.0;
pub const ITEM_PICKUP_DISTANCE: f32 = 50.0;
pub const SALT_PICKUP_DISTANCE: f32 = 50.0;
pub const SALT_USE_RANGE: f32 = 160.0;
pub const STUN_DURATION_MS: u64 = 4_000;

pub const RITUAL_CENTER: (f32, f32) = (2100.0, 1500.0);
pub const RITUAL_RADIUS: f32 = 80.0;
pub const RITUAL_DURATION_MS: u64 = 10_000;
pub const RITUAL_STEP_MS: u64 = 1_000;

pub const AURA_MAX: f32 = 100.0;
pub const AURA_DECAY_PER_SEC: f32 = 1.5;
pub const AURA_BROADCAST_MS: u64 = 500;
pub const DEFAULT_TALISMANS: u32 = 3;
pub const CATCH_RADIUS: f32 = 28.0;
pub const CATCH_GRACE_MS: u64 = 3_000;

pub const FLICKER_COOLDOWN_MS: u64 = 5_000;
pub const EXTINGUISH_COOLDOWN_MS: u64 = 15_000;
pub const SEAL_COOLDOWN_MS: u64 = 20_000;
pub const PUSH_COOLDOWN_MS: u64 = 10_000;
pub const FLICKER_DURATION_MS: u64 = 2_000;
pub const SEAL_DURATION_MS: u64 = 8_000;
pub const PUSH_DISTANCE: f32 = 100.0;

pub const TARGET_AURA_WEIGHT: f32 = 1.5;
pub const WAYPOINT_EPSILON: f32 = 10.0;
pub const DOOR_ARRIVE_DISTANCE: f32 = 24.0;
pub const DOOR_PASS_OFFSET: f32 = 48.0;
pub const PLAY_MARGIN: f32 = 64.0;

pub const ITEM_SPAWN: (f32, f32) = (1200.0, 660.0);
pub const GRAND_LAMP_POSITION: (f32, f32) = (2100.0, 1380.0);
pub const SURVIVAL_MINI_LAMPS: usize = 4;

/// Fixed competitive lamp layout.
pub const COMPETITIVE_LAMPS: [(f32, f32); 3] = [(400.0, 300.0), (1200.0, 900.0), (2000.0, 300.0)];

/// x boundaries (800, 1600) carry vertical doors, y boundaries (600, 1200) horizontal ones.
pub const DOOR_POSITIONS: [(f32, f32); 12] = [
    (800.0, 300.0),
    (800.0, 900.0),
    (800.0, 1500.0),
    (1600.0, 300.0),
    (1600.0, 900.0),
    (1600.0, 1500.0),
    (400.0, 600.0),
    (1200.0, 600.0),
    (2000.0, 600.0),
    (400.0, 1200.0),
    (1200.0, 1200.0),
    (2000.0, 1200.0),
];

pub const COOPERATOR_SPAWNS: [(f32, f32); 4] = [
    (200.0, 200.0),
    (200.0, 900.0),
    (200.0, 1600.0),
    (600.0, 200.0),
];
pub const ANTAGONIST_PLAYER_SPAWN: (f32, f32) = (2200.0, 1600.0);
pub const ANTAGONIST_AI_SPAWNS: [(f32, f32); 3] = [
    (2200.0, 300.0),
    (1200.0, 900.0),
    (2200.0, 900.0),
];
pub const SALT_POSITIONS: [(f32, f32); 4] = [
    (400.0, 900.0),
    (1200.0, 300.0),
    (2000.0, 900.0),
    (1200.0, 1500.0),
];

/// (patrol speed, hunt speed, detect radius, lose radius) in px and px/s.
pub fn get_antagonist_profile(kind: AntagonistKind) -> (f32, f32, f32, f32) {
    match kind {
        AntagonistKind::Chaathan => (90.0, 150.0, 260.0, 380.0),
        AntagonistKind::Yakshi => (70.0, 170.0, 320.0, 460.0),
        AntagonistKind::Odiyan => (110.0, 130.0, 220.0, 320.0),
    }
}

/// (antagonist count, speed multiplier, aura decay multiplier).
pub fn get_difficulty_profile(difficulty: Difficulty) -> (usize, f32, f32) {
    match difficulty {
        Difficulty::Easy => (1, 0.85, 0.8),
        Difficulty::Medium => (2, 1.0, 1.0),
        Difficulty::Hard => (3, 1.2, 1.25),
    }
}

pub fn get_antagonist_roster(difficulty: Difficulty) -> Vec<AntagonistKind> {
    let (count, _, _) = get_difficulty_profile(difficulty);
    [
        AntagonistKind::Chaathan,
        AntagonistKind::Yakshi,
        AntagonistKind::Odiyan,
    ]
    .into_iter()
    .take(count)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lose_radius_is_strictly_larger_than_detect_radius() {
        for kind in [
            AntagonistKind::Chaathan,
            AntagonistKind::Yakshi,
            AntagonistKind::Odiyan,
        ] {
            let (patrol, hunt, detect, lose) = get_antagonist_profile(kind);
            assert!(lose > detect);
            assert!(patrol > 0.0 && hunt > 0.0);
        }
    }

    #[test]
    fn roster_size_follows_difficulty() {
        assert_eq!(get_antagonist_roster(Difficulty::Easy).len(), 1);
        assert_eq!(get_antagonist_roster(Difficulty::Medium).len(), 2);
        assert_eq!(get_antagonist_roster(Difficulty::Hard).len(), 3);
    }
}
