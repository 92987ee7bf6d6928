use chrono::Utc;
use tracing::{debug, info};

use crate::antagonist::Antagonist;
use crate::constants::{
    get_difficulty_profile, AURA_MAX, BODY_RADIUS, COOPERATOR_SPAWNS, COUNTDOWN_STEP_MS,
    DEFAULT_GAME_DURATION_MS, DEFAULT_TALISMANS, MAP_HEIGHT, MAP_WIDTH, MAX_GAME_DURATION_MS,
    MAX_MOVE_STEP, MAX_PLAYERS, MIN_GAME_DURATION_MS, RITUAL_CENTER, RITUAL_DURATION_MS,
    RITUAL_RADIUS,
};
use crate::error::RoomError;
use crate::rng::RandomSource;
use crate::ruleset::Ruleset;
use crate::schedule::{TaskHandle, TaskKind, TaskQueue};
use crate::server_utils::sanitize_name;
use crate::types::{
    Ability, AntagonistView, Difficulty, DoorState, DoorView, GameMode, GameOverReason, ItemView,
    LampState, LampView, Outbound, Phase, PlayerView, RitualCircleView, Role, RoomSnapshot,
    RoomSummary, SaltView, ServerEvent,
};
use crate::world::{build_doors, distance, NavigationIndex};

mod antagonist_system;
mod interaction_system;
mod ritual_system;
mod spawn_system;

pub use self::interaction_system::SaltUse;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoomSettings {
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub duration_ms: u64,
}

impl RoomSettings {
    /// Durations outside one to sixty minutes are clamped.
    pub fn new(mode: GameMode, difficulty: Difficulty, duration_ms: u64) -> Self {
        Self {
            mode,
            difficulty,
            duration_ms: duration_ms.clamp(MIN_GAME_DURATION_MS, MAX_GAME_DURATION_MS),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::new(
            GameMode::Survival,
            Difficulty::Medium,
            DEFAULT_GAME_DURATION_MS,
        )
    }
}

#[derive(Clone, Debug)]
struct PlayerInternal {
    view: PlayerView,
    spawn: (f32, f32),
}

impl PlayerInternal {
    fn is_cooperator(&self) -> bool {
        self.view.role == Some(Role::Cooperator)
    }

    fn position(&self) -> (f32, f32) {
        (self.view.x, self.view.y)
    }
}

#[derive(Clone, Debug)]
struct RitualCircle {
    x: f32,
    y: f32,
    radius: f32,
    active: bool,
    progress: u64,
    qualifying: Vec<String>,
    accrual: Option<TaskHandle>,
}

impl RitualCircle {
    fn new() -> Self {
        Self {
            x: RITUAL_CENTER.0,
            y: RITUAL_CENTER.1,
            radius: RITUAL_RADIUS,
            active: false,
            progress: 0,
            qualifying: Vec::new(),
            accrual: None,
        }
    }

    fn contains(&self, pos: (f32, f32)) -> bool {
        distance(pos, (self.x, self.y)) <= self.radius
    }
}

/// Cooldown-until timestamps on the session clock, one per ability.
#[derive(Clone, Copy, Debug, Default)]
struct AbilityCooldowns {
    flicker: u64,
    extinguish: u64,
    seal: u64,
    push: u64,
}

impl AbilityCooldowns {
    fn until(&self, ability: Ability) -> u64 {
        match ability {
            Ability::Flicker => self.flicker,
            Ability::Extinguish => self.extinguish,
            Ability::Seal => self.seal,
            Ability::Push => self.push,
        }
    }

    fn set(&mut self, ability: Ability, until_ms: u64) {
        match ability {
            Ability::Flicker => self.flicker = until_ms,
            Ability::Extinguish => self.extinguish = until_ms,
            Ability::Seal => self.seal = until_ms,
            Ability::Push => self.push = until_ms,
        }
    }
}

/// One room: roster, interactables, antagonists and the phase machine.
///
/// Every mutation is synchronous and pushes its resulting events to the
/// outbox; the owner drains it after each call and routes the events.
pub struct RoomSession {
    pub id: String,
    created_seq: u64,
    settings: RoomSettings,
    ruleset: Ruleset,
    phase: Phase,
    now_ms: u64,
    time_remaining: u64,
    rng: Box<dyn RandomSource>,
    nav: NavigationIndex,
    players: Vec<PlayerInternal>,
    lamps: Vec<LampView>,
    doors: Vec<DoorView>,
    agents: Vec<Antagonist>,
    item: Option<ItemView>,
    salts: Vec<SaltView>,
    circle: RitualCircle,
    cooldowns: AbilityCooldowns,
    timers: TaskQueue,
    outbox: Vec<Outbound>,
    tick_counter: u64,
    wall_clock: fn() -> u64,
    /// Wall-clock ms at session-clock zero, fixed when play starts.
    epoch_offset_ms: u64,
}

impl RoomSession {
    pub fn new(
        id: String,
        created_seq: u64,
        settings: RoomSettings,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let doors = build_doors();
        let nav = NavigationIndex::new(&doors);
        let mut session = Self {
            id,
            created_seq,
            settings,
            ruleset: Ruleset::for_mode(settings.mode),
            phase: Phase::Waiting,
            now_ms: 0,
            time_remaining: settings.duration_ms,
            rng,
            nav,
            players: Vec::new(),
            lamps: Vec::new(),
            doors,
            agents: Vec::new(),
            item: None,
            salts: Vec::new(),
            circle: RitualCircle::new(),
            cooldowns: AbilityCooldowns::default(),
            timers: TaskQueue::new(),
            outbox: Vec::new(),
            tick_counter: 0,
            wall_clock: system_clock_ms,
            epoch_offset_ms: 0,
        };
        session.init_layout();
        session
    }

    /// Replaces the wall clock deadlines on the wire are anchored to.
    pub fn with_wall_clock(mut self, wall_clock: fn() -> u64) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player_index(player_id).is_some()
    }

    pub fn pending_tasks(&self) -> usize {
        self.timers.len()
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerView> {
        self.player_index(player_id)
            .map(|idx| &self.players[idx].view)
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id.clone(),
            phase: self.phase,
            mode: self.settings.mode,
            difficulty: self.settings.difficulty,
            player_count: self.players.len(),
            max_players: MAX_PLAYERS,
        }
    }

    fn player_index(&self, player_id: &str) -> Option<usize> {
        self.players
            .iter()
            .position(|player| player.view.id == player_id)
    }

    pub fn add_player(
        &mut self,
        player_id: &str,
        name: Option<&str>,
    ) -> Result<PlayerView, RoomError> {
        if self.has_player(player_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull);
        }
        if self.phase != Phase::Waiting {
            return Err(RoomError::GameInProgress);
        }

        let slot = self.players.len();
        let spawn = COOPERATOR_SPAWNS[slot % COOPERATOR_SPAWNS.len()];
        let fallback = format!("Player{}", slot + 1);
        let view = PlayerView {
            id: player_id.to_string(),
            name: sanitize_name(name, &fallback),
            role: None,
            x: spawn.0,
            y: spawn.1,
            alive: true,
            talismans: DEFAULT_TALISMANS,
            aura: AURA_MAX,
            salt_charges: 0,
            invulnerable_until: 0,
            ready: false,
            is_carrying_item: false,
        };
        self.players.push(PlayerInternal {
            view: view.clone(),
            spawn,
        });

        let state = Box::new(self.snapshot());
        self.send_to(
            player_id,
            ServerEvent::JoinedRoom {
                room_id: self.id.clone(),
                player: view.clone(),
                state,
            },
        );
        self.broadcast_except(
            player_id,
            ServerEvent::PlayerJoined {
                player: view.clone(),
                player_count: self.players.len(),
            },
        );
        info!(
            room_id = %self.id,
            player_id,
            players = self.players.len(),
            "player joined room"
        );

        if self.players.len() == MAX_PLAYERS {
            self.enter_instructions();
        }
        Ok(view)
    }

    /// Removes a player and releases whatever they held. The room may end.
    pub fn remove_player(&mut self, player_id: &str) -> Option<PlayerView> {
        let idx = self.player_index(player_id)?;
        let removed = self.players.remove(idx);

        if let Some(item) = self.item.as_mut() {
            if item.carrier.as_deref() == Some(player_id) {
                item.carrier = None;
                item.x = removed.view.x;
                item.y = removed.view.y;
            }
        }
        self.circle.qualifying.retain(|id| id != player_id);
        self.broadcast(ServerEvent::PlayerLeft {
            player_id: player_id.to_string(),
        });
        info!(room_id = %self.id, player_id, phase = self.phase.as_str(), "player left room");

        match self.phase {
            Phase::Instructions => {
                self.phase = Phase::Waiting;
                for player in &mut self.players {
                    player.view.ready = false;
                    player.view.role = None;
                }
                info!(room_id = %self.id, "room back to waiting");
            }
            Phase::Playing => {
                if self.ruleset.player_antagonist && removed.view.role == Some(Role::Antagonist)
                {
                    self.end_game(Phase::PoojariWin, GameOverReason::ChaathanLeft);
                } else {
                    self.check_all_dead();
                }
            }
            _ => {}
        }

        if self.players.is_empty() {
            self.teardown();
        }
        Some(removed.view)
    }

    pub fn mark_ready(&mut self, player_id: &str) -> Option<()> {
        if self.phase != Phase::Instructions {
            return None;
        }
        let idx = self.player_index(player_id)?;
        if self.players[idx].view.ready {
            return None;
        }
        self.players[idx].view.ready = true;

        let ready_count = self.players.iter().filter(|p| p.view.ready).count();
        self.broadcast(ServerEvent::PlayerReadyUpdate {
            player_id: player_id.to_string(),
            ready_count,
            total: self.players.len(),
        });
        if ready_count == MAX_PLAYERS && ready_count == self.players.len() {
            self.start_game();
        }
        Some(())
    }

    /// Applies a client-suggested position after wall and door collision.
    ///
    /// The path is swept, so walls and sealed doors cannot be skipped. Intents
    /// longer than `MAX_MOVE_STEP` are rejected. Whenever the server's
    /// position differs from the one requested, the mover is told too.
    pub fn move_player(&mut self, player_id: &str, x: f32, y: f32) -> Option<(f32, f32)> {
        if self.phase != Phase::Playing || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let idx = self.player_index(player_id)?;
        let player = &self.players[idx];
        if !player.view.alive {
            return None;
        }
        let from = player.position();
        let target = (x.clamp(0.0, MAP_WIDTH), y.clamp(0.0, MAP_HEIGHT));
        let swept = if distance(from, target) > MAX_MOVE_STEP {
            None
        } else {
            self.nav
                .sweep_move(from, target, BODY_RADIUS, &self.doors)
        };
        let Some((nx, ny)) = swept else {
            debug!(room_id = %self.id, player_id, x, y, "move rejected");
            self.correct_position(idx);
            return None;
        };

        let player = &mut self.players[idx].view;
        player.x = nx;
        player.y = ny;
        let carrying = player.is_carrying_item;
        if carrying {
            if let Some(item) = self.item.as_mut() {
                item.x = nx;
                item.y = ny;
            }
        }
        let event = ServerEvent::PlayerMoved {
            player_id: player_id.to_string(),
            x: nx,
            y: ny,
            is_carrying_item: carrying,
        };
        if (nx, ny) == (x, y) {
            self.broadcast_except(player_id, event);
        } else {
            self.broadcast(event);
        }
        Some((nx, ny))
    }

    /// Tells a player where the server has them.
    fn correct_position(&mut self, idx: usize) {
        let player = &self.players[idx].view;
        let player_id = player.id.clone();
        let event = ServerEvent::PlayerMoved {
            player_id: player_id.clone(),
            x: player.x,
            y: player.y,
            is_carrying_item: player.is_carrying_item,
        };
        self.send_to(&player_id, event);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            phase: self.phase,
            mode: self.settings.mode,
            difficulty: self.settings.difficulty,
            duration_ms: self.settings.duration_ms,
            time_remaining: self.time_remaining,
            players: self.players.iter().map(|p| self.wire_player(p)).collect(),
            lamps: self.lamps.clone(),
            doors: self.doors.clone(),
            chaathans: self.wire_agents(),
            ritual_item: self.item.clone(),
            salts: self.salts.clone(),
            ritual_circle: RitualCircleView {
                x: self.circle.x,
                y: self.circle.y,
                radius: self.circle.radius,
                progress: self.circle.progress,
                total: RITUAL_DURATION_MS,
                active: self.circle.active,
                qualifying_ids: self.circle.qualifying.clone(),
            },
        }
    }

    /// Advances the session clock by one tick.
    pub fn step(&mut self, dt_ms: u64) {
        if self.phase != Phase::Playing {
            return;
        }
        self.tick_counter += 1;
        self.now_ms = self.now_ms.saturating_add(dt_ms);

        self.run_due_tasks();
        if !self.is_playing() {
            return;
        }
        if self.ruleset.aura {
            self.decay_aura(dt_ms);
        }
        if self.ruleset.ai_antagonists {
            self.update_antagonists(dt_ms);
        }
        if self.ruleset.catch {
            self.resolve_catches();
        }
        self.check_all_dead();
        if !self.is_playing() {
            return;
        }
        self.evaluate_ritual();
        if !self.agents.is_empty() {
            let chaathans = self.wire_agents();
            self.broadcast(ServerEvent::ChaathanUpdate { chaathans });
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Cancels every scheduled task. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.timers.clear();
        self.circle.accrual = None;
    }

    fn run_due_tasks(&mut self) {
        while self.is_playing() {
            let Some((_, kind)) = self.timers.pop_due(self.now_ms) else {
                break;
            };
            self.fire_task(kind);
        }
    }

    fn fire_task(&mut self, kind: TaskKind) {
        match kind {
            TaskKind::Countdown => {
                self.time_remaining = self.time_remaining.saturating_sub(COUNTDOWN_STEP_MS);
                self.broadcast(ServerEvent::TimerUpdate {
                    time_remaining: self.time_remaining,
                });
                if self.time_remaining == 0 {
                    self.end_game(Phase::ChaathanWin, GameOverReason::Timeout);
                }
            }
            TaskKind::RitualAccrual => self.accrue_ritual(),
            TaskKind::AuraBroadcast => self.broadcast_aura(),
            TaskKind::LampRevert { lamp_id } => {
                let Some(lamp) = self.lamps.iter_mut().find(|lamp| lamp.id == lamp_id) else {
                    return;
                };
                if lamp.state == LampState::Flickering {
                    lamp.state = LampState::Lit;
                    let lamp = lamp.clone();
                    self.broadcast(ServerEvent::LampUpdate { lamp });
                }
            }
            TaskKind::DoorReopen { door_id } => {
                let Some(door) = self.doors.iter_mut().find(|door| door.id == door_id) else {
                    return;
                };
                if door.state == DoorState::Sealed {
                    door.state = DoorState::Open;
                    let door = door.clone();
                    self.broadcast(ServerEvent::DoorUpdate { door });
                }
            }
        }
    }

    /// Single exit from `Playing`; later calls are ignored.
    fn end_game(&mut self, winner: Phase, reason: GameOverReason) {
        if self.phase != Phase::Playing {
            return;
        }
        self.phase = winner;
        self.teardown();
        info!(
            room_id = %self.id,
            winner = winner.as_str(),
            ?reason,
            elapsed_ms = self.now_ms,
            ticks = self.tick_counter,
            "game over"
        );
        self.broadcast(ServerEvent::GameOver { winner, reason });
    }

    /// Session-clock ms as wall-clock epoch ms, for deadlines clients
    /// compare against their own clock.
    fn wall_time(&self, session_ms: u64) -> u64 {
        session_ms.saturating_add(self.epoch_offset_ms)
    }

    fn wire_player(&self, player: &PlayerInternal) -> PlayerView {
        let mut view = player.view.clone();
        if view.invulnerable_until > 0 {
            view.invulnerable_until = self.wall_time(view.invulnerable_until);
        }
        view
    }

    fn wire_agents(&self) -> Vec<AntagonistView> {
        self.agents
            .iter()
            .map(|agent| {
                let mut view = agent.view();
                view.stunned_until = view.stunned_until.map(|until| self.wall_time(until));
                view
            })
            .collect()
    }

    fn aura_decay_multiplier(&self) -> f32 {
        let (_, _, decay) = get_difficulty_profile(self.settings.difficulty);
        decay
    }

    fn broadcast(&mut self, event: ServerEvent) {
        let to = self.players.iter().map(|p| p.view.id.clone()).collect();
        self.outbox.push(Outbound { to, event });
    }

    fn broadcast_except(&mut self, excluded: &str, event: ServerEvent) {
        let to: Vec<String> = self
            .players
            .iter()
            .filter(|p| p.view.id != excluded)
            .map(|p| p.view.id.clone())
            .collect();
        if to.is_empty() {
            return;
        }
        self.outbox.push(Outbound { to, event });
    }

    fn send_to(&mut self, player_id: &str, event: ServerEvent) {
        self.outbox.push(Outbound {
            to: vec![player_id.to_string()],
            event,
        });
    }
}

fn system_clock_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
