use super::*;
use crate::constants::{
    get_antagonist_roster, ANTAGONIST_AI_SPAWNS, ANTAGONIST_PLAYER_SPAWN, AURA_BROADCAST_MS,
    CATCH_GRACE_MS, COMPETITIVE_LAMPS, GRAND_LAMP_POSITION, ITEM_SPAWN, ROOM_COLS, ROOM_ROWS,
    SALT_POSITIONS, SURVIVAL_MINI_LAMPS,
};
use crate::antagonist::AgentState;
use crate::rng::shuffle;
use crate::types::LampKind;
use crate::world::room_center;

/// The room holding the ritual circle never receives a mini lamp.
const RITUAL_ROOM: (i32, i32) = (2, 2);

impl RoomSession {
    pub(super) fn init_layout(&mut self) {
        self.lamps.clear();
        self.salts.clear();
        self.item = None;

        if self.ruleset.grand_lamp {
            let mut cells: Vec<(i32, i32)> = (0..ROOM_ROWS)
                .flat_map(|row| (0..ROOM_COLS).map(move |col| (col, row)))
                .filter(|cell| *cell != RITUAL_ROOM)
                .collect();
            shuffle(&mut cells, self.rng.as_mut());
            for (id, (col, row)) in cells.into_iter().take(SURVIVAL_MINI_LAMPS).enumerate() {
                let (x, y) = room_center(col, row);
                self.lamps.push(unlit_lamp(id, (x, y), LampKind::Mini));
            }
            self.lamps.push(unlit_lamp(
                SURVIVAL_MINI_LAMPS,
                GRAND_LAMP_POSITION,
                LampKind::Grand,
            ));
        } else {
            for (id, &pos) in COMPETITIVE_LAMPS.iter().enumerate() {
                self.lamps.push(unlit_lamp(id, pos, LampKind::Mini));
            }
        }

        if self.ruleset.ritual_item {
            self.item = Some(ItemView {
                x: ITEM_SPAWN.0,
                y: ITEM_SPAWN.1,
                carrier: None,
            });
        }
        if self.ruleset.salt {
            self.salts = SALT_POSITIONS
                .iter()
                .enumerate()
                .map(|(id, &(x, y))| SaltView {
                    id,
                    x,
                    y,
                    picked: false,
                })
                .collect();
        }
        self.circle.active = self.ruleset.circle_starts_active();
    }

    /// Assigns roles and tells each player theirs.
    pub(super) fn enter_instructions(&mut self) {
        self.phase = Phase::Instructions;
        let antagonist = self
            .ruleset
            .player_antagonist
            .then(|| self.rng.pick_index(self.players.len()));
        for (idx, player) in self.players.iter_mut().enumerate() {
            player.view.ready = false;
            player.view.role = Some(if antagonist == Some(idx) {
                Role::Antagonist
            } else {
                Role::Cooperator
            });
        }
        info!(room_id = %self.id, mode = ?self.settings.mode, "roles assigned");

        let mode = self.settings.mode;
        let notices: Vec<(String, Role, String)> = self
            .players
            .iter()
            .filter_map(|p| Some((p.view.id.clone(), p.view.role?, p.view.name.clone())))
            .collect();
        for (player_id, role, name) in notices {
            self.send_to(&player_id, ServerEvent::ShowInstructions { role, name, mode });
        }
    }

    pub(super) fn start_game(&mut self) {
        self.phase = Phase::Playing;
        self.epoch_offset_ms = (self.wall_clock)().saturating_sub(self.now_ms);
        self.time_remaining = self.settings.duration_ms;
        self.timers.clear();
        self.cooldowns = AbilityCooldowns::default();
        for door in &mut self.doors {
            door.state = DoorState::Open;
        }
        self.circle = RitualCircle::new();
        self.circle.active = self.ruleset.circle_starts_active();

        let grace_until = self.now_ms + CATCH_GRACE_MS;
        let mut cooperator_slot = 0;
        for player in &mut self.players {
            let spawn = if player.is_cooperator() {
                let spawn = COOPERATOR_SPAWNS[cooperator_slot % COOPERATOR_SPAWNS.len()];
                cooperator_slot += 1;
                spawn
            } else {
                ANTAGONIST_PLAYER_SPAWN
            };
            player.spawn = spawn;
            player.view.x = spawn.0;
            player.view.y = spawn.1;
            player.view.alive = true;
            player.view.talismans = DEFAULT_TALISMANS;
            player.view.aura = AURA_MAX;
            player.view.salt_charges = 0;
            player.view.invulnerable_until = grace_until;
            player.view.is_carrying_item = false;
        }

        self.spawn_agents();
        self.timers
            .schedule_repeating(TaskKind::Countdown, self.now_ms, COUNTDOWN_STEP_MS);
        if self.ruleset.aura {
            self.timers
                .schedule_repeating(TaskKind::AuraBroadcast, self.now_ms, AURA_BROADCAST_MS);
        }
        info!(
            room_id = %self.id,
            mode = ?self.settings.mode,
            difficulty = ?self.settings.difficulty,
            duration_ms = self.settings.duration_ms,
            agents = self.agents.len(),
            "game started"
        );

        let viewers: Vec<(String, Role)> = self
            .players
            .iter()
            .filter_map(|p| Some((p.view.id.clone(), p.view.role?)))
            .collect();
        for (your_id, your_role) in viewers {
            let state = Box::new(self.snapshot_for(&your_id, your_role));
            self.send_to(
                &your_id,
                ServerEvent::GameStart {
                    state,
                    your_role,
                    your_id: your_id.clone(),
                },
            );
        }
    }

    fn spawn_agents(&mut self) {
        self.agents.clear();
        if !self.ruleset.ai_antagonists {
            return;
        }
        let (_, speed_multiplier, _) = get_difficulty_profile(self.settings.difficulty);
        for (n, kind) in get_antagonist_roster(self.settings.difficulty)
            .into_iter()
            .enumerate()
        {
            let (x, y) = ANTAGONIST_AI_SPAWNS[n % ANTAGONIST_AI_SPAWNS.len()];
            let waypoint = self
                .nav
                .random_open_point(BODY_RADIUS, &self.doors, self.rng.as_mut());
            self.agents.push(Antagonist {
                id: format!("chaathan_{n}"),
                kind,
                x,
                y,
                state: AgentState::Patrol { waypoint },
                speed_multiplier,
            });
        }
    }

    /// Snapshot as seen by one player; cooperators only learn their own role
    /// when roles are hidden.
    fn snapshot_for(&self, viewer_id: &str, viewer_role: Role) -> RoomSnapshot {
        let mut snapshot = self.snapshot();
        if self.ruleset.hidden_roles && viewer_role == Role::Cooperator {
            for player in &mut snapshot.players {
                if player.id != viewer_id {
                    player.role = None;
                }
            }
        }
        snapshot
    }
}

fn unlit_lamp(id: usize, (x, y): (f32, f32), kind: LampKind) -> LampView {
    LampView {
        id,
        x,
        y,
        kind,
        state: LampState::Unlit,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{make_playing, make_session};
    use super::*;
    use crate::world::room_cell;

    #[test]
    fn survival_layout_skips_the_ritual_room() {
        for seed in 0..20 {
            let session = make_session(GameMode::Survival, Difficulty::Medium, seed);
            let minis: Vec<&LampView> = session
                .lamps
                .iter()
                .filter(|lamp| lamp.kind == LampKind::Mini)
                .collect();
            assert_eq!(minis.len(), SURVIVAL_MINI_LAMPS);
            let mut cells: Vec<(i32, i32)> =
                minis.iter().map(|lamp| room_cell(lamp.x, lamp.y)).collect();
            assert!(!cells.contains(&RITUAL_ROOM));
            cells.sort_unstable();
            cells.dedup();
            assert_eq!(cells.len(), SURVIVAL_MINI_LAMPS);
            assert_eq!(session.salts.len(), SALT_POSITIONS.len());
            assert!(session.item.is_none());
            assert!(!session.circle.active);
        }
    }

    #[test]
    fn competitive_layout_is_fixed() {
        let session = make_session(GameMode::Competitive, Difficulty::Medium, 3);
        assert_eq!(session.lamps.len(), COMPETITIVE_LAMPS.len());
        assert!(session.lamps.iter().all(|lamp| lamp.kind == LampKind::Mini));
        assert!(session.item.is_some());
        assert!(session.salts.is_empty());
        assert!(session.circle.active);
    }

    #[test]
    fn competitive_start_draws_exactly_one_antagonist_and_no_agents() {
        let session = make_playing(GameMode::Competitive, Difficulty::Hard, 12);
        let antagonists = session
            .players
            .iter()
            .filter(|p| p.view.role == Some(Role::Antagonist))
            .count();
        assert_eq!(antagonists, 1);
        assert!(session.agents.is_empty());
        let antagonist = session
            .players
            .iter()
            .find(|p| p.view.role == Some(Role::Antagonist))
            .expect("antagonist");
        assert_eq!(antagonist.position(), ANTAGONIST_PLAYER_SPAWN);
    }

    #[test]
    fn survival_start_spawns_the_difficulty_roster() {
        for (difficulty, expected) in [
            (Difficulty::Easy, 1),
            (Difficulty::Medium, 2),
            (Difficulty::Hard, 3),
        ] {
            let session = make_playing(GameMode::Survival, difficulty, 5);
            assert_eq!(session.agents.len(), expected);
            assert!(session.players.iter().all(|p| p.is_cooperator()));
            assert!(session
                .players
                .iter()
                .all(|p| p.view.invulnerable_until == CATCH_GRACE_MS));
        }
    }

    #[test]
    fn hidden_roles_only_reveal_the_viewer() {
        let mut session = make_session(GameMode::Competitive, Difficulty::Medium, 9);
        for idx in 0..MAX_PLAYERS {
            session.add_player(&format!("p{idx}"), None).expect("join");
        }
        for idx in 0..MAX_PLAYERS {
            session.mark_ready(&format!("p{idx}"));
        }
        for out in session.drain_outbox() {
            let ServerEvent::GameStart {
                state,
                your_role,
                your_id,
            } = out.event
            else {
                continue;
            };
            let known = state.players.iter().filter(|p| p.role.is_some()).count();
            match your_role {
                Role::Cooperator => {
                    assert_eq!(known, 1);
                    let me = state
                        .players
                        .iter()
                        .find(|p| p.id == your_id)
                        .expect("viewer in snapshot");
                    assert_eq!(me.role, Some(Role::Cooperator));
                }
                Role::Antagonist => assert_eq!(known, MAX_PLAYERS),
            }
        }
    }
}
