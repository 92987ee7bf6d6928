use std::f32::consts::TAU;

use super::*;
use crate::constants::{
    EXTINGUISH_COOLDOWN_MS, FLICKER_COOLDOWN_MS, FLICKER_DURATION_MS, INTERACTION_DISTANCE,
    ITEM_PICKUP_DISTANCE, PUSH_COOLDOWN_MS, PUSH_DISTANCE, REFUEL_RADIUS, SALT_PICKUP_DISTANCE,
    SALT_USE_RANGE, SEAL_COOLDOWN_MS, SEAL_DURATION_MS,
};
use crate::types::LampKind;
use crate::world::clamp_to_play_bounds;

/// Outcome of a salt charge: the stunned agent, if one was in range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaltUse {
    pub charges_left: u32,
    pub stunned: Option<String>,
}

impl RoomSession {
    fn living_cooperator(&self, player_id: &str) -> Option<usize> {
        if self.phase != Phase::Playing {
            return None;
        }
        let idx = self.player_index(player_id)?;
        let player = &self.players[idx];
        (player.is_cooperator() && player.view.alive).then_some(idx)
    }

    fn antagonist_player(&self, player_id: &str) -> Option<usize> {
        if self.phase != Phase::Playing || !self.ruleset.abilities {
            return None;
        }
        let idx = self.player_index(player_id)?;
        (self.players[idx].view.role == Some(Role::Antagonist)).then_some(idx)
    }

    pub fn light_lamp(&mut self, player_id: &str, lamp_id: usize) -> Option<()> {
        let idx = self.living_cooperator(player_id)?;
        let pos = self.players[idx].position();
        let lamp = self.lamps.iter_mut().find(|lamp| lamp.id == lamp_id)?;
        if lamp.kind != LampKind::Mini
            || lamp.state != LampState::Unlit
            || distance(pos, (lamp.x, lamp.y)) > INTERACTION_DISTANCE
        {
            return None;
        }
        lamp.state = LampState::Lit;
        let lamp = lamp.clone();
        self.broadcast(ServerEvent::LampUpdate { lamp });

        if self.ruleset.grand_lamp {
            let minis_lit = self
                .lamps
                .iter()
                .filter(|lamp| lamp.kind == LampKind::Mini)
                .all(|lamp| lamp.state == LampState::Lit);
            let grand = self
                .lamps
                .iter_mut()
                .find(|lamp| lamp.kind == LampKind::Grand && lamp.state == LampState::Unlit);
            if let (true, Some(grand)) = (minis_lit, grand) {
                grand.state = LampState::Lit;
                let grand = grand.clone();
                self.circle.active = true;
                info!(room_id = %self.id, "grand lamp lit, circle active");
                self.broadcast(ServerEvent::LampUpdate {
                    lamp: grand.clone(),
                });
                self.broadcast(ServerEvent::GrandLampActivated { lamp: grand });
            }
        }
        Some(())
    }

    pub fn refuel_aura(&mut self, player_id: &str, lamp_id: usize) -> Option<()> {
        if !self.ruleset.aura {
            return None;
        }
        let idx = self.living_cooperator(player_id)?;
        let pos = self.players[idx].position();
        let lamp = self.lamps.iter().find(|lamp| lamp.id == lamp_id)?;
        if lamp.state != LampState::Lit || distance(pos, (lamp.x, lamp.y)) > REFUEL_RADIUS {
            return None;
        }
        self.players[idx].view.aura = AURA_MAX;
        self.broadcast(ServerEvent::AuraUpdate {
            player_id: player_id.to_string(),
            aura: AURA_MAX,
        });
        Some(())
    }

    pub fn pickup_item(&mut self, player_id: &str) -> Option<()> {
        let idx = self.living_cooperator(player_id)?;
        let pos = self.players[idx].position();
        let item = self.item.as_mut()?;
        if item.carrier.is_some() || distance(pos, (item.x, item.y)) >= ITEM_PICKUP_DISTANCE {
            return None;
        }
        item.carrier = Some(player_id.to_string());
        item.x = pos.0;
        item.y = pos.1;
        let item = item.clone();
        self.players[idx].view.is_carrying_item = true;
        self.broadcast(ServerEvent::ItemPickup {
            player_id: player_id.to_string(),
            item,
        });
        Some(())
    }

    pub fn drop_item(&mut self, player_id: &str) -> Option<()> {
        if self.phase != Phase::Playing {
            return None;
        }
        let idx = self.player_index(player_id)?;
        let carrying = self
            .item
            .as_ref()
            .and_then(|item| item.carrier.as_deref())
            == Some(player_id);
        if !carrying {
            return None;
        }
        self.drop_carried_item(idx);
        self.evaluate_ritual();
        Some(())
    }

    /// Releases the item at the player's feet if they hold it.
    pub(super) fn drop_carried_item(&mut self, idx: usize) {
        let Some(player) = self.players.get_mut(idx) else {
            return;
        };
        let Some(item) = self.item.as_mut() else {
            return;
        };
        if item.carrier.as_deref() != Some(player.view.id.as_str()) {
            return;
        }
        item.carrier = None;
        item.x = player.view.x;
        item.y = player.view.y;
        player.view.is_carrying_item = false;
        let item = item.clone();
        let player_id = player.view.id.clone();
        self.broadcast(ServerEvent::ItemDrop { player_id, item });
    }

    fn start_cooldown(&mut self, player_id: &str, ability: Ability, duration_ms: u64) {
        let until_ms = self.now_ms + duration_ms;
        self.cooldowns.set(ability, until_ms);
        self.send_to(
            player_id,
            ServerEvent::CooldownUpdate {
                ability,
                cooldown_end: self.wall_time(until_ms),
            },
        );
    }

    fn ability_ready(&self, ability: Ability) -> bool {
        self.now_ms >= self.cooldowns.until(ability)
    }

    pub fn flicker_lamp(&mut self, player_id: &str, lamp_id: usize) -> Option<()> {
        self.antagonist_player(player_id)?;
        if !self.ability_ready(Ability::Flicker) {
            return None;
        }
        let lamp = self.lamps.iter_mut().find(|lamp| lamp.id == lamp_id)?;
        if lamp.state != LampState::Lit {
            return None;
        }
        lamp.state = LampState::Flickering;
        let lamp = lamp.clone();
        self.timers.schedule_once(
            TaskKind::LampRevert { lamp_id },
            self.now_ms,
            FLICKER_DURATION_MS,
        );
        self.broadcast(ServerEvent::LampUpdate { lamp });
        self.start_cooldown(player_id, Ability::Flicker, FLICKER_COOLDOWN_MS);
        Some(())
    }

    pub fn extinguish_lamp(&mut self, player_id: &str, lamp_id: usize) -> Option<()> {
        self.antagonist_player(player_id)?;
        if !self.ability_ready(Ability::Extinguish) {
            return None;
        }
        let lamp = self.lamps.iter_mut().find(|lamp| lamp.id == lamp_id)?;
        if !matches!(lamp.state, LampState::Lit | LampState::Flickering) {
            return None;
        }
        lamp.state = LampState::Unlit;
        let lamp = lamp.clone();
        self.broadcast(ServerEvent::LampUpdate { lamp });
        self.start_cooldown(player_id, Ability::Extinguish, EXTINGUISH_COOLDOWN_MS);
        self.reset_ritual_progress();
        self.evaluate_ritual();
        Some(())
    }

    pub fn seal_door(&mut self, player_id: &str, door_id: usize) -> Option<()> {
        self.antagonist_player(player_id)?;
        if !self.ability_ready(Ability::Seal) {
            return None;
        }
        let door = self.doors.iter_mut().find(|door| door.id == door_id)?;
        if door.state != DoorState::Open {
            return None;
        }
        door.state = DoorState::Sealed;
        let door = door.clone();
        self.timers.schedule_once(
            TaskKind::DoorReopen { door_id },
            self.now_ms,
            SEAL_DURATION_MS,
        );
        self.broadcast(ServerEvent::DoorUpdate { door });
        self.start_cooldown(player_id, Ability::Seal, SEAL_COOLDOWN_MS);
        Some(())
    }

    /// Shoves a circle member in a random direction; the item goes with them.
    pub fn push_player(&mut self, player_id: &str, target_id: &str) -> Option<()> {
        self.antagonist_player(player_id)?;
        if !self.ability_ready(Ability::Push) {
            return None;
        }
        let target_idx = self.player_index(target_id)?;
        if !self.players[target_idx].is_cooperator()
            || !self.circle.qualifying.iter().any(|id| id == target_id)
        {
            return None;
        }

        let angle = self.rng.next_f32() * TAU;
        let (x, y) = self.players[target_idx].position();
        let (nx, ny) = clamp_to_play_bounds(
            x + angle.cos() * PUSH_DISTANCE,
            y + angle.sin() * PUSH_DISTANCE,
        );
        let target = &mut self.players[target_idx].view;
        target.x = nx;
        target.y = ny;
        if target.is_carrying_item {
            if let Some(item) = self.item.as_mut() {
                item.x = nx;
                item.y = ny;
            }
        }
        self.broadcast(ServerEvent::PlayerPushed {
            player_id: target_id.to_string(),
            x: nx,
            y: ny,
        });
        self.start_cooldown(player_id, Ability::Push, PUSH_COOLDOWN_MS);
        self.evaluate_ritual();
        Some(())
    }

    /// Picks up the named salt, or the nearest one in reach.
    pub fn pickup_salt(&mut self, player_id: &str, salt_id: Option<usize>) -> Option<()> {
        if !self.ruleset.salt {
            return None;
        }
        let idx = self.living_cooperator(player_id)?;
        let pos = self.players[idx].position();
        let in_reach = |salt: &SaltView| {
            !salt.picked && distance(pos, (salt.x, salt.y)) < SALT_PICKUP_DISTANCE
        };
        let salt = match salt_id {
            Some(id) => self
                .salts
                .iter_mut()
                .find(|salt| salt.id == id)
                .filter(|salt| in_reach(salt))?,
            None => self
                .salts
                .iter_mut()
                .filter(|salt| in_reach(salt))
                .min_by(|a, b| {
                    distance(pos, (a.x, a.y)).total_cmp(&distance(pos, (b.x, b.y)))
                })?,
        };
        salt.picked = true;
        let salt = salt.clone();
        let player = &mut self.players[idx].view;
        player.salt_charges += 1;
        let salt_charges = player.salt_charges;
        self.broadcast(ServerEvent::SaltUpdate {
            salt: Some(salt),
            player_id: player_id.to_string(),
            salt_charges,
        });
        Some(())
    }

    /// Spends a charge; stuns the agent hunting the user first, else the nearest.
    pub fn use_salt(&mut self, player_id: &str) -> Option<SaltUse> {
        if !self.ruleset.salt {
            return None;
        }
        let idx = self.living_cooperator(player_id)?;
        if self.players[idx].view.salt_charges == 0 {
            return None;
        }
        self.players[idx].view.salt_charges -= 1;
        let charges_left = self.players[idx].view.salt_charges;
        let pos = self.players[idx].position();

        let chosen = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| {
                !agent.is_stunned() && distance(pos, agent.position()) <= SALT_USE_RANGE
            })
            .min_by(|(_, a), (_, b)| {
                let a_key = (!a.is_hunting(player_id), distance(pos, a.position()));
                let b_key = (!b.is_hunting(player_id), distance(pos, b.position()));
                a_key.0.cmp(&b_key.0).then(a_key.1.total_cmp(&b_key.1))
            })
            .map(|(agent_idx, _)| agent_idx);

        self.broadcast(ServerEvent::SaltUpdate {
            salt: None,
            player_id: player_id.to_string(),
            salt_charges: charges_left,
        });

        let stunned = chosen.map(|agent_idx| {
            let agent = &mut self.agents[agent_idx];
            let until = agent.stun(self.now_ms);
            (agent.id.clone(), until)
        });
        if let Some((chaathan_id, until)) = stunned.clone() {
            let until = self.wall_time(until);
            self.broadcast(ServerEvent::ChaathanStunned {
                chaathan_id,
                by: player_id.to_string(),
                until,
            });
        }
        Some(SaltUse {
            charges_left,
            stunned: stunned.map(|(id, _)| id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{make_playing, TEST_EPOCH_MS};
    use super::*;
    use crate::antagonist::AgentState;
    use crate::types::AntagonistKind;

    fn antagonist_id(session: &RoomSession) -> String {
        session
            .players
            .iter()
            .find(|p| p.view.role == Some(Role::Antagonist))
            .map(|p| p.view.id.clone())
            .expect("competitive has an antagonist player")
    }

    fn cooperator_id(session: &RoomSession) -> String {
        session
            .players
            .iter()
            .find(|p| p.is_cooperator())
            .map(|p| p.view.id.clone())
            .expect("a cooperator")
    }

    fn advance(session: &mut RoomSession, ms: u64) {
        for _ in 0..(ms / 50) {
            session.step(50);
        }
    }

    fn put(session: &mut RoomSession, player_id: &str, pos: (f32, f32)) {
        let idx = session.player_index(player_id).expect("player");
        session.players[idx].view.x = pos.0;
        session.players[idx].view.y = pos.1;
    }

    #[test]
    fn lamp_needs_proximity_and_a_cooperator() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 40);
        let coop = cooperator_id(&session);
        let chaathan = antagonist_id(&session);
        let (x, y) = (session.lamps[0].x, session.lamps[0].y);

        put(&mut session, &coop, (x + 200.0, y));
        assert!(session.light_lamp(&coop, 0).is_none());
        put(&mut session, &chaathan, (x, y));
        assert!(session.light_lamp(&chaathan, 0).is_none());
        put(&mut session, &coop, (x + 40.0, y));
        assert!(session.light_lamp(&coop, 0).is_some());
        assert!(session.light_lamp(&coop, 0).is_none());
        assert!(session.light_lamp(&coop, 99).is_none());
    }

    #[test]
    fn flicker_reverts_and_respects_its_own_cooldown() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 41);
        let chaathan = antagonist_id(&session);
        let coop = cooperator_id(&session);
        for lamp in &mut session.lamps {
            lamp.state = LampState::Lit;
        }

        assert!(session.flicker_lamp(&coop, 0).is_none());
        session.flicker_lamp(&chaathan, 0).expect("flicker");
        assert_eq!(session.lamps[0].state, LampState::Flickering);
        assert!(session.flicker_lamp(&chaathan, 1).is_none());
        // other abilities keep independent cooldowns
        session.seal_door(&chaathan, 3).expect("seal");

        advance(&mut session, FLICKER_DURATION_MS);
        assert_eq!(session.lamps[0].state, LampState::Lit);
        advance(&mut session, FLICKER_COOLDOWN_MS - FLICKER_DURATION_MS);
        assert!(session.flicker_lamp(&chaathan, 1).is_some());
    }

    #[test]
    fn cooldown_end_is_a_wall_clock_time() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 41);
        let chaathan = antagonist_id(&session);
        for lamp in &mut session.lamps {
            lamp.state = LampState::Lit;
        }
        advance(&mut session, 1_000);
        session.drain_outbox();

        session.flicker_lamp(&chaathan, 0).expect("flicker");
        let ends: Vec<(Ability, u64, Vec<String>)> = session
            .drain_outbox()
            .into_iter()
            .filter_map(|out| match out.event {
                ServerEvent::CooldownUpdate {
                    ability,
                    cooldown_end,
                } => Some((ability, cooldown_end, out.to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ends,
            vec![(
                Ability::Flicker,
                TEST_EPOCH_MS + 1_000 + FLICKER_COOLDOWN_MS,
                vec![chaathan]
            )]
        );
    }

    #[test]
    fn sealed_door_reopens_after_its_delay() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 42);
        let chaathan = antagonist_id(&session);
        session.seal_door(&chaathan, 7).expect("seal");
        assert_eq!(session.doors[7].state, DoorState::Sealed);
        assert!(session.seal_door(&chaathan, 8).is_none());

        advance(&mut session, SEAL_DURATION_MS - 50);
        assert_eq!(session.doors[7].state, DoorState::Sealed);
        advance(&mut session, 50);
        assert_eq!(session.doors[7].state, DoorState::Open);
    }

    #[test]
    fn extinguish_resets_running_ritual() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 43);
        let chaathan = antagonist_id(&session);
        session.circle.progress = 3_000;
        session.lamps[2].state = LampState::Flickering;
        session.extinguish_lamp(&chaathan, 2).expect("extinguish");
        assert_eq!(session.lamps[2].state, LampState::Unlit);
        assert_eq!(session.circle.progress, 0);
        let disrupted = session
            .drain_outbox()
            .into_iter()
            .any(|out| matches!(out.event, ServerEvent::RitualDisrupted));
        assert!(disrupted);
    }

    #[test]
    fn item_has_a_single_carrier_and_drops_in_place() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 44);
        let coops: Vec<String> = session
            .players
            .iter()
            .filter(|p| p.is_cooperator())
            .map(|p| p.view.id.clone())
            .collect();
        let spot = {
            let item = session.item.as_ref().expect("competitive item");
            (item.x, item.y)
        };
        put(&mut session, &coops[0], spot);
        put(&mut session, &coops[1], spot);
        session.pickup_item(&coops[0]).expect("pickup");
        assert!(session.pickup_item(&coops[1]).is_none());
        assert!(session.drop_item(&coops[1]).is_none());

        session.move_player(&coops[0], spot.0 + 30.0, spot.1).expect("move");
        session.drop_item(&coops[0]).expect("drop");
        let item = session.item.as_ref().expect("item");
        assert_eq!(item.carrier, None);
        assert_eq!((item.x, item.y), (spot.0 + 30.0, spot.1));
    }

    #[test]
    fn push_only_hits_circle_members_and_stays_in_bounds() {
        let mut session = make_playing(GameMode::Competitive, Difficulty::Medium, 45);
        let chaathan = antagonist_id(&session);
        let coop = cooperator_id(&session);
        assert!(session.push_player(&chaathan, &coop).is_none());

        put(&mut session, &coop, RITUAL_CENTER);
        session.evaluate_ritual();
        session.push_player(&chaathan, &coop).expect("push");
        let pushed = session.player(&coop).expect("coop");
        let moved = distance((pushed.x, pushed.y), RITUAL_CENTER);
        assert!((moved - PUSH_DISTANCE).abs() < 0.5);
        assert!(!session.circle.qualifying.contains(&coop));
    }

    #[test]
    fn salt_pickup_then_use_stuns_the_hunter_first() {
        let mut session = make_playing(GameMode::Survival, Difficulty::Easy, 46);
        let salt_pos = (session.salts[0].x, session.salts[0].y);
        put(&mut session, "p0", salt_pos);
        assert!(session.use_salt("p0").is_none());
        session.pickup_salt("p0", None).expect("pickup");
        assert!(session.pickup_salt("p0", Some(0)).is_none());

        session.agents = vec![
            Antagonist {
                id: "near".to_string(),
                kind: AntagonistKind::Chaathan,
                x: salt_pos.0 + 40.0,
                y: salt_pos.1,
                state: AgentState::Patrol {
                    waypoint: salt_pos,
                },
                speed_multiplier: 1.0,
            },
            Antagonist {
                id: "hunter".to_string(),
                kind: AntagonistKind::Yakshi,
                x: salt_pos.0 + 120.0,
                y: salt_pos.1,
                state: AgentState::Hunt {
                    target_id: "p0".to_string(),
                },
                speed_multiplier: 1.0,
            },
        ];
        let used = session.use_salt("p0").expect("one charge");
        assert_eq!(used.charges_left, 0);
        assert_eq!(used.stunned.as_deref(), Some("hunter"));
        assert!(session.agents[1].is_stunned());
        assert!(session.use_salt("p0").is_none());
    }

    #[test]
    fn salt_use_out_of_range_still_spends_the_charge() {
        let mut session = make_playing(GameMode::Survival, Difficulty::Easy, 47);
        session.agents.clear();
        session.players[0].view.salt_charges = 1;
        let used = session.use_salt("p0").expect("charge");
        assert_eq!(used.stunned, None);
        assert_eq!(session.players[0].view.salt_charges, 0);
    }

    #[test]
    fn refuel_needs_a_lit_lamp_in_reach() {
        let mut session = make_playing(GameMode::Survival, Difficulty::Easy, 48);
        let (x, y) = (session.lamps[0].x, session.lamps[0].y);
        put(&mut session, "p0", (x + 70.0, y));
        session.players[0].view.aura = 20.0;
        assert!(session.refuel_aura("p0", 0).is_none());
        session.lamps[0].state = LampState::Lit;
        session.refuel_aura("p0", 0).expect("refuel");
        assert_eq!(session.players[0].view.aura, AURA_MAX);
    }
}
