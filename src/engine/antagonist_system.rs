use tracing::info;

use super::*;
use crate::antagonist::{advance, AgentTarget, AgentWorld};
use crate::constants::{AURA_DECAY_PER_SEC, CATCH_GRACE_MS, CATCH_RADIUS};
use crate::types::TalismanLossReason;

impl RoomSession {
    pub(super) fn living_targets(&self) -> Vec<AgentTarget> {
        self.players
            .iter()
            .filter(|player| player.is_cooperator() && player.view.alive)
            .map(|player| AgentTarget {
                id: player.view.id.clone(),
                x: player.view.x,
                y: player.view.y,
                aura: player.view.aura,
            })
            .collect()
    }

    pub(super) fn update_antagonists(&mut self, dt_ms: u64) {
        let targets = self.living_targets();
        let world = AgentWorld {
            nav: &self.nav,
            doors: &self.doors,
            targets: &targets,
            now_ms: self.now_ms,
            dt_ms,
        };
        for agent in &mut self.agents {
            let step = advance(agent, &world, self.rng.as_mut());
            agent.x = step.x;
            agent.y = step.y;
            agent.state = step.state;
        }
    }

    pub(super) fn decay_aura(&mut self, dt_ms: u64) {
        let rate = AURA_DECAY_PER_SEC * self.aura_decay_multiplier();
        let drain = rate * dt_ms as f32 / 1000.0;
        let mut drained = Vec::new();
        for (idx, player) in self.players.iter_mut().enumerate() {
            if !player.is_cooperator() || !player.view.alive {
                continue;
            }
            player.view.aura = (player.view.aura - drain).max(0.0);
            if player.view.aura <= 0.0 {
                drained.push(idx);
            }
        }
        for idx in drained {
            self.lose_talisman(idx, TalismanLossReason::Aura);
        }
    }

    /// Living, non-invulnerable cooperators touching a non-stunned agent.
    pub(super) fn resolve_catches(&mut self) {
        let caught: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, player)| {
                player.is_cooperator()
                    && player.view.alive
                    && self.now_ms >= player.view.invulnerable_until
                    && self.agents.iter().any(|agent| {
                        !agent.is_stunned()
                            && distance(agent.position(), player.position()) <= CATCH_RADIUS
                    })
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in caught {
            self.lose_talisman(idx, TalismanLossReason::Caught);
        }
    }

    pub(super) fn lose_talisman(&mut self, idx: usize, reason: TalismanLossReason) {
        let Some(player) = self.players.get_mut(idx) else {
            return;
        };
        if !player.view.alive {
            return;
        }
        player.view.talismans = player.view.talismans.saturating_sub(1);
        let player_id = player.view.id.clone();
        let talismans = player.view.talismans;
        self.broadcast(ServerEvent::TalismanUpdate {
            player_id: player_id.clone(),
            talismans,
            reason,
        });
        self.drop_carried_item(idx);

        if talismans == 0 {
            let player = &mut self.players[idx].view;
            player.alive = false;
            player.aura = 0.0;
            self.circle.qualifying.retain(|id| id != &player_id);
            info!(room_id = %self.id, player_id = %player_id, ?reason, "player died");
            self.broadcast(ServerEvent::PlayerDied { player_id });
            return;
        }

        let now_ms = self.now_ms;
        let internal = &mut self.players[idx];
        internal.view.x = internal.spawn.0;
        internal.view.y = internal.spawn.1;
        internal.view.aura = AURA_MAX;
        internal.view.invulnerable_until = now_ms + CATCH_GRACE_MS;
        let (x, y) = internal.spawn;
        self.broadcast(ServerEvent::PlayerRespawn {
            player_id: player_id.clone(),
            x,
            y,
            aura: AURA_MAX,
            talismans,
        });
        self.broadcast(ServerEvent::AuraUpdate {
            player_id,
            aura: AURA_MAX,
        });
    }

    /// Ends the game once no cooperator is left alive.
    pub(super) fn check_all_dead(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        let any_alive = self
            .players
            .iter()
            .any(|player| player.is_cooperator() && player.view.alive);
        if !any_alive {
            self.end_game(Phase::ChaathanWin, GameOverReason::AllDead);
        }
    }

    pub(super) fn broadcast_aura(&mut self) {
        let updates: Vec<(String, f32)> = self
            .players
            .iter()
            .filter(|player| player.is_cooperator() && player.view.alive)
            .map(|player| (player.view.id.clone(), player.view.aura))
            .collect();
        for (player_id, aura) in updates {
            self.broadcast(ServerEvent::AuraUpdate { player_id, aura });
        }
    }
}
