use super::*;
use crate::constants::RITUAL_STEP_MS;

impl RoomSession {
    /// Recomputes who stands in the circle and starts or breaks accrual.
    pub(super) fn evaluate_ritual(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        self.circle.qualifying = self
            .players
            .iter()
            .filter(|player| {
                player.is_cooperator()
                    && player.view.alive
                    && self.circle.contains(player.position())
            })
            .map(|player| player.view.id.clone())
            .collect();

        let holding = self.ritual_holds();
        match (holding, self.circle.accrual) {
            (true, None) => {
                let handle =
                    self.timers
                        .schedule_repeating(TaskKind::RitualAccrual, self.now_ms, RITUAL_STEP_MS);
                self.circle.accrual = Some(handle);
            }
            (false, Some(_)) => self.reset_ritual_progress(),
            _ => {}
        }
    }

    fn ritual_holds(&self) -> bool {
        if !self.circle.active {
            return false;
        }
        let inside = |id: &str| self.circle.qualifying.iter().any(|q| q == id);

        if self.ruleset.ritual_item {
            let mut cooperators = self.players.iter().filter(|p| p.is_cooperator()).peekable();
            if cooperators.peek().is_none() {
                return false;
            }
            let everyone_inside = cooperators.all(|p| p.view.alive && inside(&p.view.id));
            let item_inside = self
                .item
                .as_ref()
                .and_then(|item| item.carrier.as_deref())
                .map(inside)
                .unwrap_or(false);
            let lamps_lit = self
                .lamps
                .iter()
                .all(|lamp| lamp.state == LampState::Lit);
            everyone_inside && item_inside && lamps_lit
        } else {
            let mut alive = self
                .players
                .iter()
                .filter(|p| p.is_cooperator() && p.view.alive)
                .peekable();
            alive.peek().is_some() && alive.all(|p| inside(&p.view.id))
        }
    }

    pub(super) fn accrue_ritual(&mut self) {
        self.circle.progress = (self.circle.progress + RITUAL_STEP_MS).min(RITUAL_DURATION_MS);
        self.broadcast(ServerEvent::RitualProgress {
            progress: self.circle.progress,
            total: RITUAL_DURATION_MS,
        });
        if self.circle.progress >= RITUAL_DURATION_MS {
            self.end_game(Phase::PoojariWin, GameOverReason::RitualComplete);
        }
    }

    /// Stops accrual and zeroes progress, announcing the break if anything was lost.
    pub(super) fn reset_ritual_progress(&mut self) {
        let was_running = match self.circle.accrual.take() {
            Some(handle) => {
                self.timers.cancel(handle);
                true
            }
            None => false,
        };
        if was_running || self.circle.progress > 0 {
            self.circle.progress = 0;
            self.broadcast(ServerEvent::RitualProgress {
                progress: 0,
                total: RITUAL_DURATION_MS,
            });
            self.broadcast(ServerEvent::RitualDisrupted);
        }
    }
}
