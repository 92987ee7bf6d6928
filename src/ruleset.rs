use crate::types::GameMode;

/// Feature switches that distinguish the two game variants.
///
/// The session engine branches on these flags and never on the mode itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ruleset {
    pub mode: GameMode,
    /// One roster member is drawn as the antagonist at instructions time.
    pub player_antagonist: bool,
    /// AI agents are spawned from the difficulty roster.
    pub ai_antagonists: bool,
    pub abilities: bool,
    pub ritual_item: bool,
    /// Mini lamps go to shuffled rooms and a grand lamp gates the circle.
    pub grand_lamp: bool,
    pub aura: bool,
    pub salt: bool,
    pub catch: bool,
    /// Cooperators only see their own role in `game-start`.
    pub hidden_roles: bool,
}

impl Ruleset {
    pub fn for_mode(mode: GameMode) -> Self {
        match mode {
            GameMode::Competitive => Self {
                mode,
                player_antagonist: true,
                ai_antagonists: false,
                abilities: true,
                ritual_item: true,
                grand_lamp: false,
                aura: false,
                salt: false,
                catch: false,
                hidden_roles: true,
            },
            GameMode::Survival => Self {
                mode,
                player_antagonist: false,
                ai_antagonists: true,
                abilities: false,
                ritual_item: false,
                grand_lamp: true,
                aura: true,
                salt: true,
                catch: true,
                hidden_roles: false,
            },
        }
    }

    /// Competitive circles accept players from the start; survival waits for the grand lamp.
    pub fn circle_starts_active(&self) -> bool {
        !self.grand_lamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_do_not_overlap_on_antagonist_source() {
        for mode in [GameMode::Competitive, GameMode::Survival] {
            let rules = Ruleset::for_mode(mode);
            assert_ne!(rules.player_antagonist, rules.ai_antagonists);
            assert_eq!(rules.abilities, rules.player_antagonist);
        }
    }

    #[test]
    fn only_survival_gates_the_circle_on_the_grand_lamp() {
        assert!(Ruleset::for_mode(GameMode::Competitive).circle_starts_active());
        assert!(!Ruleset::for_mode(GameMode::Survival).circle_starts_active());
    }
}
