// Roles, ruleset variants, option flags and the per-viewer visibility rules.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Secret role held by a player for the duration of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unassigned; never valid once a game has started.
    #[default]
    Default,
    Resistance,
    Spy,
    /// Resistance member who knows the spies.
    Merlin,
    /// Resistance member who sees Merlin and Morgana without telling them apart.
    Percival,
    /// Spy who appears as Merlin to Percival.
    Morgana,
}

impl Role {
    /// Roles allowed to sabotage a mission.
    pub fn is_hostile(self) -> bool {
        matches!(self, Role::Spy | Role::Morgana)
    }

    /// How a player holding `self` sees another player whose real role is `target`.
    ///
    /// Callers never apply this to the viewer's own entry.
    pub fn sees(self, target: Role) -> Role {
        match self {
            Role::Spy => match target {
                Role::Merlin | Role::Percival => Role::Resistance,
                other => other,
            },
            Role::Merlin => match target {
                Role::Percival => Role::Resistance,
                other => other,
            },
            // Merlin and Morgana share one marker so Percival cannot tell them apart.
            Role::Percival => match target {
                Role::Merlin | Role::Morgana => Role::Merlin,
                _ => Role::Resistance,
            },
            Role::Morgana => match target {
                Role::Spy => Role::Spy,
                _ => Role::Resistance,
            },
            Role::Resistance | Role::Default => Role::Resistance,
        }
    }
}

/// Ruleset variant chosen when a lobby is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Ruleset {
    /// Spies and resistance only.
    #[default]
    Basic,
    Original,
    /// Adds Merlin, the hidden ally of the resistance.
    Avalon,
    Hunter,
    Trumpmode,
}

impl Ruleset {
    pub fn name(self) -> &'static str {
        match self {
            Ruleset::Basic => "Basic",
            Ruleset::Original => "Original",
            Ruleset::Avalon => "Avalon",
            Ruleset::Hunter => "Hunter",
            Ruleset::Trumpmode => "Trumpmode",
        }
    }
}

impl TryFrom<u8> for Ruleset {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Ruleset::Basic),
            1 => Ok(Ruleset::Original),
            2 => Ok(Ruleset::Avalon),
            3 => Ok(Ruleset::Hunter),
            4 => Ok(Ruleset::Trumpmode),
            other => Err(format!("lobby type {other} is not valid")),
        }
    }
}

impl From<Ruleset> for u8 {
    fn from(ruleset: Ruleset) -> Self {
        ruleset as u8
    }
}

/// Bitmask of optional roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameOption(pub u16);

impl GameOption {
    pub const NONE: GameOption = GameOption(0);
    pub const PERCIVAL: GameOption = GameOption(1 << 1);
    /// Morgana always brings Percival along, so it carries the Percival bit too.
    pub const MORGANA: GameOption = GameOption((1 << 0) | (1 << 1));

    pub fn add(self, option: GameOption) -> GameOption {
        GameOption(self.0 | option.0)
    }

    pub fn remove(self, option: GameOption) -> GameOption {
        GameOption(self.0 & !option.0)
    }

    pub fn toggle(self, option: GameOption) -> GameOption {
        GameOption(self.0 ^ option.0)
    }

    /// True when every bit of `option` is set.
    pub fn has(self, option: GameOption) -> bool {
        option.0 != 0 && self.0 & option.0 == option.0
    }
}

/// Number of spies dealt for a table of `players`.
pub fn spy_count(players: usize) -> usize {
    match players {
        5 | 6 => 2,
        7..=9 => 3,
        10 => 4,
        _ => 0,
    }
}

/// Deals roles for `players` seats; index `i` of the result belongs to seat `i`.
///
/// Spies are drawn first, the rest become resistance, then Merlin, Percival and
/// Morgana are each drawn from the seats nobody has claimed yet.
pub fn assign_roles<R: Rng + ?Sized>(
    players: usize,
    ruleset: Ruleset,
    option: GameOption,
    rng: &mut R,
) -> Vec<Role> {
    let mut roles = vec![Role::Default; players];
    let mut pool: Vec<usize> = (0..players).collect();

    for _ in 0..spy_count(players) {
        if let Some(seat) = draw(&mut pool, rng) {
            roles[seat] = Role::Spy;
        }
    }

    for &seat in &pool {
        roles[seat] = Role::Resistance;
    }

    if ruleset == Ruleset::Avalon {
        if let Some(seat) = draw(&mut pool, rng) {
            roles[seat] = Role::Merlin;
        }
    }

    let mut percival = false;
    if option.has(GameOption::PERCIVAL) {
        if let Some(seat) = draw(&mut pool, rng) {
            roles[seat] = Role::Percival;
            percival = true;
        }
    }

    if option.has(GameOption::MORGANA) {
        if !percival {
            if let Some(seat) = draw(&mut pool, rng) {
                roles[seat] = Role::Percival;
            }
        }
        if let Some(seat) = draw(&mut pool, rng) {
            roles[seat] = Role::Morgana;
        }
    }

    roles
}

fn draw<R: Rng + ?Sized>(pool: &mut Vec<usize>, rng: &mut R) -> Option<usize> {
    if pool.is_empty() {
        return None;
    }
    let index = rng.random_range(0..pool.len());
    Some(pool.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn count(roles: &[Role], role: Role) -> usize {
        roles.iter().filter(|r| **r == role).count()
    }

    #[test]
    fn role_counts_follow_the_table_for_every_size_and_option() {
        let options = [
            (Ruleset::Basic, GameOption::NONE),
            (Ruleset::Avalon, GameOption::NONE),
            (Ruleset::Avalon, GameOption::PERCIVAL),
            (Ruleset::Avalon, GameOption::MORGANA),
            (Ruleset::Avalon, GameOption::PERCIVAL.add(GameOption::MORGANA)),
        ];

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for players in 5..=10 {
                for (ruleset, option) in options {
                    let roles = assign_roles(players, ruleset, option, &mut rng);

                    assert_eq!(roles.len(), players);
                    assert_eq!(count(&roles, Role::Default), 0);
                    assert_eq!(count(&roles, Role::Spy), spy_count(players));

                    let merlin = usize::from(ruleset == Ruleset::Avalon);
                    assert_eq!(count(&roles, Role::Merlin), merlin);

                    let morgana = usize::from(option.has(GameOption::MORGANA));
                    let percival = usize::from(option.has(GameOption::PERCIVAL) || morgana == 1);
                    assert_eq!(count(&roles, Role::Percival), percival);
                    assert_eq!(count(&roles, Role::Morgana), morgana);

                    let resistance = players - spy_count(players) - merlin - percival - morgana;
                    assert_eq!(count(&roles, Role::Resistance), resistance);
                }
            }
        }
    }

    #[test]
    fn seven_players_deal_three_spies() {
        let mut rng = StdRng::seed_from_u64(7);
        let roles = assign_roles(7, Ruleset::Avalon, GameOption::NONE, &mut rng);
        assert_eq!(count(&roles, Role::Spy), 3);
        assert_eq!(count(&roles, Role::Merlin), 1);
        assert_eq!(count(&roles, Role::Resistance), 3);
    }

    #[test]
    fn same_seed_deals_the_same_roles() {
        let a = assign_roles(8, Ruleset::Avalon, GameOption::MORGANA, &mut StdRng::seed_from_u64(42));
        let b = assign_roles(8, Ruleset::Avalon, GameOption::MORGANA, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn resistance_sees_only_resistance() {
        for target in [Role::Resistance, Role::Spy, Role::Merlin, Role::Percival, Role::Morgana] {
            assert_eq!(Role::Resistance.sees(target), Role::Resistance);
        }
    }

    #[test]
    fn spy_sees_fellow_hostiles_but_not_special_resistance() {
        assert_eq!(Role::Spy.sees(Role::Spy), Role::Spy);
        assert_eq!(Role::Spy.sees(Role::Morgana), Role::Morgana);
        assert_eq!(Role::Spy.sees(Role::Merlin), Role::Resistance);
        assert_eq!(Role::Spy.sees(Role::Percival), Role::Resistance);
        assert_eq!(Role::Spy.sees(Role::Resistance), Role::Resistance);
    }

    #[test]
    fn merlin_sees_every_hostile_as_their_real_role() {
        assert_eq!(Role::Merlin.sees(Role::Spy), Role::Spy);
        assert_eq!(Role::Merlin.sees(Role::Morgana), Role::Morgana);
        assert_eq!(Role::Merlin.sees(Role::Percival), Role::Resistance);
        assert_eq!(Role::Merlin.sees(Role::Resistance), Role::Resistance);
    }

    #[test]
    fn percival_cannot_tell_merlin_from_morgana() {
        assert_eq!(Role::Percival.sees(Role::Merlin), Role::Merlin);
        assert_eq!(Role::Percival.sees(Role::Morgana), Role::Merlin);
        assert_eq!(Role::Percival.sees(Role::Spy), Role::Resistance);
        assert_eq!(Role::Percival.sees(Role::Resistance), Role::Resistance);
    }

    #[test]
    fn morgana_sees_only_spies() {
        assert_eq!(Role::Morgana.sees(Role::Spy), Role::Spy);
        assert_eq!(Role::Morgana.sees(Role::Merlin), Role::Resistance);
        assert_eq!(Role::Morgana.sees(Role::Percival), Role::Resistance);
    }

    #[test]
    fn option_bits_compose() {
        let option = GameOption::NONE.add(GameOption::PERCIVAL);
        assert!(option.has(GameOption::PERCIVAL));
        assert!(!option.has(GameOption::MORGANA));
        assert!(!option.has(GameOption::NONE));

        // Adding Morgana keeps Percival; removing Percival leaves only the Morgana-only bit.
        let option = option.add(GameOption::MORGANA);
        assert_eq!(option, GameOption::MORGANA);
        assert!(option.has(GameOption::PERCIVAL));
        let option = option.remove(GameOption::PERCIVAL);
        assert!(!option.has(GameOption::PERCIVAL));
        assert!(!option.has(GameOption::MORGANA));
        assert_eq!(option.toggle(GameOption::PERCIVAL), GameOption::MORGANA);
    }

    #[test]
    fn option_wire_values_select_the_optional_roles() {
        let percival: GameOption = serde_json::from_str("2").expect("option");
        assert_eq!(percival, GameOption::PERCIVAL);
        let roles = assign_roles(6, Ruleset::Avalon, percival, &mut StdRng::seed_from_u64(3));
        assert_eq!(count(&roles, Role::Percival), 1);
        assert_eq!(count(&roles, Role::Morgana), 0);

        let morgana: GameOption = serde_json::from_str("3").expect("option");
        assert_eq!(morgana, GameOption::MORGANA);
        let roles = assign_roles(6, Ruleset::Avalon, morgana, &mut StdRng::seed_from_u64(3));
        assert_eq!(count(&roles, Role::Percival), 1);
        assert_eq!(count(&roles, Role::Morgana), 1);

        // The low bit alone names no role.
        let roles = assign_roles(6, Ruleset::Avalon, GameOption(1), &mut StdRng::seed_from_u64(3));
        assert_eq!(count(&roles, Role::Percival) + count(&roles, Role::Morgana), 0);
    }

    #[test]
    fn ruleset_rejects_unknown_values() {
        assert_eq!(serde_json::from_str::<Ruleset>("2").ok(), Some(Ruleset::Avalon));
        assert!(serde_json::from_str::<Ruleset>("5").is_err());
        assert_eq!(serde_json::to_string(&Ruleset::Trumpmode).ok().as_deref(), Some("4"));
    }
}
