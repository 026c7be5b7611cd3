// Round and mission bookkeeping plus the win/loss rules.

use serde::{Deserialize, Serialize};

/// Rounds per game.
pub const ROUNDS: usize = 5;
/// Team proposals allowed per round.
pub const MISSIONS: usize = 5;

/// Result of a round or of the whole game, seen from the resistance side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not played yet, or not decided yet.
    #[default]
    Default,
    Lost,
    Won,
}

/// One team proposal and the table's vote on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub accept: Vec<String>,
    pub decline: Vec<String>,
    pub assignees: Vec<String>,
}

impl Mission {
    pub fn is_accepted(&self) -> bool {
        self.accept.len() > self.decline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accept.is_empty() && self.decline.is_empty() && self.assignees.is_empty()
    }

    /// Proposed and voted down, as opposed to never proposed.
    pub fn is_rejected(&self) -> bool {
        !self.is_empty() && !self.is_accepted()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub missions: [Mission; MISSIONS],
    /// Team size every proposal in this round must have.
    pub assignees: u8,
    /// Sabotage votes needed for the spies to take the round.
    #[serde(rename = "minfailure")]
    pub min_failure: u8,
    /// Sabotage votes cast, filled in once the mission resolves.
    pub failure: u8,
    // Who decided what stays private until the round result is broadcast.
    #[serde(skip)]
    success_ids: Vec<String>,
    #[serde(skip)]
    failure_ids: Vec<String>,
}

/// Round result broadcast once a mission has been decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub missions: [Mission; MISSIONS],
    pub assignees: u8,
    #[serde(rename = "minfailure")]
    pub min_failure: u8,
    pub failure: u8,
    pub success_ids: Vec<String>,
    pub failure_ids: Vec<String>,
    pub status: Status,
}

impl Round {
    pub fn new(assignees: u8, min_failure: u8) -> Self {
        Self {
            assignees,
            min_failure,
            ..Self::default()
        }
    }

    pub fn record_decision(&mut self, player_id: &str, success: bool) {
        if success {
            self.success_ids.push(player_id.to_string());
        } else {
            self.failure_ids.push(player_id.to_string());
        }
    }

    pub fn decisions(&self) -> usize {
        self.success_ids.len() + self.failure_ids.len()
    }

    /// Copies the private sabotage count into the public `failure` field.
    pub fn resolve(&mut self) {
        self.failure = u8::try_from(self.failure_ids.len()).unwrap_or(u8::MAX);
    }

    pub fn conclusion(&self) -> Status {
        if self.missions.iter().all(Mission::is_empty) {
            return Status::Default;
        }

        let rejected = self.missions.iter().filter(|m| m.is_rejected()).count();
        if rejected == MISSIONS {
            return Status::Lost;
        }

        if self.failure >= self.min_failure {
            Status::Lost
        } else {
            Status::Won
        }
    }

    pub fn result(&self) -> RoundResult {
        RoundResult {
            missions: self.missions.clone(),
            assignees: self.assignees,
            min_failure: self.min_failure,
            failure: self.failure,
            success_ids: self.success_ids.clone(),
            failure_ids: self.failure_ids.clone(),
            status: self.conclusion(),
        }
    }
}

// (assignees, min_failure) per round for 5, 6, 7 and 8+ players.
const SCHEDULE: [[(u8, u8); ROUNDS]; 4] = [
    [(2, 1), (3, 1), (2, 1), (3, 1), (3, 1)],
    [(2, 1), (3, 1), (4, 1), (3, 1), (4, 1)],
    [(2, 1), (3, 1), (3, 1), (4, 2), (4, 1)],
    [(3, 1), (4, 1), (4, 1), (5, 2), (5, 1)],
];

/// Fresh rounds for a table of `players`; tables above 8 reuse the 8-player row.
pub fn schedule(players: usize) -> [Round; ROUNDS] {
    let row = &SCHEDULE[players.clamp(5, 8) - 5];
    std::array::from_fn(|i| Round::new(row[i].0, row[i].1))
}

/// Tallies round conclusions into a game result.
///
/// A lost round whose fifth proposal was voted down ends the game for the
/// spies straight away; otherwise three rounds of either kind decide it.
pub fn game_status(rounds: &[Round]) -> Status {
    let mut spies = 0;
    let mut resistance = 0;

    for round in rounds {
        match round.conclusion() {
            Status::Lost => {
                if round.missions[MISSIONS - 1].is_rejected() {
                    return Status::Lost;
                }
                spies += 1;
            }
            Status::Won => resistance += 1,
            Status::Default => {}
        }
    }

    if spies >= 3 {
        Status::Lost
    } else if resistance >= 3 {
        Status::Won
    } else {
        Status::Default
    }
}
