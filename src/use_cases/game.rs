// Game engine: deals roles, then drives rounds of propose, vote and decide phases
// over the players' connections until one side has taken three rounds.

use crate::domain::errors::{CommandError, GameError};
use crate::domain::role::assign_roles;
use crate::domain::round::{MISSIONS, ROUNDS, game_status, schedule};
use crate::domain::{GameOption, Role, Round, Ruleset, Status};
use crate::interface_adapters::protocol::{
    CMD_CHOOSE, CMD_DECIDE, CMD_END, CMD_GET, CMD_ROUND, CMD_VOTE, CMD_VOTEMAX, Envelope, GROUP_GAME,
    GameEnd, GameSnapshot, PlayerView,
};
use crate::use_cases::conn::{Command, Commands, Connection};
use crate::use_cases::lock;
use crate::use_cases::phase::{Phase, PhaseOutcome};

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

pub const MIN_PLAYERS: usize = 5;
pub const MAX_PLAYERS: usize = 10;

/// How long each phase waits for input before moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimeouts {
    pub propose: Duration,
    pub vote: Duration,
    pub decide: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            propose: Duration::from_secs(60),
            vote: Duration::from_secs(180),
            decide: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct Player {
    conn: Arc<Connection>,
    role: Role,
}

impl Player {
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn is_valid(&self) -> bool {
        self.role != Role::Default && !self.conn.is_closed()
    }
}

struct GameState {
    rounds: [Round; ROUNDS],
    // Index into `players`.
    captain: Option<usize>,
}

enum MissionOutcome {
    Accepted,
    Rejected,
    // Captain never proposed; the same slot is retried.
    Unassigned,
}

pub struct Game {
    ruleset: Ruleset,
    option: GameOption,
    timeouts: PhaseTimeouts,
    players: Vec<Player>,
    state: Mutex<GameState>,
}

impl Game {
    /// Validates the table and deals roles at random.
    pub fn new(
        conns: Vec<Arc<Connection>>,
        ruleset: Ruleset,
        option: GameOption,
        timeouts: PhaseTimeouts,
    ) -> Result<Arc<Self>, GameError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&conns.len()) {
            return Err(GameError::InvalidClients(conns.len()));
        }
        if (option.has(GameOption::PERCIVAL) || option.has(GameOption::MORGANA))
            && ruleset != Ruleset::Avalon
        {
            return Err(GameError::OptionRequiresAvalon);
        }

        let roles = assign_roles(conns.len(), ruleset, option, &mut rand::rng());
        Ok(Self::with_roles(conns, roles, ruleset, option, timeouts))
    }

    pub(crate) fn with_roles(
        conns: Vec<Arc<Connection>>,
        roles: Vec<Role>,
        ruleset: Ruleset,
        option: GameOption,
        timeouts: PhaseTimeouts,
    ) -> Arc<Self> {
        let rounds = schedule(conns.len());
        let players = conns
            .into_iter()
            .zip(roles)
            .map(|(conn, role)| Player { conn, role })
            .collect();

        Arc::new(Self {
            ruleset,
            option,
            timeouts,
            players,
            state: Mutex::new(GameState {
                rounds,
                captain: None,
            }),
        })
    }

    pub fn ruleset(&self) -> Ruleset {
        self.ruleset
    }

    pub fn option(&self) -> GameOption {
        self.option
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id() == id)
    }

    pub fn captain(&self) -> Option<String> {
        let state = lock(&self.state);
        state
            .captain
            .and_then(|index| self.players.get(index))
            .map(|player| player.id().to_string())
    }

    pub fn rounds(&self) -> Vec<Round> {
        lock(&self.state).rounds.to_vec()
    }

    pub fn status(&self) -> Status {
        game_status(&lock(&self.state).rounds)
    }

    /// Plays the game to the end. The final status is broadcast as `game.end`
    /// and sent on `status_tx`, including when the task is cancelled.
    pub async fn run(self: Arc<Self>, status_tx: oneshot::Sender<Status>) {
        let _report = EndReport {
            game: &self,
            status_tx: Some(status_tx),
        };

        info!(
            players = self.players.len(),
            ruleset = self.ruleset.name(),
            option = self.option.0,
            "game started"
        );
        self.send();

        for round in 0..ROUNDS {
            if self.run_round(round).await {
                break;
            }
        }
    }

    /// Returns true once the game is decided or can no longer continue.
    ///
    /// Each proposal phase spends one of the round's attempts, whether the team
    /// was voted down or never proposed, so a round always ends.
    async fn run_round(self: &Arc<Self>, round: usize) -> bool {
        // Slot of the next proposal; only a vote moves it forward.
        let mut mission = 0;
        for attempt in 0..MISSIONS {
            // Nobody left to play with
            if self.is_abandoned() {
                warn!(round, "every player disconnected; abandoning game");
                return true;
            }

            match self.run_mission(round, mission).await {
                MissionOutcome::Accepted => {
                    // Approved team goes on the mission, then the tally decides.
                    self.run_decision(round, mission).await;
                    return self.status() != Status::Default;
                }
                MissionOutcome::Rejected => {
                    // Voted down: next captain, next slot.
                    self.rotate_captain();
                    mission += 1;
                }
                MissionOutcome::Unassigned => {
                    // No team in time: next captain retries the same slot.
                    debug!(round, mission, attempt, "slot retried by the next captain");
                    self.rotate_captain();
                }
            }
        }

        info!(round, rejected = mission, "the round ran out of proposals");
        true
    }

    async fn run_mission(self: &Arc<Self>, round: usize, mission: usize) -> MissionOutcome {
        // SelectCaptain: keep the current one unless they disconnected.
        let captain = &self.players[self.ensure_captain()];
        let required = lock(&self.state).rounds[round].assignees;

        // ProposeTeam: register `choose` before anyone hears about it.
        let phase = Phase::new();
        captain.conn.add_commands(
            GROUP_GAME,
            Commands::new().with(CMD_CHOOSE, self.choose_command(round, mission, &phase)),
        );
        self.broadcast(CMD_CHOOSE, captain.id());
        self.broadcast(CMD_VOTEMAX, required);

        let outcome = phase.wait(self.timeouts.propose).await;
        // Stale proposals must not reach the next phase.
        captain.conn.remove_commands_by_names(GROUP_GAME, &[CMD_CHOOSE]);
        if outcome == PhaseOutcome::TimedOut {
            info!(round, mission, captain = %captain.id(), "no team proposed in time");
            return MissionOutcome::Unassigned;
        }

        let assignees = lock(&self.state).rounds[round].missions[mission]
            .assignees
            .clone();

        // ApproveTeam: every connected player gets one `vote` command.
        let phase = Phase::new();
        for player in self.players.iter().filter(|player| player.is_valid()) {
            player.conn.add_commands(
                GROUP_GAME,
                Commands::new().with(CMD_VOTE, self.vote_command(round, mission, player.id(), &phase)),
            );
        }
        self.broadcast(CMD_VOTE, &assignees);

        let outcome = phase.wait(self.timeouts.vote).await;
        for player in &self.players {
            player.conn.remove_commands_by_names(GROUP_GAME, &[CMD_VOTE]);
        }
        // Everyone sees the recorded votes.
        self.send();

        let accepted = lock(&self.state).rounds[round].missions[mission].is_accepted();
        debug!(round, mission, ?outcome, accepted, "team vote closed");
        if accepted {
            MissionOutcome::Accepted
        } else {
            MissionOutcome::Rejected
        }
    }

    async fn run_decision(self: &Arc<Self>, round: usize, mission: usize) {
        let assignees = lock(&self.state).rounds[round].missions[mission]
            .assignees
            .clone();

        // DecideMission: only the assignees get a single-shot `decide`.
        let phase = Phase::new();
        for player in assignees.iter().filter_map(|id| self.player(id)) {
            player.conn.add_commands(
                GROUP_GAME,
                Commands::new().with(CMD_DECIDE, self.decide_command(round, player.id(), &phase)),
            );
        }
        self.broadcast(CMD_DECIDE, &assignees);

        let outcome = phase.wait(self.timeouts.decide).await;
        for player in assignees.iter().filter_map(|id| self.player(id)) {
            player.conn.remove_commands_by_names(GROUP_GAME, &[CMD_DECIDE]);
        }

        // Publish the sabotage count and broadcast the round result.
        let result = {
            let mut state = lock(&self.state);
            let entry = &mut state.rounds[round];
            entry.resolve();
            entry.result()
        };
        info!(
            round,
            failure = result.failure,
            status = ?result.status,
            ?outcome,
            "mission decided"
        );
        self.broadcast(CMD_ROUND, &result);
    }

    fn choose_command(self: &Arc<Self>, round: usize, mission: usize, phase: &Arc<Phase>) -> Command {
        let game = Arc::downgrade(self);
        let phase = phase.clone();
        Command::new(move |body| {
            let Some(game) = game.upgrade() else {
                return Ok(());
            };
            let ids: Vec<String> = serde_json::from_value(body)?;
            game.propose(round, mission, ids, &phase)?;
            Ok(())
        })
    }

    fn vote_command(
        self: &Arc<Self>,
        round: usize,
        mission: usize,
        voter: &str,
        phase: &Arc<Phase>,
    ) -> Command {
        let game = Arc::downgrade(self);
        let voter = voter.to_string();
        let phase = phase.clone();
        Command::new(move |body| {
            let Some(game) = game.upgrade() else {
                return Ok(());
            };
            let accept: bool = serde_json::from_value(body)?;
            game.vote(round, mission, &voter, accept, &phase);
            Ok(())
        })
    }

    fn decide_command(self: &Arc<Self>, round: usize, decider: &str, phase: &Arc<Phase>) -> Command {
        let game = Arc::downgrade(self);
        let decider = decider.to_string();
        let phase = phase.clone();
        Command::once(move |body| {
            let Some(game) = game.upgrade() else {
                return Ok(());
            };
            game.decide(round, &decider, body, &phase)
        })
    }

    /// Records the captain's team for `mission` if it passes validation.
    pub(crate) fn propose(
        &self,
        round: usize,
        mission: usize,
        ids: Vec<String>,
        phase: &Phase,
    ) -> Result<(), GameError> {
        let mut state = lock(&self.state);
        if phase.is_completed() {
            return Ok(());
        }

        let want = usize::from(state.rounds[round].assignees);
        if ids.len() != want {
            return Err(GameError::MinAssignees {
                want,
                have: ids.len(),
            });
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if self.player(id).is_none_or(|player| !player.is_valid()) {
                return Err(GameError::InvalidPlayer);
            }
            if !seen.insert(id.as_str()) {
                return Err(GameError::DuplicatePlayer);
            }
        }

        state.rounds[round].missions[mission].assignees = ids;
        phase.complete();
        Ok(())
    }

    /// Every vote is appended as cast; a player voting twice is counted twice.
    pub(crate) fn vote(&self, round: usize, mission: usize, voter: &str, accept: bool, phase: &Phase) {
        let mut state = lock(&self.state);
        if phase.is_completed() {
            return;
        }

        let entry = &mut state.rounds[round].missions[mission];
        if accept {
            entry.accept.push(voter.to_string());
        } else {
            entry.decline.push(voter.to_string());
        }

        if entry.accept.len() + entry.decline.len() >= self.players.len() {
            phase.complete();
        }
    }

    /// Only hostile roles may sabotage; anyone else is recorded as a success.
    pub(crate) fn decide(
        &self,
        round: usize,
        decider: &str,
        body: Value,
        phase: &Phase,
    ) -> Result<(), CommandError> {
        let role = self.player(decider).map_or(Role::Default, Player::role);
        let success = if role.is_hostile() {
            serde_json::from_value::<bool>(body)?
        } else {
            true
        };

        let mut state = lock(&self.state);
        if phase.is_completed() {
            return Ok(());
        }

        let entry = &mut state.rounds[round];
        entry.record_decision(decider, success);
        if entry.decisions() >= usize::from(entry.assignees) {
            phase.complete();
        }
        Ok(())
    }

    /// Picks a captain at random the first time, then skips disconnected players.
    fn ensure_captain(&self) -> usize {
        let mut state = lock(&self.state);
        let count = self.players.len();
        let mut captain = match state.captain {
            Some(index) if index < count => index,
            _ => rand::rng().random_range(0..count),
        };

        for _ in 0..count {
            if self.players[captain].is_valid() {
                break;
            }
            captain = (captain + 1) % count;
        }

        state.captain = Some(captain);
        captain
    }

    fn rotate_captain(&self) {
        let mut state = lock(&self.state);
        let count = self.players.len();
        state.captain = Some(state.captain.map_or(0, |index| (index + 1) % count));
    }

    fn is_abandoned(&self) -> bool {
        self.players.iter().all(|player| player.conn.is_closed())
    }

    /// The table as `viewer` is allowed to see it.
    pub fn snapshot_for(&self, viewer: &Player) -> GameSnapshot {
        let state = lock(&self.state);
        let players = self
            .players
            .iter()
            .map(|player| PlayerView {
                id: player.id().to_string(),
                display_name: player.conn.identity().display_name.clone(),
                role: if player.id() == viewer.id() {
                    player.role
                } else {
                    viewer.role.sees(player.role)
                },
            })
            .collect();

        GameSnapshot {
            ruleset: self.ruleset,
            option: self.option,
            players,
            rounds: state.rounds.to_vec(),
            captain: state
                .captain
                .and_then(|index| self.players.get(index))
                .map(|player| player.id().to_string()),
        }
    }

    /// Sends each connected player their own masked snapshot.
    pub fn send(&self) {
        for player in self.players.iter().filter(|player| player.is_valid()) {
            if let Err(error) = player
                .conn
                .write_message(GROUP_GAME, CMD_GET, self.snapshot_for(player))
            {
                error!(player_id = %player.id(), %error, "failed to encode game snapshot");
            }
        }
    }

    pub fn broadcast<T: Serialize>(&self, name: &str, body: T) {
        let bytes = match Envelope::new(GROUP_GAME, name, body).encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(name, %error, "failed to encode game broadcast");
                return;
            }
        };

        for player in self.players.iter().filter(|player| player.is_valid()) {
            player.conn.write_bytes(bytes.clone());
        }
    }
}

struct EndReport<'a> {
    game: &'a Game,
    status_tx: Option<oneshot::Sender<Status>>,
}

impl Drop for EndReport<'_> {
    fn drop(&mut self) {
        let status = self.game.status();
        self.game.broadcast(CMD_END, GameEnd { status });
        info!(?status, "game finished");
        if let Some(status_tx) = self.status_tx.take() {
            let _ = status_tx.send(status);
        }
    }
}
