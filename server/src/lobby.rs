use crate::board::{Board, BoardError, BoardLayout, ColorTable};
use log::info;
use shared::{
    DiceColor, GameSnapshot, LobbySnapshot, DEFAULT_LOBBY, MAX_LOBBY_PLAYERS, MIN_START_PLAYERS,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyState {
    Open,
    Running,
    Finished,
}

impl LobbyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyState::Open => "Open",
            LobbyState::Running => "Running",
            LobbyState::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    NameTaken,
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::NameTaken => write!(f, "a lobby with that name already exists"),
        }
    }
}

impl std::error::Error for CreateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    UnknownLobby,
    Full,
    AlreadyGrouped,
    GameRunning,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::UnknownLobby => write!(f, "no lobby with that name"),
            JoinError::Full => write!(f, "that lobby is full"),
            JoinError::AlreadyGrouped => {
                write!(f, "leave your current lobby first (JOIN%Welcome)")
            }
            JoinError::GameRunning => write!(f, "the game in that lobby has already started"),
        }
    }
}

impl std::error::Error for JoinError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartGameError {
    NotInLobby,
    DefaultLobby,
    NotHost,
    NotOpen,
    NotEnoughPlayers,
}

impl fmt::Display for StartGameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartGameError::NotInLobby => write!(f, "you are not in a lobby"),
            StartGameError::DefaultLobby => {
                write!(f, "the {} lobby cannot start a game", DEFAULT_LOBBY)
            }
            StartGameError::NotHost => write!(f, "only the host can start the game"),
            StartGameError::NotOpen => write!(f, "the game has already started"),
            StartGameError::NotEnoughPlayers => write!(
                f,
                "at least {} players are needed to start",
                MIN_START_PLAYERS
            ),
        }
    }
}

impl std::error::Error for StartGameError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartError {
    NotInLobby,
    NotHost,
    NotRunning,
}

impl fmt::Display for RestartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartError::NotInLobby => write!(f, "you are not in a lobby"),
            RestartError::NotHost => write!(f, "only the host can restart the game"),
            RestartError::NotRunning => write!(f, "there is no running game to restart"),
        }
    }
}

impl std::error::Error for RestartError {}

/// Reasons a game action (roll, select, move, pass) is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayError {
    NotInLobby,
    NotRunning,
    NotYourTurn,
    Board(BoardError),
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayError::NotInLobby => write!(f, "you are not in a game lobby"),
            PlayError::NotRunning => write!(f, "no game is running in your lobby"),
            PlayError::NotYourTurn => write!(f, "it is not your turn"),
            PlayError::Board(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for PlayError {}

impl From<BoardError> for PlayError {
    fn from(e: BoardError) -> Self {
        PlayError::Board(e)
    }
}

/// Outcome of recording a finished rider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameProgress {
    Continue,
    /// All but one member had won; the last remaining member is appended as
    /// final winner and the lobby reaches Finished.
    Finished { final_order: Vec<u32> },
}

/// A named group of up to four users sharing one game and its turn order.
///
/// Membership is stored by user id with nicknames resolved on demand, so a
/// rename can never strand a stale membership entry. The first member is
/// the host.
#[derive(Debug, PartialEq)]
pub struct Lobby {
    name: String,
    players: Vec<u32>,
    state: LobbyState,
    ready: HashMap<u32, bool>,
    turn_index: usize,
    winners: Vec<u32>,
    boards: HashMap<u32, Board>,
    tables: HashMap<u32, ColorTable>,
}

impl Lobby {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            players: Vec::new(),
            state: LobbyState::Open,
            ready: HashMap::new(),
            turn_index: 0,
            winners: Vec::new(),
            boards: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_LOBBY
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn players(&self) -> &[u32] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains(&id)
    }

    /// The host is always the first member in join order
    pub fn host(&self) -> Option<u32> {
        self.players.first().copied()
    }

    pub fn winners(&self) -> &[u32] {
        &self.winners
    }

    pub fn current_player(&self) -> Option<u32> {
        self.players.get(self.turn_index).copied()
    }

    pub fn set_ready(&mut self, id: u32) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.ready.insert(id, true);
        true
    }

    pub fn all_ready(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|id| self.ready.get(id).copied().unwrap_or(false))
    }

    fn add_member(&mut self, id: u32) {
        self.players.push(id);
    }

    /// Removes a member and every piece of state keyed to them.
    ///
    /// The turn index is adjusted so the rotation continues with the member
    /// that followed the removed one.
    fn remove_member(&mut self, id: u32) -> bool {
        let Some(pos) = self.players.iter().position(|&p| p == id) else {
            return false;
        };
        self.players.remove(pos);
        self.ready.remove(&id);
        self.boards.remove(&id);
        self.tables.remove(&id);
        self.winners.retain(|&w| w != id);

        if pos < self.turn_index {
            self.turn_index -= 1;
        }
        if self.turn_index >= self.players.len() {
            self.turn_index = 0;
        }
        if self.state == LobbyState::Running && self.players.len() < MIN_START_PLAYERS {
            info!(
                "Lobby '{}' lost too many players mid-game, marking finished",
                self.name
            );
            self.state = LobbyState::Finished;
        }
        true
    }

    /// Transitions Open -> Running: fresh boards and credit tables for every
    /// member, ready flags reset to false, turn back to the host.
    fn begin(&mut self, layout: Arc<BoardLayout>) {
        self.state = LobbyState::Running;
        self.turn_index = 0;
        self.winners.clear();
        for &id in &self.players {
            self.ready.insert(id, false);
            self.boards.insert(id, Board::new(layout.clone()));
            self.tables.insert(id, ColorTable::new());
        }
    }

    /// Running -> Running with fields reset: every board back to the start
    /// field, winners and pending credits cleared, membership unchanged.
    fn reset_fields(&mut self) {
        self.turn_index = 0;
        self.winners.clear();
        for board in self.boards.values_mut() {
            board.reset();
        }
        for table in self.tables.values_mut() {
            table.clear();
        }
    }

    /// Rotates the turn to the next member in join order, skipping members
    /// that already won. With a single non-winner left the turn resolves to
    /// that member. None if every member has won.
    pub fn advance_turn(&mut self) -> Option<u32> {
        let n = self.players.len();
        if n == 0 {
            return None;
        }
        for step in 1..=n {
            let idx = (self.turn_index + step) % n;
            let candidate = self.players[idx];
            if !self.winners.contains(&candidate) {
                self.turn_index = idx;
                return Some(candidate);
            }
        }
        None
    }

    /// Records a rider crossing the finish field.
    ///
    /// When that leaves at most one member still racing, the last remaining
    /// member auto-wins the final place and the lobby reaches Finished.
    pub fn add_winner(&mut self, id: u32) -> GameProgress {
        if !self.winners.contains(&id) {
            self.winners.push(id);
        }
        let remaining: Vec<u32> = self
            .players
            .iter()
            .copied()
            .filter(|p| !self.winners.contains(p))
            .collect();
        if remaining.len() <= 1 {
            if let Some(&last) = remaining.first() {
                self.winners.push(last);
            }
            self.state = LobbyState::Finished;
            info!("Lobby '{}' finished, podium {:?}", self.name, self.winners);
            return GameProgress::Finished {
                final_order: self.winners.clone(),
            };
        }
        GameProgress::Continue
    }

    fn ensure_turn(&self, player: u32) -> Result<(), PlayError> {
        if !self.contains(player) {
            return Err(PlayError::NotInLobby);
        }
        if self.state != LobbyState::Running {
            return Err(PlayError::NotRunning);
        }
        if self.current_player() != Some(player) {
            return Err(PlayError::NotYourTurn);
        }
        Ok(())
    }

    /// Replaces the player's credit table with the rolled colors, returning
    /// any pending selection first.
    pub fn apply_roll(&mut self, player: u32, colors: &[DiceColor]) -> Result<(), PlayError> {
        self.ensure_turn(player)?;
        let board = self.boards.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let table = self.tables.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        board.clear_selection(table);
        table.clear();
        for &color in colors {
            table.add(color);
        }
        Ok(())
    }

    /// Selects a field for the player, consuming one credit of its color.
    pub fn select_field(&mut self, player: u32, field: &str) -> Result<DiceColor, PlayError> {
        self.ensure_turn(player)?;
        let board = self.boards.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let table = self.tables.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let color = board.select(field, table)?;
        table.take(color);
        Ok(color)
    }

    /// Takes back a selected field, restoring exactly one credit.
    pub fn deselect_field(&mut self, player: u32, field: &str) -> Result<DiceColor, PlayError> {
        self.ensure_turn(player)?;
        let board = self.boards.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let table = self.tables.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let color = board.deselect(field)?;
        table.give_back(color);
        Ok(color)
    }

    /// Commits the pending selection as a move; returns the new field.
    pub fn commit_move(&mut self, player: u32) -> Result<String, PlayError> {
        self.ensure_turn(player)?;
        let board = self.boards.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        Ok(board.commit_move()?)
    }

    /// Ends the player's turn: pending selection and credits are dropped,
    /// the turn rotates past any winners. Returns the next player, if any.
    pub fn end_turn(&mut self, player: u32) -> Result<Option<u32>, PlayError> {
        self.ensure_turn(player)?;
        let board = self.boards.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        let table = self.tables.get_mut(&player).ok_or(PlayError::NotInLobby)?;
        board.clear_selection(table);
        table.clear();
        Ok(self.advance_turn())
    }

    pub fn board_of(&self, player: u32) -> Option<&Board> {
        self.boards.get(&player)
    }

    pub fn snapshot(&self, mut resolve: impl FnMut(u32) -> String) -> LobbySnapshot {
        LobbySnapshot {
            name: self.name.clone(),
            state: self.state.as_str().to_string(),
            members: self.players.iter().map(|&id| resolve(id)).collect(),
            winners: self.winners.iter().map(|&id| resolve(id)).collect(),
        }
    }

    pub fn game_snapshot(&self, mut resolve: impl FnMut(u32) -> String) -> GameSnapshot {
        GameSnapshot {
            lobby: self.name.clone(),
            state: self.state.as_str().to_string(),
            current_player: if self.state == LobbyState::Running {
                self.current_player().map(&mut resolve)
            } else {
                None
            },
            positions: self
                .players
                .iter()
                .map(|&id| {
                    let field = self
                        .boards
                        .get(&id)
                        .map(|b| b.current().to_string())
                        .unwrap_or_default();
                    (resolve(id), field)
                })
                .collect(),
        }
    }
}

/// Process-wide, creation-ordered collection of lobbies.
///
/// The reserved default lobby holds every registered user that has not
/// joined a game lobby yet; it always exists and is always first. A user id
/// belongs to at most one non-default lobby at a time.
pub struct LobbyManager {
    lobbies: Vec<Lobby>,
    layout: Arc<BoardLayout>,
}

impl LobbyManager {
    pub fn new(layout: Arc<BoardLayout>) -> Self {
        Self {
            lobbies: vec![Lobby::new(DEFAULT_LOBBY)],
            layout,
        }
    }

    pub fn layout(&self) -> Arc<BoardLayout> {
        self.layout.clone()
    }

    pub fn get(&self, name: &str) -> Option<&Lobby> {
        self.lobbies.iter().find(|l| l.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Lobby> {
        self.lobbies.iter_mut().find(|l| l.name == name)
    }

    /// The lobby the user currently belongs to (possibly the default one)
    pub fn lobby_of(&self, id: u32) -> Option<&Lobby> {
        self.lobbies.iter().find(|l| l.contains(id))
    }

    pub fn lobby_of_mut(&mut self, id: u32) -> Option<&mut Lobby> {
        self.lobbies.iter_mut().find(|l| l.contains(id))
    }

    pub fn lobby_names(&self) -> Vec<String> {
        self.lobbies.iter().map(|l| l.name.clone()).collect()
    }

    /// Places a freshly registered user into the default lobby
    pub fn add_user(&mut self, id: u32) {
        if self.lobby_of(id).is_some() {
            return;
        }
        self.lobbies[0].add_member(id);
    }

    pub fn create(&mut self, name: &str) -> Result<(), CreateError> {
        if self.get(name).is_some() {
            return Err(CreateError::NameTaken);
        }
        info!("Lobby '{}' created", name);
        self.lobbies.push(Lobby::new(name));
        Ok(())
    }

    /// Moves the user into the named lobby.
    ///
    /// Fails if the lobby is unknown, full (4), mid-game, or the user is
    /// already grouped in a different non-default lobby. Joining the
    /// default lobby is how a user leaves their current group.
    pub fn join(&mut self, name: &str, id: u32) -> Result<(), JoinError> {
        let target = self.get(name).ok_or(JoinError::UnknownLobby)?;
        if target.contains(id) {
            return Err(JoinError::AlreadyGrouped);
        }
        if !target.is_default() {
            if target.len() >= MAX_LOBBY_PLAYERS {
                return Err(JoinError::Full);
            }
            if target.state() != LobbyState::Open {
                return Err(JoinError::GameRunning);
            }
            if let Some(current) = self.lobby_of(id) {
                if !current.is_default() {
                    return Err(JoinError::AlreadyGrouped);
                }
            }
        }

        self.detach(id);
        // Lookup again: detach may have dropped an emptied lobby and shifted
        // the vector.
        let target = self.get_mut(name).ok_or(JoinError::UnknownLobby)?;
        target.add_member(id);
        info!("User {} joined lobby '{}'", id, name);
        Ok(())
    }

    /// Removes the user from whatever lobby holds them, dropping an emptied
    /// non-default lobby. Returns the name of the lobby left.
    pub fn remove_player(&mut self, id: u32) -> Option<String> {
        let name = self.lobby_of(id)?.name.clone();
        self.detach(id);
        Some(name)
    }

    fn detach(&mut self, id: u32) {
        if let Some(lobby) = self.lobby_of_mut(id) {
            lobby.remove_member(id);
        }
        self.lobbies
            .retain(|l| l.is_default() || !l.is_empty());
    }

    /// Starts the requester's lobby game. See `StartGameError` for the
    /// distinct rejection reasons the contract requires.
    pub fn start_game(&mut self, requester: u32) -> Result<&Lobby, StartGameError> {
        let layout = self.layout.clone();
        let lobby = self
            .lobby_of_mut(requester)
            .ok_or(StartGameError::NotInLobby)?;
        if lobby.is_default() {
            return Err(StartGameError::DefaultLobby);
        }
        if lobby.host() != Some(requester) {
            return Err(StartGameError::NotHost);
        }
        if lobby.state != LobbyState::Open {
            return Err(StartGameError::NotOpen);
        }
        if lobby.len() < MIN_START_PLAYERS {
            return Err(StartGameError::NotEnoughPlayers);
        }
        lobby.begin(layout);
        info!("Lobby '{}' started its game", lobby.name);
        Ok(&*lobby)
    }

    /// Restarts a running game in place: fields reset, winners cleared,
    /// membership and state untouched otherwise.
    pub fn restart_game(&mut self, requester: u32) -> Result<&Lobby, RestartError> {
        let lobby = self
            .lobby_of_mut(requester)
            .ok_or(RestartError::NotInLobby)?;
        if lobby.is_default() {
            return Err(RestartError::NotRunning);
        }
        if lobby.host() != Some(requester) {
            return Err(RestartError::NotHost);
        }
        if lobby.state != LobbyState::Running {
            return Err(RestartError::NotRunning);
        }
        lobby.reset_fields();
        info!("Lobby '{}' restarted its game", lobby.name);
        Ok(&*lobby)
    }

    pub fn snapshot(&self, mut resolve: impl FnMut(u32) -> String) -> Vec<LobbySnapshot> {
        self.lobbies
            .iter()
            .map(|l| l.snapshot(&mut resolve))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LobbyManager {
        LobbyManager::new(Arc::new(BoardLayout::standard()))
    }

    /// Registers ids 1..=n into the default lobby
    fn with_users(manager: &mut LobbyManager, n: u32) {
        for id in 1..=n {
            manager.add_user(id);
        }
    }

    #[test]
    fn test_default_lobby_exists() {
        let manager = manager();
        let welcome = manager.get(DEFAULT_LOBBY).unwrap();
        assert!(welcome.is_default());
        assert_eq!(welcome.state(), LobbyState::Open);
    }

    #[test]
    fn test_new_user_lands_in_default_lobby() {
        let mut manager = manager();
        manager.add_user(1);
        assert_eq!(manager.lobby_of(1).unwrap().name(), DEFAULT_LOBBY);
    }

    #[test]
    fn test_create_and_join() {
        let mut manager = manager();
        with_users(&mut manager, 2);

        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        let alpha = manager.get("Alpha").unwrap();
        assert_eq!(alpha.players(), &[1, 2]);
        assert_eq!(alpha.host(), Some(1));
        // Members left the default lobby
        assert!(!manager.get(DEFAULT_LOBBY).unwrap().contains(1));
    }

    #[test]
    fn test_create_duplicate_name() {
        let mut manager = manager();
        manager.create("Alpha").unwrap();
        assert_eq!(manager.create("Alpha"), Err(CreateError::NameTaken));
    }

    #[test]
    fn test_join_unknown_lobby() {
        let mut manager = manager();
        with_users(&mut manager, 1);
        assert_eq!(manager.join("Nowhere", 1), Err(JoinError::UnknownLobby));
    }

    #[test]
    fn test_lobby_never_admits_fifth_member() {
        let mut manager = manager();
        with_users(&mut manager, 5);
        manager.create("Alpha").unwrap();
        for id in 1..=4 {
            manager.join("Alpha", id).unwrap();
        }

        assert_eq!(manager.join("Alpha", 5), Err(JoinError::Full));
        assert_eq!(manager.get("Alpha").unwrap().players(), &[1, 2, 3, 4]);
        // The rejected user stays where they were
        assert_eq!(manager.lobby_of(5).unwrap().name(), DEFAULT_LOBBY);
    }

    #[test]
    fn test_join_while_grouped_elsewhere() {
        let mut manager = manager();
        with_users(&mut manager, 1);
        manager.create("Alpha").unwrap();
        manager.create("Beta").unwrap();
        manager.join("Alpha", 1).unwrap();

        assert_eq!(manager.join("Beta", 1), Err(JoinError::AlreadyGrouped));
        assert_eq!(manager.lobby_of(1).unwrap().name(), "Alpha");
    }

    #[test]
    fn test_join_default_leaves_group() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        manager.join(DEFAULT_LOBBY, 2).unwrap();
        assert_eq!(manager.lobby_of(2).unwrap().name(), DEFAULT_LOBBY);
        assert_eq!(manager.get("Alpha").unwrap().players(), &[1]);
    }

    #[test]
    fn test_empty_lobby_is_dropped() {
        let mut manager = manager();
        with_users(&mut manager, 1);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();

        manager.join(DEFAULT_LOBBY, 1).unwrap();
        assert!(manager.get("Alpha").is_none());
    }

    #[test]
    fn test_join_running_lobby_rejected() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        assert_eq!(manager.join("Alpha", 3), Err(JoinError::GameRunning));
    }

    #[test]
    fn test_start_game_success() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        let lobby = manager.start_game(1).unwrap();
        assert_eq!(lobby.state(), LobbyState::Running);
        assert_eq!(lobby.current_player(), Some(1));
        assert!(!lobby.all_ready());
        assert!(lobby.board_of(1).is_some());
        assert!(lobby.board_of(2).is_some());
    }

    #[test]
    fn test_start_game_by_non_host() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        assert_eq!(manager.start_game(2), Err(StartGameError::NotHost));
        assert_eq!(manager.get("Alpha").unwrap().state(), LobbyState::Open);
    }

    #[test]
    fn test_start_game_non_host_after_running() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        // Host check comes before the state check
        assert_eq!(manager.start_game(2), Err(StartGameError::NotHost));
        assert_eq!(manager.get("Alpha").unwrap().state(), LobbyState::Running);
    }

    #[test]
    fn test_start_game_twice() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        assert_eq!(manager.start_game(1), Err(StartGameError::NotOpen));
    }

    #[test]
    fn test_start_game_alone() {
        let mut manager = manager();
        with_users(&mut manager, 1);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();

        assert_eq!(manager.start_game(1), Err(StartGameError::NotEnoughPlayers));
        assert_eq!(manager.get("Alpha").unwrap().state(), LobbyState::Open);
    }

    #[test]
    fn test_start_game_in_default_lobby() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        let host = manager.get(DEFAULT_LOBBY).unwrap().host().unwrap();
        assert_eq!(manager.start_game(host), Err(StartGameError::DefaultLobby));
    }

    #[test]
    fn test_restart_resets_fields_and_winners() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        lobby
            .apply_roll(1, &[DiceColor::Red, DiceColor::Red, DiceColor::Red])
            .unwrap();
        lobby.select_field(1, "red1").unwrap();
        lobby.commit_move(1).unwrap();
        assert_eq!(lobby.board_of(1).unwrap().current(), "red1");
        lobby.winners.push(2);

        manager.restart_game(1).unwrap();
        let lobby = manager.get("Alpha").unwrap();
        assert_eq!(lobby.state(), LobbyState::Running);
        assert_eq!(lobby.board_of(1).unwrap().current(), shared::START_FIELD);
        assert!(lobby.winners().is_empty());
        assert_eq!(lobby.current_player(), Some(1));
    }

    #[test]
    fn test_restart_requires_running() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        assert_eq!(manager.restart_game(1), Err(RestartError::NotRunning));
    }

    #[test]
    fn test_restart_requires_host() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        assert_eq!(manager.restart_game(2), Err(RestartError::NotHost));
    }

    #[test]
    fn test_advance_turn_rotates_in_join_order() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        for id in 1..=3 {
            manager.join("Alpha", id).unwrap();
        }
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        assert_eq!(lobby.advance_turn(), Some(2));
        assert_eq!(lobby.advance_turn(), Some(3));
        assert_eq!(lobby.advance_turn(), Some(1));
    }

    #[test]
    fn test_advance_turn_skips_winners() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        for id in 1..=3 {
            manager.join("Alpha", id).unwrap();
        }
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        lobby.winners.push(2);
        assert_eq!(lobby.advance_turn(), Some(3));
        assert_eq!(lobby.advance_turn(), Some(1));
    }

    #[test]
    fn test_advance_turn_resolves_to_last_non_winner() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        for id in 1..=3 {
            manager.join("Alpha", id).unwrap();
        }
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        lobby.winners.push(1);
        lobby.winners.push(3);
        assert_eq!(lobby.advance_turn(), Some(2));
        assert_eq!(lobby.advance_turn(), Some(2));
    }

    #[test]
    fn test_add_winner_auto_wins_last_remaining() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        for id in 1..=3 {
            manager.join("Alpha", id).unwrap();
        }
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        assert_eq!(lobby.add_winner(2), GameProgress::Continue);
        match lobby.add_winner(1) {
            GameProgress::Finished { final_order } => {
                // 3 never crossed the line but takes the last place
                assert_eq!(final_order, vec![2, 1, 3]);
            }
            other => panic!("expected Finished, got {:?}", other),
        }
        assert_eq!(lobby.state(), LobbyState::Finished);
    }

    #[test]
    fn test_play_requires_turn_and_running_state() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();

        {
            let lobby = manager.lobby_of_mut(1).unwrap();
            assert_eq!(
                lobby.apply_roll(1, &[DiceColor::Red]),
                Err(PlayError::NotRunning)
            );
        }

        manager.start_game(1).unwrap();
        let lobby = manager.lobby_of_mut(1).unwrap();
        assert_eq!(
            lobby.apply_roll(2, &[DiceColor::Red]),
            Err(PlayError::NotYourTurn)
        );
        assert_eq!(
            lobby.select_field(1, "red1"),
            Err(PlayError::Board(BoardError::NoCredit))
        );
    }

    #[test]
    fn test_roll_select_move_flow() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        lobby
            .apply_roll(1, &[DiceColor::Red, DiceColor::Blue, DiceColor::Blue])
            .unwrap();
        assert_eq!(lobby.select_field(1, "red1"), Ok(DiceColor::Red));
        assert_eq!(lobby.select_field(1, "blue1"), Ok(DiceColor::Blue));
        assert_eq!(lobby.commit_move(1), Ok("blue1".to_string()));
        assert_eq!(lobby.board_of(1).unwrap().current(), "blue1");

        // End of turn hands over to the second player
        assert_eq!(lobby.end_turn(1), Ok(Some(2)));
    }

    #[test]
    fn test_deselect_restores_credit() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        let lobby = manager.lobby_of_mut(1).unwrap();
        lobby.apply_roll(1, &[DiceColor::Red]).unwrap();
        lobby.select_field(1, "red1").unwrap();
        // Credit consumed: a second red selection is impossible
        assert_eq!(
            lobby.select_field(1, "red2"),
            Err(PlayError::Board(BoardError::NoCredit))
        );

        assert_eq!(lobby.deselect_field(1, "red1"), Ok(DiceColor::Red));
        // Net zero: the credit is usable again
        assert_eq!(lobby.select_field(1, "red1"), Ok(DiceColor::Red));
    }

    #[test]
    fn test_remove_member_mid_game_promotes_host() {
        let mut manager = manager();
        with_users(&mut manager, 3);
        manager.create("Alpha").unwrap();
        for id in 1..=3 {
            manager.join("Alpha", id).unwrap();
        }
        manager.start_game(1).unwrap();

        manager.remove_player(1);
        let lobby = manager.get("Alpha").unwrap();
        assert_eq!(lobby.players(), &[2, 3]);
        assert_eq!(lobby.host(), Some(2));
        assert_eq!(lobby.current_player(), Some(2));
    }

    #[test]
    fn test_remove_last_opponent_finishes_game() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        manager.remove_player(2);
        assert_eq!(manager.get("Alpha").unwrap().state(), LobbyState::Finished);
    }

    #[test]
    fn test_snapshots_resolve_nicknames() {
        let mut manager = manager();
        with_users(&mut manager, 2);
        manager.create("Alpha").unwrap();
        manager.join("Alpha", 1).unwrap();
        manager.join("Alpha", 2).unwrap();
        manager.start_game(1).unwrap();

        let resolve = |id: u32| format!("user{}", id);
        let snapshots = manager.snapshot(resolve);
        let alpha = snapshots.iter().find(|s| s.name == "Alpha").unwrap();
        assert_eq!(alpha.members, vec!["user1", "user2"]);
        assert_eq!(alpha.state, "Running");

        let game = manager.get("Alpha").unwrap().game_snapshot(resolve);
        assert_eq!(game.current_player.as_deref(), Some("user1"));
        assert_eq!(game.positions.len(), 2);
        assert_eq!(game.positions[0].1, shared::START_FIELD);
    }
}
