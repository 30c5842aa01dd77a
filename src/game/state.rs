use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use super::rules;

/// 棋盘格子数。
pub const BOARD_SIZE: usize = 9;
/// 棋盘边长。
pub const BOARD_WIDTH: usize = 3;

/// 人机模式下电脑固定执 O。
pub const COMPUTER: Player = Player::O;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown player `{0}`")]
    UnknownPlayer(String),
    #[error("unknown cell `{0}`")]
    UnknownCell(String),
    #[error("unknown game mode `{0}`")]
    UnknownMode(String),
    #[error("unknown opening policy `{0}`")]
    UnknownOpening(String),
    #[error("a board has 9 cells, got {0}")]
    BoardLength(usize),
}

/// 玩家标识，X 永远先手。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Player {
    #[default]
    X,
    O,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Player::X => "X",
            Player::O => "O",
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Player {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(Player::X),
            "O" | "o" => Ok(Player::O),
            other => Err(ParseError::UnknownPlayer(other.to_string())),
        }
    }
}

/// 单个格子：空，或者某个玩家的棋子。
///
/// 与前端交互时序列化为 `""`、`"X"`、`"O"`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Cell {
    #[default]
    Empty,
    Mark(Player),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn mark(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Mark(player) => Some(player),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cell::Empty => "",
            Cell::Mark(player) => player.as_str(),
        }
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        Cell::Mark(player)
    }
}

impl From<Cell> for &'static str {
    fn from(cell: Cell) -> Self {
        cell.as_str()
    }
}

impl FromStr for Cell {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "_" | "." => Ok(Cell::Empty),
            other => other
                .parse::<Player>()
                .map(Cell::Mark)
                .map_err(|_| ParseError::UnknownCell(other.to_string())),
        }
    }
}

impl TryFrom<String> for Cell {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 3×3 棋盘，下标 = 行 * 3 + 列。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct Board {
    cells: [Cell; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Cell; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell; BOARD_SIZE] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    pub(crate) fn set(&mut self, index: usize, cell: Cell) {
        self.cells[index] = cell;
    }

    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn count(&self, player: Player) -> usize {
        self.iter().filter(|cell| cell.mark() == Some(player)).count()
    }

    pub fn filled(&self) -> usize {
        self.iter().filter(|cell| !cell.is_empty()).count()
    }

    pub fn is_full(&self) -> bool {
        self.iter().all(|cell| !cell.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(Cell::is_empty)
    }
}

impl Index<usize> for Board {
    type Output = Cell;

    fn index(&self, index: usize) -> &Self::Output {
        &self.cells[index]
    }
}

/// 紧凑写法，如 `OO_/XX_/___`。
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, cell) in self.iter().enumerate() {
            if index > 0 && index % BOARD_WIDTH == 0 {
                f.write_str("/")?;
            }
            match cell {
                Cell::Empty => f.write_str("_")?,
                Cell::Mark(player) => f.write_str(player.as_str())?,
            }
        }
        Ok(())
    }
}

/// 接受 `Display` 的写法，也接受不带分隔符的九个字符。
impl FromStr for Board {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cells = Vec::with_capacity(BOARD_SIZE);
        for ch in s.chars() {
            match ch {
                '/' | '|' => continue,
                c if c.is_whitespace() => continue,
                '_' | '.' | '-' => cells.push(Cell::Empty),
                'X' | 'x' => cells.push(Cell::Mark(Player::X)),
                'O' | 'o' => cells.push(Cell::Mark(Player::O)),
                other => return Err(ParseError::UnknownCell(other.to_string())),
            }
        }
        let cells: [Cell; BOARD_SIZE] = cells
            .try_into()
            .map_err(|rest: Vec<Cell>| ParseError::BoardLength(rest.len()))?;
        Ok(Self { cells })
    }
}

/// 对局结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", content = "winner")]
pub enum GameOutcome {
    #[default]
    InProgress,
    Win(Player),
    Draw,
}

impl GameOutcome {
    pub fn is_finished(self) -> bool {
        !matches!(self, GameOutcome::InProgress)
    }

    pub fn winner(self) -> Option<Player> {
        match self {
            GameOutcome::Win(player) => Some(player),
            _ => None,
        }
    }
}

/// 对战模式：双人对战，或人（X）对电脑（O）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Pvp,
    Pva,
}

impl GameMode {
    /// 由电脑控制的一方。
    pub fn computer(self) -> Option<Player> {
        match self {
            GameMode::Pvp => None,
            GameMode::Pva => Some(COMPUTER),
        }
    }
}

impl FromStr for GameMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pvp" | "human" | "two-player" => Ok(GameMode::Pvp),
            "pva" | "ai" | "computer" => Ok(GameMode::Pva),
            other => Err(ParseError::UnknownMode(other.to_string())),
        }
    }
}

/// 比分，"再来一局"时保留。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Scoreboard {
    pub x_wins: u32,
    pub o_wins: u32,
    pub draws: u32,
}

impl Scoreboard {
    pub fn record(&mut self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Win(Player::X) => self.x_wins += 1,
            GameOutcome::Win(Player::O) => self.o_wins += 1,
            GameOutcome::Draw => self.draws += 1,
            GameOutcome::InProgress => {}
        }
    }

    pub fn wins(&self, player: Player) -> u32 {
        match player {
            Player::X => self.x_wins,
            Player::O => self.o_wins,
        }
    }
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MovePlayed {
        player: Player,
        index: usize,
    },
    GameWon {
        winner: Player,
        line: rules::WinPattern,
    },
    GameDrawn,
    BoardReset,
    ModeChanged {
        mode: GameMode,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("mark counts are impossible: {x} X against {o} O")]
    MarkCountMismatch { x: usize, o: usize },
    #[error("{actual} is to move but the board says {expected}")]
    WrongPlayerToMove { expected: Player, actual: Player },
    #[error("stored outcome {stored:?} does not match the board ({actual:?})")]
    OutcomeMismatch {
        stored: GameOutcome,
        actual: GameOutcome,
    },
}

/// 一局游戏的完整状态，由前端控制器持有。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub board: Board,
    #[serde(default)]
    pub current_player: Player,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub scores: Scoreboard,
    #[serde(default)]
    pub outcome: GameOutcome,
    #[serde(default)]
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(mode: GameMode) -> Self {
        Self {
            board: Board::new(),
            current_player: Player::X,
            mode,
            scores: Scoreboard::default(),
            outcome: GameOutcome::InProgress,
            turn: 0,
            event_log: Vec::new(),
        }
    }

    /// 从一个已有棋盘恢复状态，轮次与结果由棋盘推导。
    pub fn with_board(mut self, board: Board) -> Self {
        self.board = board;
        self.outcome = rules::outcome(&board);
        self.current_player = Self::player_to_move(&board);
        self.turn = board.filled() as u32;
        self
    }

    fn player_to_move(board: &Board) -> Player {
        if board.count(Player::X) > board.count(Player::O) {
            Player::O
        } else {
            Player::X
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_finished()
    }

    /// "再来一局"：清空棋盘，X 先手，比分保留。
    pub fn reset(&mut self) {
        self.board = Board::new();
        self.current_player = Player::X;
        self.outcome = GameOutcome::InProgress;
        self.turn = 0;
        self.event_log.clear();
        self.record_event(GameEvent::BoardReset);
        log::info!(
            "board reset, score X {} / O {} / draws {}",
            self.scores.x_wins,
            self.scores.o_wins,
            self.scores.draws
        );
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        if self.mode != mode {
            self.mode = mode;
            self.record_event(GameEvent::ModeChanged { mode });
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let x = self.board.count(Player::X);
        let o = self.board.count(Player::O);
        if x != o && x != o + 1 {
            return Err(IntegrityError::MarkCountMismatch { x, o });
        }

        let actual = rules::outcome(&self.board);
        if actual != self.outcome {
            return Err(IntegrityError::OutcomeMismatch {
                stored: self.outcome,
                actual,
            });
        }

        if !actual.is_finished() {
            let expected = Self::player_to_move(&self.board);
            if expected != self.current_player {
                return Err(IntegrityError::WrongPlayerToMove {
                    expected,
                    actual: self.current_player,
                });
            }
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(GameMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_parses_and_prints_compact_form() {
        let board: Board = "OO_XX____".parse().expect("board should parse");
        assert_eq!(board[0], Cell::Mark(Player::O));
        assert_eq!(board[3], Cell::Mark(Player::X));
        assert_eq!(board[2], Cell::Empty);
        assert_eq!(board.to_string(), "OO_/XX_/___");
        assert_eq!(board.to_string().parse::<Board>(), Ok(board));
    }

    #[test]
    fn board_rejects_wrong_length() {
        assert_eq!("XO".parse::<Board>(), Err(ParseError::BoardLength(2)));
        assert!(matches!(
            "XOZ______".parse::<Board>(),
            Err(ParseError::UnknownCell(_))
        ));
    }

    #[test]
    fn board_serializes_as_browser_strings() {
        let board: Board = "X___O____".parse().expect("board should parse");
        let json = serde_json::to_string(&board).expect("board should serialize");
        assert_eq!(json, r#"["X","","","","O","","","",""]"#);

        let back: Board = serde_json::from_str(&json).expect("board should deserialize");
        assert_eq!(back, board);

        let bad = serde_json::from_str::<Board>(r#"["X","","",""]"#);
        assert!(bad.is_err(), "short arrays are not boards");
    }

    #[test]
    fn outcome_serializes_with_winner() {
        let json = serde_json::to_string(&GameOutcome::Win(Player::O)).expect("serialize");
        assert_eq!(json, r#"{"type":"Win","winner":"O"}"#);
        let json = serde_json::to_string(&GameOutcome::Draw).expect("serialize");
        assert_eq!(json, r#"{"type":"Draw"}"#);
    }

    #[test]
    fn mode_parses_loose_names() {
        assert_eq!("PVA".parse::<GameMode>(), Ok(GameMode::Pva));
        assert_eq!("computer".parse::<GameMode>(), Ok(GameMode::Pva));
        assert_eq!("pvp".parse::<GameMode>(), Ok(GameMode::Pvp));
        assert!("solo".parse::<GameMode>().is_err());
        assert_eq!(GameMode::Pva.computer(), Some(Player::O));
        assert_eq!(GameMode::Pvp.computer(), None);
    }

    #[test]
    fn reset_keeps_scores() {
        let mut state =
            GameState::new(GameMode::Pvp).with_board("XXXOO____".parse().expect("board"));
        state.scores.record(state.outcome);
        assert!(state.is_finished());

        state.reset();
        assert!(state.board.is_empty());
        assert_eq!(state.current_player, Player::X);
        assert_eq!(state.outcome, GameOutcome::InProgress);
        assert_eq!(state.scores.wins(Player::X), 1);
        assert_eq!(state.event_log, vec![GameEvent::BoardReset]);
    }

    #[test]
    fn integrity_check_catches_bad_states() {
        let mut state = GameState::default();
        assert_eq!(state.integrity_check(), Ok(()));

        state.board = "XX_______".parse().expect("board");
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::MarkCountMismatch { x: 2, o: 0 })
        );

        state.board = "X________".parse().expect("board");
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::WrongPlayerToMove {
                expected: Player::O,
                actual: Player::X,
            })
        );

        let state = GameState::default().with_board("XXXOO____".parse().expect("board"));
        assert_eq!(state.integrity_check(), Ok(()));
        let mut stale = state.clone();
        stale.outcome = GameOutcome::InProgress;
        assert!(matches!(
            stale.integrity_check(),
            Err(IntegrityError::OutcomeMismatch { .. })
        ));
    }
}
