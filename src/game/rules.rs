use serde::{Deserialize, Serialize};

use super::state::{
    Board, Cell, GameEvent, GameOutcome, GameState, IntegrityError, Player, BOARD_SIZE,
};

/// 构成一条连线的三个格子下标。
pub type WinPattern = [usize; 3];

/// 固定的扫描顺序：三行、三列、两条对角线。
pub const WIN_PATTERNS: [WinPattern; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is already over")]
    GameFinished,
    #[error("it is {expected}'s turn, not {actual}'s")]
    NotPlayerTurn { expected: Player, actual: Player },
    #[error("cell {index} is off the board")]
    OutOfRange { index: usize },
    #[error("cell {index} is already taken by {owner}")]
    CellOccupied { index: usize, owner: Player },
    #[error("invalid game state: {error}")]
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveAction {
    pub player: Player,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    pub outcome: GameOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<WinPattern>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome;
        let winning_line = winning_line(&state.board);
        Self {
            state,
            events,
            outcome,
            winning_line,
        }
    }
}

pub fn is_valid_move(board: &Board, index: usize) -> bool {
    matches!(board.get(index), Some(Cell::Empty))
}

/// 与 [`apply_move`] 相同，但说明失败原因。
pub fn try_apply_move(board: &mut Board, index: usize, player: Player) -> Result<(), RuleError> {
    match board.get(index) {
        None => Err(RuleError::OutOfRange { index }),
        Some(Cell::Mark(owner)) => Err(RuleError::CellOccupied { index, owner }),
        Some(Cell::Empty) => {
            board.set(index, Cell::Mark(player));
            Ok(())
        }
    }
}

/// 落子成功返回 `true`；非法落子时棋盘保持不变。
pub fn apply_move(board: &mut Board, index: usize, player: Player) -> bool {
    try_apply_move(board, index, player).is_ok()
}

pub fn empty_cells(board: &Board) -> Vec<usize> {
    (0..BOARD_SIZE).filter(|&index| board[index].is_empty()).collect()
}

fn find_win(board: &Board) -> Option<(Player, WinPattern)> {
    WIN_PATTERNS.iter().find_map(|&pattern| {
        let [a, b, c] = pattern;
        let owner = board[a].mark()?;
        (board[b] == board[a] && board[c] == board[a]).then_some((owner, pattern))
    })
}

pub fn check_winner(board: &Board) -> Option<Player> {
    find_win(board).map(|(player, _)| player)
}

/// 第一条成立的连线，供前端高亮。
pub fn winning_line(board: &Board) -> Option<WinPattern> {
    find_win(board).map(|(_, pattern)| pattern)
}

pub fn is_terminal(board: &Board) -> bool {
    check_winner(board).is_some() || board.is_full()
}

pub fn outcome(board: &Board) -> GameOutcome {
    match check_winner(board) {
        Some(player) => GameOutcome::Win(player),
        None if board.is_full() => GameOutcome::Draw,
        None => GameOutcome::InProgress,
    }
}

/// 在 [`GameState`] 上执行带轮次检查的落子。
pub struct RuleEngine;

impl RuleEngine {
    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_turn_owner(state: &GameState, player: Player) -> Result<(), RuleError> {
        if state.current_player != player {
            return Err(RuleError::NotPlayerTurn {
                expected: state.current_player,
                actual: player,
            });
        }
        Ok(())
    }

    pub fn play_move(
        state: &mut GameState,
        action: MoveAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let result = Self::apply_action(state, action);
        if let Err(error) = &result {
            log::warn!("rejected move {} at {}: {error}", action.player, action.index);
        }
        result
    }

    fn apply_action(
        state: &mut GameState,
        action: MoveAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }

        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, action.player)?;
        try_apply_move(&mut state.board, action.index, action.player)?;

        state.turn += 1;
        let mut events = Vec::new();
        let played = GameEvent::MovePlayed {
            player: action.player,
            index: action.index,
        };
        state.record_event(played.clone());
        events.push(played);
        log::debug!("{} played {} -> {}", action.player, action.index, state.board);

        if let Some(event) = Self::conclude(state) {
            events.push(event);
        } else {
            state.current_player = action.player.opponent();
        }

        Ok(events)
    }

    /// 对局结束时写入结果、更新比分并返回结束事件。
    fn conclude(state: &mut GameState) -> Option<GameEvent> {
        let event = match find_win(&state.board) {
            Some((winner, line)) => {
                state.outcome = GameOutcome::Win(winner);
                log::info!("{winner} wins along {line:?}");
                GameEvent::GameWon { winner, line }
            }
            None if state.board.is_full() => {
                state.outcome = GameOutcome::Draw;
                log::info!("game drawn");
                GameEvent::GameDrawn
            }
            None => return None,
        };
        state.scores.record(state.outcome);
        state.record_event(event.clone());
        Some(event)
    }

    pub fn check_outcome(state: &GameState) -> GameOutcome {
        outcome(&state.board)
    }

    pub fn reset(state: &mut GameState) -> Vec<GameEvent> {
        state.reset();
        vec![GameEvent::BoardReset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameMode;

    fn board(cells: &str) -> Board {
        cells.parse().expect("test board should parse")
    }

    #[test]
    fn win_patterns_cover_rows_columns_and_diagonals() {
        assert_eq!(WIN_PATTERNS.len(), 8);
        for row in 0..3 {
            assert!(WIN_PATTERNS.contains(&[row * 3, row * 3 + 1, row * 3 + 2]));
        }
        for col in 0..3 {
            assert!(WIN_PATTERNS.contains(&[col, col + 3, col + 6]));
        }
        assert!(WIN_PATTERNS.contains(&[0, 4, 8]));
        assert!(WIN_PATTERNS.contains(&[2, 4, 6]));
    }

    #[test]
    fn valid_moves_need_an_empty_cell_on_the_board() {
        let b = board("X________");
        assert!(!is_valid_move(&b, 0));
        assert!(is_valid_move(&b, 1));
        assert!(is_valid_move(&b, 8));
        assert!(!is_valid_move(&b, 9));
        assert!(!is_valid_move(&b, usize::MAX));
    }

    #[test]
    fn apply_move_on_occupied_cell_leaves_board_alone() {
        let mut b = board("X___O____");
        let before = b;
        assert!(!apply_move(&mut b, 4, Player::X));
        assert!(!apply_move(&mut b, 9, Player::X));
        assert_eq!(b, before);

        assert_eq!(
            try_apply_move(&mut b, 0, Player::O),
            Err(RuleError::CellOccupied {
                index: 0,
                owner: Player::X
            })
        );
        assert_eq!(
            try_apply_move(&mut b, 12, Player::O),
            Err(RuleError::OutOfRange { index: 12 })
        );

        assert!(apply_move(&mut b, 8, Player::X));
        assert_eq!(b[8], Cell::Mark(Player::X));
    }

    #[test]
    fn empty_cells_are_ascending() {
        assert_eq!(empty_cells(&board("X___O___X")), vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(empty_cells(&Board::new()), (0..9).collect::<Vec<_>>());
        assert!(empty_cells(&board("XOXXOXOXO")).is_empty());
    }

    #[test]
    fn winner_detection() {
        assert_eq!(check_winner(&Board::new()), None);
        assert_eq!(check_winner(&board("XXX______")), Some(Player::X));
        assert_eq!(check_winner(&board("O__O__O__")), Some(Player::O));
        assert_eq!(check_winner(&board("X___X___X")), Some(Player::X));
        assert_eq!(check_winner(&board("__O_O_O__")), Some(Player::O));
        assert_eq!(check_winner(&board("XOXXOXOXO")), None);
        assert_eq!(winning_line(&board("__O_O_O__")), Some([2, 4, 6]));
        assert_eq!(winning_line(&board("XOXXOXOXO")), None);
    }

    #[test]
    fn winner_matches_pattern_scan_on_every_board() {
        // 枚举全部 3^9 种棋盘
        for code in 0..3usize.pow(9) {
            let mut cells = [Cell::Empty; BOARD_SIZE];
            let mut rest = code;
            for cell in cells.iter_mut() {
                *cell = match rest % 3 {
                    0 => Cell::Empty,
                    1 => Cell::Mark(Player::X),
                    _ => Cell::Mark(Player::O),
                };
                rest /= 3;
            }
            let b = Board::from_cells(cells);

            let line_owners: Vec<Player> = WIN_PATTERNS
                .iter()
                .filter_map(|&[a, x, y]| {
                    let owner = b[a].mark()?;
                    (b[x] == b[a] && b[y] == b[a]).then_some(owner)
                })
                .collect();

            assert_eq!(check_winner(&b), line_owners.first().copied(), "{b}");
            assert_eq!(
                is_terminal(&b),
                check_winner(&b).is_some() || empty_cells(&b).is_empty(),
                "{b}"
            );
        }
    }

    #[test]
    fn outcomes() {
        assert_eq!(outcome(&Board::new()), GameOutcome::InProgress);
        assert_eq!(outcome(&board("XOXXOXOXO")), GameOutcome::Draw);
        assert!(is_terminal(&board("XOXXOXOXO")));
        assert_eq!(outcome(&board("OOOXX_X__")), GameOutcome::Win(Player::O));
        assert!(!is_terminal(&board("X________")));
    }

    #[test]
    fn play_move_alternates_turns() {
        let mut state = GameState::new(GameMode::Pvp);
        let events = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::X,
                index: 4,
            },
        )
        .expect("opening move should succeed");

        assert_eq!(
            events,
            vec![GameEvent::MovePlayed {
                player: Player::X,
                index: 4
            }]
        );
        assert_eq!(state.current_player, Player::O);
        assert_eq!(state.turn, 1);

        let err = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::X,
                index: 0,
            },
        )
        .expect_err("X cannot move twice");
        assert_eq!(
            err,
            RuleError::NotPlayerTurn {
                expected: Player::O,
                actual: Player::X
            }
        );

        let err = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::O,
                index: 4,
            },
        )
        .expect_err("center is taken");
        assert!(matches!(err, RuleError::CellOccupied { index: 4, .. }));
        assert_eq!(state.current_player, Player::O, "rejected moves keep the turn");
    }

    #[test]
    fn winning_move_ends_game_and_scores() {
        let mut state = GameState::new(GameMode::Pvp).with_board(board("XX_OO____"));
        let events = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::X,
                index: 2,
            },
        )
        .expect("winning move should succeed");

        assert_eq!(
            events.last(),
            Some(&GameEvent::GameWon {
                winner: Player::X,
                line: [0, 1, 2]
            })
        );
        assert_eq!(state.outcome, GameOutcome::Win(Player::X));
        assert_eq!(state.scores.x_wins, 1);
        assert_eq!(RuleEngine::check_outcome(&state), state.outcome);

        let err = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::O,
                index: 5,
            },
        )
        .expect_err("finished games accept no moves");
        assert_eq!(err, RuleError::GameFinished);
        assert_eq!(state.scores.x_wins, 1);

        let resolution = RuleResolution::new(state.clone(), events);
        assert_eq!(resolution.winning_line, Some([0, 1, 2]));
    }

    #[test]
    fn filling_the_board_draws() {
        let mut state = GameState::new(GameMode::Pvp).with_board(board("XOXXOOOX_"));
        assert_eq!(state.current_player, Player::X);
        let events = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::X,
                index: 8,
            },
        )
        .expect("last move should succeed");
        assert_eq!(events.last(), Some(&GameEvent::GameDrawn));
        assert_eq!(state.outcome, GameOutcome::Draw);
        assert_eq!(state.scores.draws, 1);

        let events = RuleEngine::reset(&mut state);
        assert_eq!(events, vec![GameEvent::BoardReset]);
        assert_eq!(state.scores.draws, 1);
        assert!(state.board.is_empty());
    }

    #[test]
    fn corrupt_state_is_rejected() {
        let mut state = GameState::default();
        state.board = board("XXX______");
        let err = RuleEngine::play_move(
            &mut state,
            MoveAction {
                player: Player::X,
                index: 5,
            },
        )
        .expect_err("state with three X and no O is corrupt");
        assert!(matches!(err, RuleError::IntegrityViolation { .. }));
    }
}
