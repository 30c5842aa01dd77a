//! 游戏核心逻辑模块（棋盘、规则引擎等）。

pub mod rules;
pub mod state;

pub use rules::{MoveAction, RuleEngine, RuleError, RuleResolution, WinPattern, WIN_PATTERNS};
pub use state::{
    Board,
    Cell,
    GameEvent,
    GameMode,
    GameOutcome,
    GameState,
    IntegrityError,
    ParseError,
    Player,
    Scoreboard,
    BOARD_SIZE,
    BOARD_WIDTH,
    COMPUTER,
};
