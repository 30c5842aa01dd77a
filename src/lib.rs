pub mod ai;
pub mod config;
pub mod game;
pub mod logging;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiAgent, AiConfig, AiDecision, AiTurn, DecisionSource, OpeningPolicy, SearchResult};
pub use config::GameConfig;
pub use game::{
    Board, Cell, GameEvent, GameMode, GameOutcome, GameState, IntegrityError, MoveAction,
    ParseError, Player, RuleEngine, RuleError, RuleResolution, Scoreboard, WinPattern, COMPUTER,
    WIN_PATTERNS,
};

use ai::minimax;
use game::rules;

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init(log::LevelFilter::Info);
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn board_from_js(board: JsValue) -> Result<Board, JsValue> {
    from_value(board).map_err(JsValue::from)
}

/// JS 侧的负数下标视为越界。
fn cell_index(index: i32) -> Option<usize> {
    usize::try_from(index).ok()
}

fn resolution_json(state: &GameState, events: Vec<GameEvent>) -> Result<String, JsValue> {
    serde_json::to_string(&RuleResolution::new(state.clone(), events)).map_err(serde_to_js_error)
}

#[derive(Serialize)]
struct MoveResponse {
    resolution: RuleResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    ai: Option<AiDecision>,
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

#[derive(Serialize)]
struct AppliedMove {
    applied: bool,
    board: Board,
}

/// 浏览器端持有的一局游戏：状态加上电脑对手。
#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
    agent: AiAgent,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => GameConfig::default(),
        };
        Ok(GameEngine::from_config(config))
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check()
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
        self.state = state;
        self.agent.take_turn(&mut self.state).map_err(to_js_error)?;
        Ok(())
    }

    pub fn board(&self) -> Result<JsValue, JsValue> {
        to_value(&self.state.board).map_err(JsValue::from)
    }

    pub fn current_player(&self) -> String {
        self.state.current_player.to_string()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn scores_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.scores).map_err(serde_to_js_error)
    }

    /// 当前玩家点击格子；人机模式下电脑随即应对。
    pub fn play(&mut self, index: u32) -> Result<String, JsValue> {
        let action = self.human_action(index as usize).map_err(to_js_error)?;
        let mut events = RuleEngine::play_move(&mut self.state, action).map_err(to_js_error)?;

        let ai = match self.agent.take_turn(&mut self.state).map_err(to_js_error)? {
            Some(turn) => {
                events.extend(turn.events);
                Some(turn.decision)
            }
            None => None,
        };

        let response = MoveResponse {
            resolution: RuleResolution::new(self.state.clone(), events),
            ai,
        };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 轮到 O 时让电脑为 O 走一步，不看模式；否则报错且不做搜索。
    pub fn ai_move(&mut self) -> Result<String, JsValue> {
        let (decision, applied) = self.computer_move().map_err(to_js_error)?;
        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 延迟 `delay_ms` 后给出电脑的选择，不修改状态。
    ///
    /// 使用引擎自身随机数状态的副本，结果与紧接着的 `ai_move` 一致。
    pub fn think_ai(&self, delay_ms: Option<u32>) -> Promise {
        let board = self.state.board;
        let mut agent = self.agent.clone();
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let decision = agent.decide_move(&board);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// "再来一局"。
    pub fn reset(&mut self) -> Result<String, JsValue> {
        let events = RuleEngine::reset(&mut self.state);
        resolution_json(&self.state, events)
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<String, JsValue> {
        let mode = GameMode::from_str(mode).map_err(serde_to_js_error)?;
        self.state.set_mode(mode);
        let events = self
            .agent
            .take_turn(&mut self.state)
            .map_err(to_js_error)?
            .map(|turn| turn.events)
            .unwrap_or_default();
        resolution_json(&self.state, events)
    }
}

impl GameEngine {
    pub fn from_config(config: GameConfig) -> Self {
        Self {
            state: GameState::new(config.mode),
            agent: AiAgent::new(config.ai),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// 人类点击对应的落子；人机模式下不能替电脑落子。
    fn human_action(&self, index: usize) -> Result<MoveAction, RuleError> {
        let player = self.state.current_player;
        if self.state.mode.computer() == Some(player) && !self.state.is_finished() {
            return Err(RuleError::NotPlayerTurn {
                expected: player,
                actual: player.opponent(),
            });
        }
        Ok(MoveAction { player, index })
    }

    fn computer_move(&mut self) -> Result<(AiDecision, Option<RuleResolution>), RuleError> {
        if self.state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if self.state.current_player != COMPUTER {
            return Err(RuleError::NotPlayerTurn {
                expected: self.state.current_player,
                actual: COMPUTER,
            });
        }

        let decision = self.agent.decide_move(&self.state.board);
        let applied = match decision.index {
            Some(index) => {
                let action = MoveAction {
                    player: COMPUTER,
                    index,
                };
                let events = RuleEngine::play_move(&mut self.state, action)?;
                Some(RuleResolution::new(self.state.clone(), events))
            }
            None => None,
        };
        Ok((decision, applied))
    }
}

/// 新建一局空白游戏状态。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(mode: Option<String>) -> Result<JsValue, JsValue> {
    let mode = match mode {
        Some(mode) => GameMode::from_str(&mode).map_err(serde_to_js_error)?,
        None => GameMode::default(),
    };
    to_value(&GameState::new(mode)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[wasm_bindgen(js_name = "isValidMove")]
pub fn is_valid_move(board: JsValue, index: i32) -> Result<bool, JsValue> {
    let board = board_from_js(board)?;
    Ok(cell_index(index).is_some_and(|index| rules::is_valid_move(&board, index)))
}

/// JS 数组无法原地修改，因此返回 `{ applied, board }`。
#[wasm_bindgen(js_name = "applyMove")]
pub fn apply_move(board: JsValue, index: i32, player: &str) -> Result<JsValue, JsValue> {
    let mut board = board_from_js(board)?;
    let player = Player::from_str(player).map_err(serde_to_js_error)?;
    let applied =
        cell_index(index).is_some_and(|index| rules::apply_move(&mut board, index, player));
    to_value(&AppliedMove { applied, board }).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "emptyCells")]
pub fn empty_cells(board: JsValue) -> Result<JsValue, JsValue> {
    let board = board_from_js(board)?;
    to_value(&rules::empty_cells(&board)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "checkWinner")]
pub fn check_winner(board: JsValue) -> Result<Option<String>, JsValue> {
    let board = board_from_js(board)?;
    Ok(rules::check_winner(&board).map(|player| player.to_string()))
}

#[wasm_bindgen(js_name = "winningLine")]
pub fn winning_line(board: JsValue) -> Result<JsValue, JsValue> {
    let board = board_from_js(board)?;
    to_value(&rules::winning_line(&board)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "isTerminal")]
pub fn is_terminal(board: JsValue) -> Result<bool, JsValue> {
    let board = board_from_js(board)?;
    Ok(rules::is_terminal(&board))
}

#[wasm_bindgen(js_name = "outcome")]
pub fn outcome(board: JsValue) -> Result<JsValue, JsValue> {
    let board = board_from_js(board)?;
    to_value(&rules::outcome(&board)).map_err(JsValue::from)
}

/// 棋盘已满时返回 `undefined`。
#[wasm_bindgen(js_name = "bestMove")]
pub fn best_move(board: JsValue) -> Result<Option<u32>, JsValue> {
    let board = board_from_js(board)?;
    Ok(minimax::best_move(&board).and_then(|index| u32::try_from(index).ok()))
}

#[wasm_bindgen(js_name = "setLogLevel")]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    logging::set_level(level).map_err(serde_to_js_error)?;
    Ok(())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
