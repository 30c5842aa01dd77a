use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::{
    rules, Board, Cell, GameEvent, GameState, MoveAction, ParseError, Player, RuleEngine,
    RuleError, BOARD_SIZE,
};

/// 搜索中取最大值的一方，即电脑。
const MAXIMIZER: Player = Player::O;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpeningPolicy {
    /// 每一步都做完整搜索。
    #[default]
    Search,
    /// 棋盘上只有一枚棋子时随机应对，之后再搜索。
    Random,
}

impl FromStr for OpeningPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" | "minimax" | "optimal" => Ok(OpeningPolicy::Search),
            "random" => Ok(OpeningPolicy::Random),
            other => Err(ParseError::UnknownOpening(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AiConfig {
    #[serde(default)]
    pub opening: OpeningPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl AiConfig {
    pub fn with_opening(mut self, opening: OpeningPolicy) -> Self {
        self.opening = opening;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub index: usize,
    pub score: f64,
    pub nodes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Search,
    RandomOpening,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiDecision {
    pub player: Player,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    pub nodes: u64,
    pub source: DecisionSource,
}

/// 电脑走完一步后的结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiTurn {
    pub decision: AiDecision,
    pub events: Vec<GameEvent>,
}

#[derive(Default)]
struct SearchStats {
    nodes: u64,
}

/// 终局得分：O 胜 +1/depth，X 胜 -1/depth，平局 0；未终局返回 `None`。
fn terminal_score(board: &Board, depth: u32) -> Option<f64> {
    match rules::check_winner(board) {
        Some(Player::O) => Some(1.0 / f64::from(depth)),
        Some(Player::X) => Some(-1.0 / f64::from(depth)),
        None if board.is_full() => Some(0.0),
        None => None,
    }
}

/// 评估 `board`，`maximizing` 表示轮到 O。
///
/// 终局得分除以到达终局时的层数，因此更快的胜利和更慢的失败得分更高。
/// `depth` 应从 1 开始；返回前棋盘会恢复原状。
pub fn minimax(board: &mut Board, depth: u32, maximizing: bool) -> f64 {
    let mut stats = SearchStats::default();
    minimax_rec(board, depth, maximizing, &mut stats)
}

fn minimax_rec(board: &mut Board, depth: u32, maximizing: bool, stats: &mut SearchStats) -> f64 {
    stats.nodes += 1;

    if let Some(score) = terminal_score(board, depth) {
        return score;
    }

    if maximizing {
        let mut value = f64::NEG_INFINITY;
        for index in 0..BOARD_SIZE {
            if board[index].is_empty() {
                board.set(index, Cell::Mark(Player::O));
                let score = minimax_rec(board, depth + 1, false, stats);
                board.set(index, Cell::Empty);
                value = value.max(score);
            }
        }
        value
    } else {
        let mut value = f64::INFINITY;
        for index in 0..BOARD_SIZE {
            if board[index].is_empty() {
                board.set(index, Cell::Mark(Player::X));
                let score = minimax_rec(board, depth + 1, true, stats);
                board.set(index, Cell::Empty);
                value = value.min(score);
            }
        }
        value
    }
}

/// 为 O 完整搜索剩余博弈树。平分时取下标最小的格子；棋盘已满时返回 `None`。
pub fn search(board: &Board) -> Option<SearchResult> {
    let mut working = *board;
    let mut stats = SearchStats::default();
    let mut best: Option<(usize, f64)> = None;

    for index in rules::empty_cells(board) {
        working.set(index, Cell::Mark(MAXIMIZER));
        let score = minimax_rec(&mut working, 1, false, &mut stats);
        working.set(index, Cell::Empty);

        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }
    debug_assert_eq!(working, *board);

    let (index, score) = best?;
    log::trace!(
        "search on {board}: cell {index} scores {score:.4} after {} nodes",
        stats.nodes
    );
    Some(SearchResult {
        index,
        score,
        nodes: stats.nodes,
    })
}

pub fn best_move(board: &Board) -> Option<usize> {
    search(board).map(|result| result.index)
}

/// 克隆会复制随机数状态，副本给出的下一步与原对象相同。
#[derive(Clone)]
pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config: config.with_seed(seed),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn random_opening(&mut self, board: &Board) -> Option<AiDecision> {
        if self.config.opening != OpeningPolicy::Random || board.filled() != 1 {
            return None;
        }
        let index = rules::empty_cells(board).choose(&mut self.rng).copied()?;
        Some(AiDecision {
            player: MAXIMIZER,
            index: Some(index),
            evaluation: None,
            nodes: 0,
            source: DecisionSource::RandomOpening,
        })
    }

    /// 为 O 选择一步棋，不修改棋盘。
    pub fn decide_move(&mut self, board: &Board) -> AiDecision {
        let decision = self.random_opening(board).unwrap_or_else(|| {
            let result = search(board);
            AiDecision {
                player: MAXIMIZER,
                index: result.map(|r| r.index),
                evaluation: result.map(|r| r.score),
                nodes: result.map_or(0, |r| r.nodes),
                source: DecisionSource::Search,
            }
        });
        log::debug!(
            "ai picks {:?} on {board} ({:?}, {} nodes)",
            decision.index,
            decision.source,
            decision.nodes
        );
        decision
    }

    /// 人机模式下轮到电脑时替 O 落子；其余情况什么也不做。
    pub fn take_turn(&mut self, state: &mut GameState) -> Result<Option<AiTurn>, RuleError> {
        let Some(computer) = state.mode.computer() else {
            return Ok(None);
        };
        if state.is_finished() || state.current_player != computer {
            return Ok(None);
        }

        let decision = self.decide_move(&state.board);
        let events = match decision.index {
            Some(index) => RuleEngine::play_move(
                state,
                MoveAction {
                    player: computer,
                    index,
                },
            )?,
            None => Vec::new(),
        };
        Ok(Some(AiTurn { decision, events }))
    }
}

impl Default for AiAgent {
    fn default() -> Self {
        AiAgent::new(AiConfig::default())
    }
}
