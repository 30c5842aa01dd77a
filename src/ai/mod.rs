//! AI 算法模块（完整 minimax 搜索）。

pub mod minimax;

pub use minimax::{
    AiAgent, AiConfig, AiDecision, AiTurn, DecisionSource, OpeningPolicy, SearchResult,
};
