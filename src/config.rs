//! 前端传入的对局配置。

use serde::{Deserialize, Serialize};

use crate::ai::AiConfig;
use crate::game::GameMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GameConfig {
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub ai: AiConfig,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ai(mut self, ai: AiConfig) -> Self {
        self.ai = ai;
        self
    }
}
