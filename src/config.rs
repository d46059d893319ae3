//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__BRIDGE__FLUSH_DELAY_MS=20`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::agents::{AgentDefinition, HandoffRule};

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeSection,
    pub coordinator: CoordinatorSection,
    pub tools: ToolsSection,
    /// 自定义智能体阵容；为空时使用内置阵容
    pub agents: Vec<AgentDefinition>,
    pub handoffs: Vec<HandoffRule>,
}

/// [bridge] 段：合并延迟、通道容量、worker 上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// 合并回复的静默期（毫秒）
    pub flush_delay_ms: u64,
    /// Coordinator → Coalescer 的有界通道容量
    pub emit_channel_capacity: usize,
    /// 全进程同时运行的会话 worker 上限；0 表示不限
    pub max_active_workers: usize,
}

impl BridgeSection {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            flush_delay_ms: 5000,
            emit_channel_capacity: 64,
            max_active_workers: 0,
        }
    }
}

/// [coordinator] 段：编排智能体与每轮步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub orchestrator: String,
    pub max_steps_per_turn: usize,
    /// 瞬时能力错误的重试次数
    pub capability_retries: u32,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            orchestrator: crate::agents::ORCHESTRATOR_AGENT.to_string(),
            max_steps_per_turn: 16,
            capability_retries: 1,
        }
    }
}

/// [tools] 段：工具超时与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search_top_k: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search_top_k: 5,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
