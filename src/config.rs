//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RELAY__*` 覆盖（双下划线表示嵌套，如 `RELAY__LLM__PROVIDER=azure`）。
//! 配置只在启动时构建一次，之后作为显式值传入 Agent / Orchestrator。

use std::path::PathBuf;

use serde::Deserialize;

use crate::memory::MIN_HISTORY_WINDOW;
use crate::react::loop_::{DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_ROUNDS};
use crate::react::DispatchMode;
use crate::tools::ConflictPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub mcp: McpSection,
}

/// [app] 段：应用名、历史窗口、最大轮数、可选 system 提示
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 发往模型的最近消息条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 单次查询内模型调用的最大轮数
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    pub system_prompt: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window: default_history_window(),
            max_rounds: default_max_rounds(),
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// 加载后的取值检查：轮数至少 1，窗口至少能容纳一条调用消息及其结果
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.app.max_rounds == 0 {
            return Err(config::ConfigError::Message(
                "app.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.app.history_window < MIN_HISTORY_WINDOW {
            return Err(config::ConfigError::Message(format!(
                "app.history_window must be at least {}",
                MIN_HISTORY_WINDOW
            )));
        }
        Ok(())
    }
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

/// LLM 后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Azure,
    Mock,
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未配置时由 load_config 从 OPENAI_API_KEY / AZURE_OPENAI_API_KEY 补齐
    pub api_key: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Azure 部署名，未设置时使用 model
    pub deployment_id: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: None,
            api_key: None,
            api_version: default_api_version(),
            deployment_id: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2024-05-01-preview".to_string()
}

/// [tools] 段：工具超时、同名冲突策略、同轮调用方式
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；不设则不限时
    pub tool_timeout_secs: Option<u64>,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub dispatch: DispatchMode,
}

/// [mcp] 段：MCP 服务器清单文件
#[derive(Debug, Clone, Deserialize)]
pub struct McpSection {
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            servers_file: default_servers_file(),
        }
    }
}

fn default_servers_file() -> PathBuf {
    PathBuf::from("mcp_server_config.json")
}

/// 从 config 目录加载配置，环境变量 RELAY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RELAY__*（双下划线表示嵌套键）
/// 4. llm.api_key 仍为空时按 provider 读取常用的 API Key 环境变量
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
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RELAY")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    if cfg.llm.api_key.is_none() {
        let var = match cfg.llm.provider {
            LlmProvider::Azure => "AZURE_OPENAI_API_KEY",
            LlmProvider::OpenAi | LlmProvider::Mock => "OPENAI_API_KEY",
        };
        cfg.llm.api_key = std::env::var(var).ok().filter(|k| !k.is_empty());
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.history_window, 20);
        assert_eq!(cfg.app.max_rounds, 20);
        assert_eq!(cfg.llm.provider, LlmProvider::OpenAi);
        assert_eq!(cfg.tools.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(cfg.tools.dispatch, DispatchMode::Sequential);
        assert!(cfg.tools.tool_timeout_secs.is_none());
        assert_eq!(cfg.mcp.servers_file, PathBuf::from("mcp_server_config.json"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
max_rounds = 5
system_prompt = "Be brief."

[llm]
provider = "azure"
model = "gpt-4o"
base_url = "https://example.openai.azure.com"
api_key = "test-key"

[tools]
tool_timeout_secs = 30
conflict_policy = "namespace"
dispatch = "concurrent"

[mcp]
servers_file = "servers.json"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.max_rounds, 5);
        assert_eq!(cfg.app.history_window, 20);
        assert_eq!(cfg.app.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(cfg.llm.provider, LlmProvider::Azure);
        assert_eq!(cfg.llm.api_key.as_deref(), Some("test-key"));
        assert_eq!(cfg.llm.api_version, "2024-05-01-preview");
        assert_eq!(cfg.tools.tool_timeout_secs, Some(30));
        assert_eq!(cfg.tools.conflict_policy, ConflictPolicy::Namespace);
        assert_eq!(cfg.tools.dispatch, DispatchMode::Concurrent);
        assert_eq!(cfg.mcp.servers_file, PathBuf::from("servers.json"));
    }

    fn write_toml(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let file = write_toml("[app]\nmax_rounds = 0\n");
        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn test_small_history_window_rejected() {
        for window in [0, 1] {
            let file = write_toml(&format!("[app]\nhistory_window = {window}\n"));
            let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
            assert!(err.to_string().contains("history_window"));
        }
        assert!(AppConfig::default().validate().is_ok());
    }
}
