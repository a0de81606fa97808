//! Headless Agent 运行时
//!
//! 由配置构建 LLM 客户端、连接 MCP 后端并填充注册表，再组装 Orchestrator；
//! process_message 对单条用户输入跑多轮工具调用并返回最终回复。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::mcp::{discover, register_backends, DiscoveredBackend, McpServersFile};
use crate::react::{Orchestrator, OrchestratorSettings, ReactEvent};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 运行时：编排器 + 持有中的后端连接（drop 时关闭）
pub struct Agent {
    orchestrator: Orchestrator,
    backends: Vec<DiscoveredBackend>,
}

impl Agent {
    /// 读取服务器清单并发现后端；清单缺失或无效时不带工具继续运行
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(&cfg.llm)?;
        let servers = McpServersFile::load(&cfg.mcp.servers_file).unwrap_or_else(|e| {
            tracing::warn!("{}; starting without MCP tools", e);
            McpServersFile::default()
        });
        let backends = discover(&servers).await;
        Ok(Self::assemble(cfg, llm, backends))
    }

    /// 用已发现的后端组装（发现只在启动时做一次）
    pub fn assemble(cfg: &AppConfig, llm: Arc<dyn LlmClient>, backends: Vec<DiscoveredBackend>) -> Self {
        let mut registry = ToolRegistry::with_policy(cfg.tools.conflict_policy);
        let registered = register_backends(&mut registry, &backends);
        tracing::info!(
            backends = backends.len(),
            tools = registered,
            policy = ?registry.policy(),
            "tool registry ready"
        );
        let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
        let orchestrator = Orchestrator::new(llm, executor, OrchestratorSettings::from_config(cfg));
        Self {
            orchestrator,
            backends,
        }
    }

    pub async fn process_message(
        &mut self,
        query: &str,
        event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    ) -> Result<Option<String>, AgentError> {
        self.orchestrator.process_query(query, event_tx).await
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id.as_str()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.orchestrator.executor().registry().tool_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    #[tokio::test]
    async fn test_agent_without_servers_file_uses_mock() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = LlmProvider::Mock;
        cfg.mcp.servers_file = "does-not-exist.json".into();

        let mut agent = Agent::from_config(&cfg).await.unwrap();
        assert!(agent.backend_ids().is_empty());
        assert!(agent.tool_names().is_empty());

        let answer = agent.process_message("ping", None).await.unwrap();
        assert_eq!(answer.as_deref(), Some("Echo from Mock: ping"));
        assert_eq!(agent.orchestrator().history().len(), 2);
    }
}
