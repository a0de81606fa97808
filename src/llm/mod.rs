//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Azure / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{ChunkStream, LlmClient, LlmError, StreamChunk, ToolCallDelta};

use std::sync::Arc;

use crate::config::{LlmSection, LlmProvider};
use crate::core::AgentError;

/// 根据 [llm] 配置构建客户端；缺少 API Key 时退回 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    match cfg.provider {
        LlmProvider::Mock => {
            tracing::warn!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient))
        }
        LlmProvider::OpenAi => {
            let Some(api_key) = cfg.api_key.as_deref() else {
                tracing::warn!("No API key set, using Mock LLM");
                return Ok(Arc::new(MockLlmClient));
            };
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.model);
            Ok(Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                api_key,
            )))
        }
        LlmProvider::Azure => {
            let base = cfg
                .base_url
                .as_deref()
                .ok_or_else(|| AgentError::Config("llm.base_url is required for azure".into()))?;
            let api_key = cfg
                .api_key
                .as_deref()
                .ok_or_else(|| AgentError::Config("llm.api_key is required for azure".into()))?;
            let deployment = cfg.deployment_id.as_deref().unwrap_or(&cfg.model);
            tracing::info!("Using Azure OpenAI deployment ({})", deployment);
            Ok(Arc::new(OpenAiClient::azure(
                base,
                &cfg.api_version,
                deployment,
                api_key,
            )))
        }
    }
}
