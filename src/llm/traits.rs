//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Azure / Mock）实现 LlmClient：发送历史窗口与工具 schema，返回增量片段流。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSchema;

/// LLM 调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error: {0}")]
    ApiError(String),

    /// 流已建立后中途出错
    #[error("Stream error: {0}")]
    StreamError(String),
}

/// 单个工具调用增量；index 由流上报，同一 index 的片段按到达顺序拼接
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// 一个响应片段：可同时携带文本增量与工具调用增量
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            content: None,
            tool_calls: vec![delta],
        }
    }
}

/// 片段流
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 流式对话：messages 为出站窗口（可能带 system 前缀），tools 为本轮可用工具
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChunkStream, LlmError>;

    /// 模型名（用于日志）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
