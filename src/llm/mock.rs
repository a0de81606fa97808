//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：把最后一条 User 消息分段回显为文本流。
//! - ScriptedLlmClient：按顺序回放预置的片段脚本，并记录每次请求（窗口与工具列表）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChunkStream, LlmClient, LlmError, StreamChunk, ToolCallDelta};
use crate::memory::{Message, Role};
use crate::tools::ToolSchema;

/// 回显时每段字符数（模拟打字效果）
const CHUNK_CHARS: usize = 6;

/// 把文本切成若干文本片段
pub fn text_reply(text: &str) -> Vec<StreamChunk> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|c| StreamChunk::text(c.iter().collect::<String>()))
        .collect()
}

/// 构造工具调用回复：(id, name, arguments)；名称与参数都拆成两段，模拟真实分片
pub fn tool_call_reply(calls: &[(&str, &str, &str)]) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    for (index, (id, name, arguments)) in calls.iter().enumerate() {
        let index = index as u32;
        let name_cut = floor_char_boundary(name, name.len() / 2);
        let args_cut = floor_char_boundary(arguments, arguments.len() / 2);
        chunks.push(StreamChunk::tool_call(ToolCallDelta {
            index,
            id: Some(id.to_string()),
            name: Some(name[..name_cut].to_string()),
            arguments: Some(arguments[..args_cut].to_string()),
        }));
        chunks.push(StreamChunk::tool_call(ToolCallDelta {
            index,
            id: None,
            name: Some(name[name_cut..].to_string()),
            arguments: Some(arguments[args_cut..].to_string()),
        }));
    }
    chunks
}

fn floor_char_boundary(s: &str, mut at: usize) -> usize {
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn into_stream(chunks: Vec<StreamChunk>) -> ChunkStream {
    Box::pin(stream::iter(chunks.into_iter().map(Ok)))
}

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ChunkStream, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(into_stream(text_reply(&format!("Echo from Mock: {last_user}"))))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 一次模型请求的快照
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// 脚本客户端：每次请求弹出一份片段脚本；脚本用完后使用 fallback（未设置则返回空流）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Vec<StreamChunk>>>,
    fallback: Option<Vec<StreamChunk>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后每次都回放该回复
    pub fn with_fallback(mut self, reply: Vec<StreamChunk>) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChunkStream, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::ApiError(e.to_string()))?
            .pop_front();
        let chunks = next.or_else(|| self.fallback.clone()).unwrap_or_default();
        Ok(into_stream(chunks))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::aggregate;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let client = MockLlmClient;
        let messages = vec![Message::user("first"), Message::assistant("x"), Message::user("second")];
        let stream = client.chat_stream(&messages, &[]).await.unwrap();
        let reply = aggregate(stream, |_| {}).await.unwrap();
        assert_eq!(reply.text, "Echo from Mock: second");
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let client = ScriptedLlmClient::new(vec![text_reply("one"), text_reply("two")]);
        for expected in ["one", "two", ""] {
            let stream = client.chat_stream(&[Message::user("q")], &[]).await.unwrap();
            let reply = aggregate(stream, |_| {}).await.unwrap();
            assert_eq!(reply.text, expected);
        }
        assert_eq!(client.requests().len(), 3);
    }

    #[test]
    fn test_tool_call_reply_splits_fragments() {
        let chunks = tool_call_reply(&[("c1", "getWeather", r#"{"city":"Paris"}"#)]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].tool_calls[0].id, None);
    }
}
