//! 流式回复聚合
//!
//! 把模型的增量片段还原为完整文本与工具调用列表。工具名与参数 JSON 都是分片到达的，
//! 中间拼接结果不是合法 JSON，只能在流结束后统一解析。

use futures_util::StreamExt;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::llm::{ChunkStream, LlmError, StreamChunk, ToolCallDelta};
use crate::memory::ToolCallRecord;

/// 工具调用 index 相对已有片段数允许跳过的最大空位
const MAX_INDEX_GAP: usize = 16;

/// 单个 index 上正在拼接的工具调用
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// 聚合完成的回复
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssembledReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl AssembledReply {
    /// 文本与工具调用均为空（模型给出空回复）
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }
}

/// 片段聚合器；仅存在于一次流式响应期间
#[derive(Debug, Default)]
pub struct StreamAggregator {
    text: String,
    fragments: Vec<ToolCallFragment>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 吸收一个片段；工具调用 index 远超已有片段数时视为流错误
    pub fn push(&mut self, chunk: &StreamChunk) -> Result<(), LlmError> {
        if let Some(content) = &chunk.content {
            self.text.push_str(content);
        }
        for delta in &chunk.tool_calls {
            self.push_tool_delta(delta)?;
        }
        Ok(())
    }

    fn push_tool_delta(&mut self, delta: &ToolCallDelta) -> Result<(), LlmError> {
        let index = delta.index as usize;
        if index > self.fragments.len() + MAX_INDEX_GAP {
            return Err(LlmError::StreamError(format!(
                "tool call index {} out of range ({} calls so far)",
                index,
                self.fragments.len()
            )));
        }
        if self.fragments.len() <= index {
            // index 不保证连续，空位先用占位片段填上
            self.fragments.resize_with(index + 1, ToolCallFragment::default);
        }
        let fragment = &mut self.fragments[index];
        if fragment.id.is_none() {
            if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
                fragment.id = Some(id.to_string());
            }
        }
        if let Some(name) = &delta.name {
            fragment.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            fragment.arguments.push_str(arguments);
        }
        Ok(())
    }

    /// 流结束：丢弃没有名字的片段，按 index 顺序解析参数
    pub fn finish(self) -> Result<AssembledReply, AgentError> {
        let tool_calls = self
            .fragments
            .into_iter()
            .filter(|f| !f.name.is_empty())
            .map(finalize_fragment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AssembledReply {
            text: self.text,
            tool_calls,
        })
    }
}

fn finalize_fragment(fragment: ToolCallFragment) -> Result<ToolCallRecord, AgentError> {
    let arguments = parse_arguments(&fragment.name, &fragment.arguments)?;
    let id = fragment
        .id
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
    Ok(ToolCallRecord {
        id,
        name: fragment.name,
        arguments: Value::Object(arguments),
        raw_arguments: fragment.arguments,
    })
}

/// 参数串解析为 JSON object；空串视为无参数
pub fn parse_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let malformed = |reason: String| AgentError::MalformedToolArguments {
        tool: tool.to_string(),
        raw: raw.to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(malformed(format!("expected a JSON object, got {}", json_kind(&other)))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 驱动片段流直到结束；每个文本增量到达时回调 on_text（用于实时输出）
pub async fn aggregate<F>(mut stream: ChunkStream, mut on_text: F) -> Result<AssembledReply, AgentError>
where
    F: FnMut(&str),
{
    let mut aggregator = StreamAggregator::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
            on_text(content);
        }
        aggregator.push(&chunk)?;
    }
    aggregator.finish()
}
