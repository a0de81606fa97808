//! 对话过程事件：用于实时展示流式文本、工具调用与观察结果

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 新一轮模型调用开始（round 从 1 计数）
    RoundStarted { round: usize, max_rounds: usize },
    /// 模型文本增量
    MessageChunk { text: String },
    /// 即将调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 最终回复结束
    MessageDone,
    /// 模型给出空回复，本次查询无答案
    NoAnswer,
}
