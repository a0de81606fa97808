//! 对话历史（History）
//!
//! 只追加、永不截断存储；发往 LLM 的只是最近 N 条的窗口视图，每轮重新计算。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 流结束时由累积片段生成的工具调用记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// 解析后的参数（JSON object）
    pub arguments: Value,
    /// 累积得到的原始参数串，写回 transcript 时原样使用
    pub raw_arguments: String,
}

/// 单条消息；追加后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 携带本轮全部工具调用记录的 assistant 消息
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// 工具结果消息，以 tool_call_id 关联发起调用
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 出站窗口的最小条数：一条 tool 结果至少要和它的调用消息一起发送
pub const MIN_HISTORY_WINDOW: usize = 2;

/// 只保留完整调用组：失败轮次留下的未应答调用与孤立的 tool 结果不进入出站视图
fn complete_groups(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.role == Role::Tool {
            i += 1;
            continue;
        }
        if msg.tool_calls.is_empty() {
            out.push(msg.clone());
            i += 1;
            continue;
        }

        let results_end = i + 1 + messages[i + 1..]
            .iter()
            .take_while(|m| m.role == Role::Tool)
            .count();
        let results = &messages[i + 1..results_end];
        let is_answered = |id: &str| results.iter().any(|r| r.tool_call_id.as_deref() == Some(id));
        let calls: Vec<ToolCallRecord> = msg
            .tool_calls
            .iter()
            .filter(|c| is_answered(c.id.as_str()))
            .cloned()
            .collect();

        if calls.is_empty() {
            if !msg.content.is_empty() {
                out.push(Message::assistant(msg.content.clone()));
            }
        } else {
            let kept_results: Vec<Message> = results
                .iter()
                .filter(|r| calls.iter().any(|c| r.tool_call_id.as_deref() == Some(c.id.as_str())))
                .cloned()
                .collect();
            out.push(Message {
                tool_calls: calls,
                ..msg.clone()
            });
            out.extend(kept_results);
        }
        i = results_end;
    }
    out
}

/// 对话历史：只追加的有序消息序列
#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近 `size` 条消息的出站视图（每轮重新计算，存储本身不变）。
    ///
    /// 视图只由完整的调用组构成：assistant 的 tool_calls 只保留后面紧跟了对应 tool 结果的调用，
    /// 一个都没有应答时退化为纯文本消息（无文本则丢弃）；找不到调用方的 tool 结果被丢弃。
    /// 窗口起点落在某个调用组内部时，以裁剪后的 assistant 消息作为开头。
    /// `size` 小于 [`MIN_HISTORY_WINDOW`] 时按最小值计算；历史中有 user 消息时视图非空。
    pub fn window(&self, size: usize) -> Vec<Message> {
        let size = size.max(MIN_HISTORY_WINDOW);
        let complete = complete_groups(&self.messages);
        let start = complete.len().saturating_sub(size);
        if complete.get(start).map(|m| m.role) != Some(Role::Tool) {
            return complete[start..].to_vec();
        }

        // 起点是某组的 tool 结果：让出一个位置给该组的 assistant 消息
        let tail = &complete[start + 1..];
        let owner = complete[..start].iter().rev().find(|m| m.role != Role::Tool);
        let answered_in_tail: Vec<&str> = tail
            .iter()
            .take_while(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        let mut view = Vec::with_capacity(tail.len() + 1);
        if let Some(owner) = owner {
            let calls: Vec<ToolCallRecord> = owner
                .tool_calls
                .iter()
                .filter(|c| answered_in_tail.contains(&c.id.as_str()))
                .cloned()
                .collect();
            if !calls.is_empty() {
                view.push(Message {
                    tool_calls: calls,
                    ..owner.clone()
                });
            }
        }
        if view.is_empty() {
            // 没有可用的调用方：跳过开头的 tool 结果
            view.extend(tail.iter().skip_while(|m| m.role == Role::Tool).cloned());
        } else {
            view.extend_from_slice(tail);
        }
        view
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
