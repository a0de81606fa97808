//! 工具注册表（Session Registry）
//!
//! 工具名 -> 所属后端会话。纯内存结构，不做 I/O；启动发现后基本只读。
//! 同名冲突按 ConflictPolicy 处理，不再静默覆盖。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::ToolSchema;

/// 后端发现的工具描述；发现后不可变
#[derive(Clone, Debug, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 工具调用结果；content 原样作为 tool 消息正文
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }
}

/// 后端会话句柄：能以工具名 + 参数对象发起调用
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// 所属后端标识（配置中的 key）
    fn backend_id(&self) -> &str;

    async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> Result<ToolOutput, String>;
}

/// 同名冲突策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 拒绝后注册者，返回 DuplicateTool
    #[default]
    Reject,
    /// 所有工具以 `<backend>__<tool>` 对外暴露
    Namespace,
    /// 后注册者覆盖（保留原发现位置）
    Replace,
}

/// 注册表条目
#[derive(Clone)]
pub struct ToolBinding {
    pub tool: Tool,
    /// 对 LLM 暴露的名称
    pub advertised_name: String,
    /// 后端侧的工具名（调用时使用）
    pub remote_name: String,
    pub backend_id: String,
    pub session: Arc<dyn ToolSession>,
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBinding")
            .field("advertised_name", &self.advertised_name)
            .field("remote_name", &self.remote_name)
            .field("backend_id", &self.backend_id)
            .finish()
    }
}

/// 工具注册表：按发现顺序保存条目，并以名称索引
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolBinding>,
    index: HashMap<String, usize>,
    policy: ConflictPolicy,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// 注册工具，返回对外名称
    pub fn register(
        &mut self,
        tool: Tool,
        session: Arc<dyn ToolSession>,
    ) -> Result<String, AgentError> {
        let backend_id = session.backend_id().to_string();
        let advertised_name = match self.policy {
            ConflictPolicy::Namespace => namespaced(&backend_id, &tool.name),
            ConflictPolicy::Reject | ConflictPolicy::Replace => tool.name.clone(),
        };
        let binding = ToolBinding {
            remote_name: tool.name.clone(),
            advertised_name: advertised_name.clone(),
            backend_id,
            tool,
            session,
        };

        match self.index.get(&advertised_name) {
            Some(&pos) if self.policy == ConflictPolicy::Replace => {
                tracing::warn!(
                    tool = %advertised_name,
                    previous = %self.entries[pos].backend_id,
                    current = %binding.backend_id,
                    "tool re-registered, previous owner replaced"
                );
                self.entries[pos] = binding;
            }
            Some(&pos) => {
                return Err(AgentError::DuplicateTool {
                    name: advertised_name,
                    existing: self.entries[pos].backend_id.clone(),
                    incoming: binding.backend_id,
                });
            }
            None => {
                self.index.insert(advertised_name.clone(), self.entries.len());
                self.entries.push(binding);
            }
        }
        Ok(advertised_name)
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolBinding, AgentError> {
        self.index
            .get(name)
            .map(|&pos| &self.entries[pos])
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// 已发现工具的快照（发现顺序）
    pub fn list_tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|b| b.tool.clone()).collect()
    }

    /// 发往 LLM 的工具 schema 列表（使用对外名称）
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.entries
            .iter()
            .map(|b| ToolSchema::for_tool(&b.advertised_name, &b.tool))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.entries.iter().map(|b| b.advertised_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<backend>__<tool>`，后端标识中不合 function 名规则的字符替换为 `_`
fn namespaced(backend_id: &str, tool_name: &str) -> String {
    let prefix: String = backend_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("{prefix}__{tool_name}")
}
