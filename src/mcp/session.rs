//! MCP 会话：基于 rmcp RunningService 的 ToolSession 实现
//!
//! 负责工具描述与调用结果在 rmcp 模型与本 crate 类型之间的映射。

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, ClientInfo, Content, RawContent};
use rmcp::service::RunningService;
use rmcp::RoleClient;
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolOutput, ToolSession};

/// 已完成握手的 MCP 连接；drop 时 rmcp 会取消后台任务并关闭传输
pub struct McpSession {
    backend_id: String,
    service: RunningService<RoleClient, ClientInfo>,
}

impl McpSession {
    pub fn new(backend_id: impl Into<String>, service: RunningService<RoleClient, ClientInfo>) -> Self {
        Self {
            backend_id: backend_id.into(),
            service,
        }
    }

    /// tools/list（自动翻页）
    pub async fn list_tools(&self) -> Result<Vec<Tool>, String> {
        let tools = self
            .service
            .peer()
            .list_all_tools()
            .await
            .map_err(|e| format!("MCP tools/list failed: {e}"))?;
        Ok(tools.into_iter().map(map_tool).collect())
    }
}

#[async_trait]
impl ToolSession for McpSession {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> Result<ToolOutput, String> {
        let result = self
            .service
            .peer()
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments: Some(args),
            })
            .await
            .map_err(|e| format!("MCP tools/call failed: {e}"))?;
        Ok(map_tool_result(result))
    }
}

pub(crate) fn map_tool(tool: rmcp::model::Tool) -> Tool {
    Tool {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

/// 文本块以换行拼接；其他类型的块序列化为 JSON；都没有时退回 structured_content
pub(crate) fn map_tool_result(result: CallToolResult) -> ToolOutput {
    let parts: Vec<String> = result.content.iter().map(content_text).collect();
    let content = if parts.is_empty() {
        result
            .structured_content
            .map(|v| v.to_string())
            .unwrap_or_default()
    } else {
        parts.join("\n")
    };
    ToolOutput {
        content,
        is_error: result.is_error.unwrap_or(false),
    }
}

fn content_text(content: &Content) -> String {
    match &content.raw {
        RawContent::Text(text) => text.text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_tool() {
        let schema = json!({"type": "object", "properties": {"city": {"type": "string"}}});
        let tool = rmcp::model::Tool::new(
            "getWeather",
            "Weather by city",
            std::sync::Arc::new(schema.as_object().cloned().unwrap()),
        );
        let mapped = map_tool(tool);
        assert_eq!(mapped.name, "getWeather");
        assert_eq!(mapped.description, "Weather by city");
        assert_eq!(mapped.input_schema, schema);
    }

    #[test]
    fn test_map_tool_result_joins_text() {
        let result = CallToolResult::success(vec![Content::text("line 1"), Content::text("line 2")]);
        let out = map_tool_result(result);
        assert_eq!(out.content, "line 1\nline 2");
        assert!(!out.is_error);
    }

    #[test]
    fn test_map_tool_result_error_flag() {
        let result = CallToolResult::error(vec![Content::text("city not found")]);
        let out = map_tool_result(result);
        assert_eq!(out.content, "city not found");
        assert!(out.is_error);
    }
}
