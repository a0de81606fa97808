//! 发往 LLM 的工具 schema：`{"type": "function", "function": {name, description, parameters}}`

use serde::Serialize;
use serde_json::Value;

use crate::tools::Tool;

/// function 段
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 单个工具的 schema（OpenAI tools 数组元素）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSpec,
}

impl ToolSchema {
    /// 以给定名称（注册表对外名）生成 schema
    pub fn for_tool(advertised_name: &str, tool: &Tool) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: advertised_name.to_string(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_wire_shape() {
        let tool = Tool {
            name: "getWeather".into(),
            description: "Weather by city".into(),
            input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        };
        let value = serde_json::to_value(ToolSchema::for_tool("getWeather", &tool)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "function",
                "function": {
                    "name": "getWeather",
                    "description": "Weather by city",
                    "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                }
            })
        );
    }
}
