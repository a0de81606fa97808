//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）或 Azure OpenAI 部署；
//! 以流式方式请求，把每个响应块转换为 StreamChunk（文本增量 + 工具调用增量）。

use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse, FunctionCall,
    FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{ChunkStream, LlmClient, LlmError, StreamChunk, ToolCallDelta};
use crate::memory::{Message, Role, ToolCallRecord};
use crate::tools::ToolSchema;

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient<C: Config = OpenAIConfig> {
    client: Client<C>,
    model: String,
}

impl OpenAiClient<OpenAIConfig> {
    /// base_url 为空时使用官方端点；api_key 由调用方（配置层）给出
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

impl OpenAiClient<AzureConfig> {
    /// Azure OpenAI：请求体中的 model 由部署名代替
    pub fn azure(api_base: &str, api_version: &str, deployment_id: &str, api_key: &str) -> Self {
        let config = AzureConfig::new()
            .with_api_base(api_base)
            .with_api_version(api_version)
            .with_deployment_id(deployment_id)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: deployment_id.to_string(),
        }
    }
}

impl<C: Config> OpenAiClient<C> {
    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages.iter().map(to_openai_message).collect()
    }
}

fn invalid(e: impl std::fmt::Display) -> LlmError {
    LlmError::InvalidRequest(e.to_string())
}

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let msg = match m.role {
        Role::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(invalid)?,
        ),
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(invalid)?,
        ),
        Role::Assistant => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || m.tool_calls.is_empty() {
                builder.content(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                builder.tool_calls(m.tool_calls.iter().map(to_openai_tool_call).collect::<Vec<_>>());
            }
            ChatCompletionRequestMessage::Assistant(builder.build().map_err(invalid)?)
        }
        Role::Tool => {
            let tool_call_id = m
                .tool_call_id
                .clone()
                .ok_or_else(|| invalid("tool message without tool_call_id"))?;
            ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(m.content.clone())
                    .tool_call_id(tool_call_id)
                    .build()
                    .map_err(invalid)?,
            )
        }
    };
    Ok(msg)
}

/// transcript 中的参数使用流中累积的原始字符串
fn to_openai_tool_call(record: &ToolCallRecord) -> ChatCompletionMessageToolCalls {
    ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
        id: record.id.clone(),
        function: FunctionCall {
            name: record.name.clone(),
            arguments: record.raw_arguments.clone(),
        },
    })
}

fn to_openai_tool(schema: &ToolSchema) -> ChatCompletionTools {
    ChatCompletionTools::Function(ChatCompletionTool {
        function: FunctionObject {
            name: schema.function.name.clone(),
            description: Some(schema.function.description.clone()),
            parameters: Some(schema.function.parameters.clone()),
            strict: None,
        },
    })
}

/// 只取第一个 choice（请求未设置 n）
fn to_stream_chunk(response: CreateChatCompletionStreamResponse) -> StreamChunk {
    let Some(choice) = response.choices.into_iter().next() else {
        return StreamChunk::default();
    };
    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();
    StreamChunk {
        content: choice.delta.content,
        tool_calls,
    }
}

#[async_trait]
impl<C: Config + Send + Sync + 'static> LlmClient for OpenAiClient<C> {
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChunkStream, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .stream(true);
        if !tools.is_empty() {
            args.tools(tools.iter().map(to_openai_tool).collect::<Vec<_>>());
        }
        let request = args.build().map_err(invalid)?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        Ok(Box::pin(stream.map(|item| {
            item.map(to_stream_chunk)
                .map_err(|e| LlmError::StreamError(e.to_string()))
        })))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_transcript_uses_raw_arguments() {
        let msg = Message::assistant_tool_calls(
            "",
            vec![ToolCallRecord {
                id: "call_1".into(),
                name: "getWeather".into(),
                arguments: json!({"city": "Paris"}),
                raw_arguments: r#"{"city": "Paris"}"#.into(),
            }],
        );
        let converted = to_openai_message(&msg).unwrap();
        let value = serde_json::to_value(&converted).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["id"], "call_1");
        assert_eq!(value["tool_calls"][0]["function"]["arguments"], r#"{"city": "Paris"}"#);
    }

    #[test]
    fn test_tool_message_requires_call_id() {
        let mut msg = Message::tool_result("call_1", "echo", "ok");
        assert!(to_openai_message(&msg).is_ok());
        msg.tool_call_id = None;
        assert!(matches!(to_openai_message(&msg), Err(LlmError::InvalidRequest(_))));
    }
}
