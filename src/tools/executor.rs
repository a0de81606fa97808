//! 工具执行器
//!
//! 持有 ToolRegistry：resolve 按名解析，invoke 调用所属后端会话；
//! 可选超时（默认不设），失败时转为 AgentError；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolBinding, ToolOutput, ToolRegistry};

/// 工具执行器
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: Option<u64>) -> Self {
        Self {
            registry,
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 按对外名称解析；未注册返回 UnknownTool
    pub fn resolve(&self, tool_name: &str) -> Result<&ToolBinding, AgentError> {
        self.registry.resolve(tool_name)
    }

    /// 对已解析的条目发起调用；超时返回 ToolTimeout，后端报错转为 ToolExecutionFailed
    pub async fn invoke(
        &self,
        binding: &ToolBinding,
        args: Map<String, Value>,
    ) -> Result<ToolOutput, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let call = binding.session.invoke(&binding.remote_name, args);
        let result = match self.timeout {
            Some(limit) => timeout(limit, call).await.ok(),
            None => Some(call.await),
        };

        let (ok, outcome): (bool, &str) = match &result {
            Some(Ok(out)) if out.is_error => (false, "tool_error"),
            Some(Ok(_)) => (true, "ok"),
            Some(Err(_)) => (false, "error"),
            None => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": binding.advertised_name,
            "backend": binding.backend_id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(AgentError::ToolExecutionFailed {
                tool: binding.advertised_name.clone(),
                reason,
            }),
            None => Err(AgentError::ToolTimeout(binding.advertised_name.clone())),
        }
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::tools::{Tool, ToolSession};

    struct SlowSession;

    #[async_trait]
    impl ToolSession for SlowSession {
        fn backend_id(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> Result<ToolOutput, String> {
            if tool_name == "sleep" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if tool_name == "fail" {
                return Err("backend exploded".to_string());
            }
            Ok(ToolOutput::text(Value::Object(args).to_string()))
        }
    }

    fn executor(timeout_secs: Option<u64>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        let session: Arc<dyn ToolSession> = Arc::new(SlowSession);
        for name in ["sleep", "fail", "echo"] {
            registry
                .register(
                    Tool {
                        name: name.into(),
                        description: String::new(),
                        input_schema: json!({"type": "object"}),
                    },
                    session.clone(),
                )
                .unwrap();
        }
        ToolExecutor::new(registry, timeout_secs)
    }

    async fn execute(
        exec: &ToolExecutor,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<ToolOutput, AgentError> {
        let binding = exec.resolve(name)?;
        exec.invoke(binding, args).await
    }

    #[tokio::test]
    async fn test_execute_passes_arguments() {
        let exec = executor(None);
        let args = json!({"text": "hi"}).as_object().cloned().unwrap();
        let out = execute(&exec, "echo", args).await.unwrap();
        assert_eq!(out.content, r#"{"text":"hi"}"#);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let exec = executor(None);
        let err = execute(&exec, "missing", Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_execute_backend_error() {
        let exec = executor(None);
        let err = execute(&exec, "fail", Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let exec = executor(Some(1));
        let err = execute(&exec, "sleep", Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref n) if n == "sleep"));
    }
}
