//! 编排器集成测试：脚本化 LLM + 内存后端，走完整的多轮工具调用流程

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use mcp_relay::llm::mock::{text_reply, tool_call_reply, ScriptedLlmClient};
    use mcp_relay::memory::Role;
    use mcp_relay::react::{DispatchMode, ReactEvent};
    use mcp_relay::tools::{ConflictPolicy, Tool, ToolExecutor, ToolOutput, ToolRegistry, ToolSession};
    use mcp_relay::{AgentError, Orchestrator, OrchestratorSettings};
    use serde_json::{json, Map, Value};
    use tokio::sync::mpsc;

    /// 有状态的计数器后端：add 修改状态，get 读取状态
    struct CounterBackend {
        id: String,
        value: AtomicI64,
    }

    impl CounterBackend {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                value: AtomicI64::new(0),
            })
        }

        fn tools() -> Vec<Tool> {
            vec![
                Tool {
                    name: "add".into(),
                    description: "Add n to the counter".into(),
                    input_schema: json!({"type": "object", "properties": {"n": {"type": "integer"}}}),
                },
                Tool {
                    name: "get".into(),
                    description: "Read the counter".into(),
                    input_schema: json!({"type": "object"}),
                },
            ]
        }
    }

    #[async_trait]
    impl ToolSession for CounterBackend {
        fn backend_id(&self) -> &str {
            &self.id
        }

        async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> Result<ToolOutput, String> {
            match tool_name {
                "add" => {
                    let n = args.get("n").and_then(Value::as_i64).ok_or("missing n")?;
                    let now = self.value.fetch_add(n, Ordering::SeqCst) + n;
                    Ok(ToolOutput::text(now.to_string()))
                }
                "get" => Ok(ToolOutput::text(self.value.load(Ordering::SeqCst).to_string())),
                other => Err(format!("no such tool: {other}")),
            }
        }
    }

    fn registry_with(policy: ConflictPolicy, backends: &[Arc<CounterBackend>]) -> ToolRegistry {
        let mut registry = ToolRegistry::with_policy(policy);
        for backend in backends {
            for tool in CounterBackend::tools() {
                registry.register(tool, backend.clone()).unwrap();
            }
        }
        registry
    }

    #[tokio::test]
    async fn test_sequential_calls_observe_earlier_side_effects() {
        let backend = CounterBackend::new("counter");
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            tool_call_reply(&[
                ("c1", "add", r#"{"n": 5}"#),
                ("c2", "add", r#"{"n": 2}"#),
                ("c3", "get", "{}"),
            ]),
            text_reply("The counter is 7."),
        ]));
        let mut orch = Orchestrator::new(
            llm.clone(),
            ToolExecutor::new(registry_with(ConflictPolicy::Reject, &[backend.clone()]), None),
            OrchestratorSettings::default(),
        );

        let answer = orch.process_query("add 5 then 2", None).await.unwrap();
        assert_eq!(answer.as_deref(), Some("The counter is 7."));

        let tool_results: Vec<&str> = orch
            .history()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tool_results, vec!["5", "7", "7"]);

        let second = &llm.requests()[1];
        let advertised: Vec<&str> = second.tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(advertised, vec!["add", "get"]);
    }

    #[tokio::test]
    async fn test_namespaced_backends_route_to_owner() {
        let left = CounterBackend::new("left");
        let right = CounterBackend::new("right");
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            tool_call_reply(&[("c1", "right__add", r#"{"n": 3}"#)]),
            text_reply("done"),
        ]));
        let mut orch = Orchestrator::new(
            llm,
            ToolExecutor::new(
                registry_with(ConflictPolicy::Namespace, &[left.clone(), right.clone()]),
                None,
            ),
            OrchestratorSettings {
                dispatch: DispatchMode::Concurrent,
                ..OrchestratorSettings::default()
            },
        );

        orch.process_query("bump right", None).await.unwrap();
        assert_eq!(left.value.load(Ordering::SeqCst), 0);
        assert_eq!(right.value.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_query_does_not_block_next_one() {
        let backend = CounterBackend::new("counter");
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            tool_call_reply(&[("c1", "multiply", r#"{"n": 2}"#)]),
            text_reply("Paris"),
        ]));
        let mut orch = Orchestrator::new(
            llm.clone(),
            ToolExecutor::new(registry_with(ConflictPolicy::Reject, &[backend]), None),
            OrchestratorSettings::default(),
        );

        let err = orch.process_query("multiply", None).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(ref n) if n == "multiply"));
        // user + 未完成的 assistant 工具调用消息
        assert_eq!(orch.history().len(), 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = orch.process_query("Capital of France?", Some(&tx)).await.unwrap();
        assert_eq!(answer.as_deref(), Some("Paris"));
        assert_eq!(orch.history().len(), 4);

        // 失败查询留下的未应答调用不会发给模型
        let retry = &llm.requests()[1];
        assert!(retry.messages.iter().all(|m| m.tool_calls.is_empty()));
        assert_eq!(retry.messages.len(), 2);

        drop(tx);
        let mut streamed = String::new();
        while let Some(ev) = rx.recv().await {
            if let ReactEvent::MessageChunk { text } = ev {
                streamed.push_str(&text);
            }
        }
        assert_eq!(streamed, "Paris");
    }
}
