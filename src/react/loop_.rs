//! 多轮工具调用主循环（Conversation Orchestrator）
//!
//! Streaming -> (ToolDispatch -> Streaming)* -> Finalized。
//! 每轮把最近 N 条历史与当前工具 schema 发给模型，聚合流式回复；有工具调用则经注册表路由、
//! 调用并写回结果后进入下一轮，否则以文本作为最终回复。轮数有上限，超出返回 RoundLimitExceeded。

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{ConversationMemory, Message, ToolCallRecord};
use crate::react::{aggregate, AssembledReply, ReactEvent};
use crate::tools::{ToolExecutor, ToolOutput};

/// 发往模型的历史窗口默认条数
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
/// 单次查询内默认最大轮数，防止工具调用无限往返
pub const DEFAULT_MAX_ROUNDS: usize = 20;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 同一轮内多个工具调用的执行方式；两种方式写入历史的顺序都与调用顺序一致
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 逐个调用，后一个调用能观察到前一个的副作用
    #[default]
    Sequential,
    /// 并发调用，全部完成后按原顺序写回
    Concurrent,
}

/// 编排器配置
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub history_window: usize,
    pub max_rounds: usize,
    pub dispatch: DispatchMode,
    /// 可选 system 提示；只加在出站视图前，不写入历史、不占窗口
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            max_rounds: DEFAULT_MAX_ROUNDS,
            dispatch: DispatchMode::Sequential,
            system_prompt: None,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            history_window: cfg.app.history_window,
            max_rounds: cfg.app.max_rounds,
            dispatch: cfg.tools.dispatch,
            system_prompt: cfg.app.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        }
    }
}

/// 单轮所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    Streaming,
    ToolDispatch,
    Finalized,
}

/// 编排器：持有 LLM、工具执行器（含注册表）与对话历史。
///
/// process_query 取 `&mut self`，同一历史上不会有两个并发的轮次。
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    history: ConversationMemory,
    settings: OrchestratorSettings,
    phase: RoundPhase,
}

fn send_event(tx: Option<&mpsc::UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, settings: OrchestratorSettings) -> Self {
        Self {
            llm,
            executor,
            history: ConversationMemory::new(),
            settings,
            phase: RoundPhase::Finalized,
        }
    }

    pub fn history(&self) -> &ConversationMemory {
        &self.history
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    fn enter(&mut self, phase: RoundPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "round phase");
        self.phase = phase;
    }

    /// 处理一次用户查询。
    ///
    /// 返回 `Ok(None)` 表示模型给出空回复（无文本也无工具调用），不视为错误。
    /// 出错时已写入历史的消息保持原样。
    pub async fn process_query(
        &mut self,
        query: &str,
        event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    ) -> Result<Option<String>, AgentError> {
        self.history.push(Message::user(query));

        let max_rounds = self.settings.max_rounds;
        for round in 1..=max_rounds {
            send_event(event_tx, ReactEvent::RoundStarted { round, max_rounds });
            let reply = self.stream_round(event_tx).await?;

            if !reply.tool_calls.is_empty() {
                self.dispatch_tools(reply, event_tx).await?;
                continue;
            }

            self.enter(RoundPhase::Finalized);
            if reply.is_empty() {
                tracing::warn!(round, "model returned an empty reply");
                send_event(event_tx, ReactEvent::NoAnswer);
                return Ok(None);
            }
            self.history.push(Message::assistant(reply.text.clone()));
            send_event(event_tx, ReactEvent::MessageDone);
            return Ok(Some(reply.text));
        }

        tracing::warn!(max_rounds, "round limit reached without a final answer");
        Err(AgentError::RoundLimitExceeded(max_rounds))
    }

    /// 出站消息：可选 system 提示 + 最近 N 条历史
    fn outbound_messages(&self) -> Vec<Message> {
        let window = self.history.window(self.settings.history_window);
        let mut messages = Vec::with_capacity(window.len() + 1);
        if let Some(prompt) = &self.settings.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(window);
        messages
    }

    async fn stream_round(
        &mut self,
        event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    ) -> Result<AssembledReply, AgentError> {
        self.enter(RoundPhase::Streaming);
        let messages = self.outbound_messages();
        let tools = self.executor.registry().schemas();
        tracing::debug!(
            model = self.llm.model_name(),
            messages = messages.len(),
            tools = tools.len(),
            "calling model"
        );

        let stream = self.llm.chat_stream(&messages, &tools).await?;
        aggregate(stream, |text| {
            send_event(event_tx, ReactEvent::MessageChunk { text: text.to_string() })
        })
        .await
    }

    /// 先写入携带全部调用记录的 assistant 消息，再按调用顺序写入每条 tool 结果
    async fn dispatch_tools(
        &mut self,
        reply: AssembledReply,
        event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    ) -> Result<(), AgentError> {
        self.enter(RoundPhase::ToolDispatch);
        let calls = reply.tool_calls;
        self.history
            .push(Message::assistant_tool_calls(reply.text, calls.clone()));

        match self.settings.dispatch {
            DispatchMode::Sequential => {
                for call in &calls {
                    let binding = self.executor.resolve(&call.name)?;
                    announce(event_tx, call);
                    let output = self.executor.invoke(binding, call_args(call)).await?;
                    observe(event_tx, call, &output);
                    self.history
                        .push(Message::tool_result(&call.id, &call.name, output.content));
                }
            }
            DispatchMode::Concurrent => {
                let bindings = calls
                    .iter()
                    .map(|call| self.executor.resolve(&call.name))
                    .collect::<Result<Vec<_>, _>>()?;
                calls.iter().for_each(|call| announce(event_tx, call));
                let executor = &self.executor;
                let results = join_all(
                    calls
                        .iter()
                        .zip(bindings)
                        .map(|(call, binding)| executor.invoke(binding, call_args(call))),
                )
                .await;
                for (call, result) in calls.iter().zip(results) {
                    let output = result?;
                    observe(event_tx, call, &output);
                    self.history
                        .push(Message::tool_result(&call.id, &call.name, output.content));
                }
            }
        }
        Ok(())
    }
}

fn call_args(call: &ToolCallRecord) -> Map<String, Value> {
    call.arguments.as_object().cloned().unwrap_or_default()
}

fn announce(event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>, call: &ToolCallRecord) {
    tracing::info!(tool = %call.name, id = %call.id, "calling tool");
    send_event(
        event_tx,
        ReactEvent::ToolCall {
            tool: call.name.clone(),
            args: call.arguments.clone(),
        },
    );
}

fn observe(
    event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    call: &ToolCallRecord,
    output: &ToolOutput,
) {
    if output.is_error {
        tracing::warn!(tool = %call.name, "tool reported an error result");
    }
    let preview: String = output.content.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    let preview = if output.content.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    };
    send_event(
        event_tx,
        ReactEvent::Observation {
            tool: call.name.clone(),
            preview,
        },
    );
}
