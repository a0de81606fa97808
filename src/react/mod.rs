//! 对话层：流式聚合、过程事件、多轮工具调用主循环

pub mod aggregator;
pub mod events;
pub mod loop_;

pub use aggregator::{aggregate, AssembledReply, StreamAggregator, ToolCallFragment};
pub use events::ReactEvent;
pub use loop_::{DispatchMode, Orchestrator, OrchestratorSettings, RoundPhase};
