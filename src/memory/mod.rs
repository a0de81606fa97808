//! 记忆层：当前会话内的对话历史（进程退出即丢弃，不做持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role, ToolCallRecord, MIN_HISTORY_WINDOW};
