//! 核心：错误类型与停止信号

pub mod error;
pub mod shutdown;

pub use error::AgentError;
pub use shutdown::{ShutdownManager, ShutdownReason};
