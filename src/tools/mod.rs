pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use registry::{ConflictPolicy, Tool, ToolBinding, ToolOutput, ToolRegistry, ToolSession};
pub use schema::{FunctionSpec, ToolSchema};
