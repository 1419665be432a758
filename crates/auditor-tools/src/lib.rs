//! Recovery-action tool boundary: maps recommended actions to named
//! tool calls, invokes the (mocked) integrations, and captures every
//! outcome as data. No error escapes this boundary.

mod declarations;
mod executor;
mod invocation;

pub use declarations::tool_declarations;
pub use executor::{execute_tool, ToolOutcome};
pub use invocation::{invocation_for, tool_invocation, ToolInvocation};
