pub mod boundary;
pub mod bubbling;
pub mod execution_result;
pub mod executors;
pub mod format;
pub mod gateway;
pub mod introspection;
mod json_writer;
pub mod merge;
pub mod plan_executor;

#[cfg(test)]
mod tests;

pub use execution_result::{ExecutionResult, GraphQLError};
pub use gateway::{DebugInfo, Gateway, GatewayRequest, GatewayResponse, RoutingSnapshot};
