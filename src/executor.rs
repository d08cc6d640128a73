use async_trait::async_trait;

use crate::errors::GrounderResult;
use crate::protocol::operation::GroundedOperation;

/// Status token an executor returns after performing an operation.
/// `"END"` is the only token with loop-control meaning.
pub const END_STATUS: &str = "END";

/// Executor collaborator: performs a grounded operation against the live
/// environment and reports a status token.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, op: &GroundedOperation) -> GrounderResult<String>;
}

/// Executor that only logs the operation. Useful for dry runs and for
/// wiring the loop before a real input backend exists.
pub struct LoggingExecutor;

#[async_trait]
impl Executor for LoggingExecutor {
    async fn execute(&self, op: &GroundedOperation) -> GrounderResult<String> {
        tracing::info!(name = %op.name, params = ?op.params, bbox = ?op.bbox, "dry-run execute");
        Ok("CONTINUE".to_string())
    }
}
