use crate::error::executor::ExecutorError;

use serde_json::Value;

/// Host operations a connected peer may request.
pub trait HostExecutor: Send + Sync {
    /// Queue a command line for execution. Success means accepted, not finished.
    fn execute_command(&self, command: &str) -> Result<(), ExecutorError>;

    fn execute_script(&self, expression: &str) -> Result<(), ExecutorError>;

    fn get_variable(&self, name: &str) -> Result<Value, ExecutorError>;

    fn set_variable(&self, name: &str, value: &Value) -> Result<(), ExecutorError>;

    /// Reported in the handshake, if known.
    fn host_version(&self) -> Option<String> {
        None
    }

    /// Name of the document in focus, used by the test message.
    fn active_document(&self) -> Option<String> {
        None
    }
}
