use async_trait::async_trait;

use super::models::CheckResult;
use crate::store::StorageError;

/// Durable log of check results.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists one result. Called once per completed probe; a failure is
    /// logged by the engine and otherwise ignored.
    async fn log_check(&self, result: &CheckResult) -> Result<(), StorageError>;
}

/// Receives up/down transitions.
///
/// Implementations own their delivery failures: nothing is reported back to
/// the engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &str, is_up: bool, was_up: bool);
}
