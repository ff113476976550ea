use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::params::Operation;

/// -----------------------------
/// Executor contract
/// -----------------------------

/// The query executor that actually talks to storage.
///
/// Implementations run `operation` on `model` with `args` exactly as given.
/// Malformed args must surface the executor's own error; the engine never
/// validates them on its behalf.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, model: &str, operation: Operation, args: Value)
    -> Result<Value, Error>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(
        &self,
        model: &str,
        operation: Operation,
        args: Value,
    ) -> Result<Value, Error> {
        (**self).execute(model, operation, args).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    async fn execute(
        &self,
        model: &str,
        operation: Operation,
        args: Value,
    ) -> Result<Value, Error> {
        (**self).execute(model, operation, args).await
    }
}
