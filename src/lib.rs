//! # Ousia Soft Delete
//!
//! Transparent soft delete for a data access layer that runs named
//! operations (`create`, `findMany`, `delete`, ...) against typed models with
//! relations.
//!
//! Deletes become flag updates, and every read is rewritten so flagged rows
//! stay invisible unless the caller explicitly asks for them. The engine only
//! rewrites the *description* of a query before it runs and filters the
//! *result* afterwards; storage stays with your [`Executor`].
//!
//! ## What's inside
//!
//! ### Rewrite rules
//! One pure rule per operation kind, looked up in an explicit registry:
//! - `delete` → `update` of the flag, `deleteMany` → `updateMany`
//! - reads (`findFirst`, `findMany`, `count`, `aggregate`, `groupBy`) get the
//!   flag injected into their `where`, caller overrides win
//! - `findUnique` is downgraded to `findFirst` so it can be filtered
//! - relation filters (`some` / `none` / `every` / `is` / `isNot`) and
//!   relation includes are filtered the same way
//!
//! Unsafe shapes are refused instead of silently rewritten: updates through a
//! singular relation, and unique lookups through a compound unique index.
//!
//! ### Nested operations
//! A compound call (a create with nested writes, a find with nested
//! includes) is walked once; every nested operation is rewritten with its own
//! scope and spliced back in place.
//!
//! ### Result filtering
//! Singular relations cannot be filtered with a `where`. The flag is selected
//! instead, deleted records are replaced with `null`, and the flag is stripped
//! again when the caller never asked for it.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ousia_soft_delete::{Config, Operation, Schema, SoftDelete};
//!
//! let schema = Schema::from_json(&dmmf_json)?;
//! let engine = SoftDelete::new(Config::new().model("Comment", true), schema)?;
//!
//! // executes `update` with `{ where: { id: 5 }, data: { deleted: true } }`
//! engine
//!     .execute(&executor, "Comment", Operation::Delete, json!({ "where": { "id": 5 } }))
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod nested;
pub mod params;
pub mod schema;
pub mod transform;

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::Value;
use tracing::debug;

pub use crate::config::{Config, FlagEncoding, ModelConfig, ModelOptions, ModelSetting};
pub use crate::error::{Error, Result};
pub use crate::executor::Executor;
pub use crate::nested::{NestedOperations, OperationHandler, ResultPlan};
pub use crate::params::{
    Modifier, Operation, Params, Relation, Scope, TransformContext, Transformed,
};
pub use crate::schema::{FieldKind, FieldMeta, ModelMeta, Schema, SchemaContext};
use crate::transform::Registry;

/// A renamed operation is handed to the rule of its new name, at most this
/// many times.
const MAX_REDISPATCH: usize = 4;

/// The soft delete engine. Cheap to clone, immutable once built.
#[derive(Clone)]
pub struct SoftDelete {
    inner: Arc<Inner>,
}

struct Inner {
    schema: Schema,
    context: SchemaContext,
    registry: Registry,
}

impl SoftDelete {
    /// Validates `config` and builds the schema context. Fails with
    /// [`Error::InvalidConfig`] before any query can be transformed.
    pub fn new(config: Config, schema: Schema) -> Result<Self> {
        let configs = config.resolve()?;
        let context = SchemaContext::new(&schema);

        for model in configs.keys() {
            if schema.model(model).is_none() {
                debug!(model = %model, "soft_delete.config.unknown_model");
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                schema,
                context,
                registry: Registry::new(configs),
            }),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn context(&self) -> &SchemaContext {
        &self.inner.context
    }

    pub fn model_config(&self, model: &str) -> Option<&ModelConfig> {
        self.inner.registry.config(model)
    }

    pub fn is_soft_deletable(&self, model: &str) -> bool {
        self.model_config(model).is_some()
    }

    // ==================== Transformation ====================

    /// Rewrites one operation, root or nested.
    pub fn transform(&self, params: &Params) -> Result<Transformed> {
        self.transform_with(params, None)
    }

    /// Rewrites one operation with a context carried over from an earlier
    /// rewrite of the same call.
    pub fn transform_with(
        &self,
        params: &Params,
        prior: Option<TransformContext>,
    ) -> Result<Transformed> {
        let Some(model) = params.model.as_deref() else {
            return Ok(Transformed::unchanged(params));
        };
        let Some((config, rule)) = self.inner.registry.lookup(model, params.operation) else {
            return Ok(Transformed::unchanged(params));
        };

        let mut out = rule(&self.inner.context, config, params, prior)?;
        let mut operation = params.operation;

        // a renamed operation goes through the rule of its new name as well
        for _ in 0..MAX_REDISPATCH {
            if out.params.operation == operation {
                break;
            }
            operation = out.params.operation;
            let Some((config, rule)) = self.inner.registry.lookup(model, operation) else {
                break;
            };
            let next = rule(&self.inner.context, config, &out.params, out.context)?;
            let context = match (next.context, out.context) {
                (Some(context), _) => Some(context),
                (None, Some(TransformContext::FlagFieldAdded)) => {
                    Some(TransformContext::FlagFieldAdded)
                }
                _ => None,
            };
            out = Transformed {
                params: next.params,
                context,
            };
        }

        if out.params != *params {
            debug!(
                model = %model,
                from = %params.operation,
                to = %out.params.operation,
                nested = params.scope.is_some(),
                "soft_delete.rewrite"
            );
            counter!("soft_delete.rewrites",
                "model" => model.to_string(),
                "operation" => params.operation.as_str()
            )
            .increment(1);
        }

        Ok(out)
    }

    /// Filters the result of an operation rewritten by [`Self::transform`].
    /// Only `include` / `select` positions are filtered; other results are
    /// returned as they are.
    pub fn filter_result(&self, result: Value, transformed: &Transformed) -> Value {
        let params = &transformed.params;
        if !matches!(params.operation, Operation::Include | Operation::Select) {
            return result;
        }
        let Some(config) = params
            .model
            .as_deref()
            .and_then(|model| self.inner.registry.config(model))
        else {
            return result;
        };

        filter::filter_read_result(config, result, params, transformed.context)
    }

    // ==================== Execution ====================

    /// Runs one root operation: rewrites it and its nested operations, invokes
    /// the executor under the (possibly new) operation name, then filters the
    /// nested read results.
    pub async fn execute<E>(
        &self,
        executor: &E,
        model: &str,
        operation: Operation,
        args: Value,
    ) -> Result<Value>
    where
        E: Executor + ?Sized,
    {
        let start = Instant::now();

        let root = Params::root(model, operation, args);
        let transformed = self.transform(&root)?;

        let host = NestedOperations::new(&self.inner.schema, self);
        let (args, plans) = host.rewrite(&transformed.params)?;
        let operation = transformed.params.operation;

        let result = executor.execute(model, operation, args).await?;
        let result = host.filter(result, &plans);

        histogram!("soft_delete.execute.duration_ms",
            "model" => model.to_string(),
            "operation" => operation.as_str()
        )
        .record(start.elapsed().as_millis() as f64);

        Ok(result)
    }
}

impl OperationHandler for SoftDelete {
    fn transform(&self, params: &Params, prior: Option<TransformContext>) -> Result<Transformed> {
        self.transform_with(params, prior)
    }

    fn filter_result(&self, result: Value, transformed: &Transformed) -> Value {
        SoftDelete::filter_result(self, result, transformed)
    }
}
