//! Discovery of relation-nested operations inside one compound call.
//!
//! The host walks a root payload with the schema at hand, hands every nested
//! operation it finds to an [`OperationHandler`] together with its [`Scope`],
//! and splices the rewritten payload back in place. Read positions
//! (`include` / `select`) are remembered as [`ResultPlan`]s so the handler can
//! filter the executor's result at the same positions afterwards.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::params::{Modifier, Operation, Params, Relation, Scope, TransformContext, Transformed};
use crate::schema::Schema;

/// Callbacks invoked once per discovered operation.
pub trait OperationHandler {
    fn transform(&self, params: &Params, prior: Option<TransformContext>) -> Result<Transformed>;

    fn filter_result(&self, result: Value, transformed: &Transformed) -> Value;
}

/// Filtering to run on a relation field of every parent record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPlan {
    pub relation: String,
    pub transformed: Transformed,
    pub children: Vec<ResultPlan>,
}

const LOGICAL_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

pub struct NestedOperations<'a, H: OperationHandler + ?Sized> {
    schema: &'a Schema,
    handler: &'a H,
}

impl<'a, H: OperationHandler + ?Sized> NestedOperations<'a, H> {
    pub fn new(schema: &'a Schema, handler: &'a H) -> Self {
        Self { schema, handler }
    }

    /// Rewrites every nested operation of an (already transformed) root call.
    pub fn rewrite(&self, root: &Params) -> Result<(Value, Vec<ResultPlan>)> {
        let Value::Object(_) = &root.args else {
            return Ok((root.args.clone(), Vec::new()));
        };

        let parent = Arc::new(root.clone());
        let mut args = self.rewrite_write_args(&parent)?;

        let mut plans = Vec::new();
        if root.operation.returns_records() {
            if let Value::Object(map) = &mut args {
                self.rewrite_reads(root.model_name(), map, &parent, &mut plans)?;
            }
        }

        Ok((args, plans))
    }

    /// Applies result plans to the executor's result, top-down.
    pub fn filter(&self, result: Value, plans: &[ResultPlan]) -> Value {
        if plans.is_empty() {
            return result;
        }

        match result {
            Value::Array(records) => Value::Array(
                records
                    .into_iter()
                    .map(|record| self.filter_record(record, plans))
                    .collect(),
            ),
            record @ Value::Object(_) => self.filter_record(record, plans),
            other => other,
        }
    }

    fn filter_record(&self, record: Value, plans: &[ResultPlan]) -> Value {
        let Value::Object(mut map) = record else {
            return record;
        };

        for plan in plans {
            if let Some(value) = map.remove(&plan.relation) {
                let value = self.handler.filter_result(value, &plan.transformed);
                let value = self.filter(value, &plan.children);
                map.insert(plan.relation.clone(), value);
            }
        }

        Value::Object(map)
    }

    /// -----------------------------
    /// Writes
    /// -----------------------------

    /// Walks the `data` payloads and `where` of a write (or any op's `where`).
    fn rewrite_write_args(&self, params: &Arc<Params>) -> Result<Value> {
        let model = params.model_name();
        let Value::Object(args) = &params.args else {
            return Ok(params.args.clone());
        };
        let mut args = args.clone();

        match params.operation {
            Operation::Create if params.scope.is_some() => {
                // nested creates carry the data itself
                return self.rewrite_data(model, &params.args, params);
            }
            Operation::Create => {
                self.rewrite_key(&mut args, "data", |data| self.rewrite_data(model, data, params))?;
            }
            Operation::Update => {
                let wrapped = params.scope.as_ref().is_none_or(|s| s.relation.is_list)
                    || args.contains_key("data");
                if !wrapped {
                    return self.rewrite_data(model, &params.args, params);
                }
                self.rewrite_key(&mut args, "data", |data| self.rewrite_data(model, data, params))?;
            }
            Operation::Upsert => {
                self.rewrite_key(&mut args, "create", |data| self.rewrite_data(model, data, params))?;
                self.rewrite_key(&mut args, "update", |data| self.rewrite_data(model, data, params))?;
            }
            Operation::ConnectOrCreate => {
                self.rewrite_key(&mut args, "create", |data| self.rewrite_data(model, data, params))?;
            }
            _ => {}
        }

        self.rewrite_key(&mut args, "where", |filter| self.rewrite_where(model, filter, params))?;

        Ok(Value::Object(args))
    }

    fn rewrite_key<F>(&self, args: &mut Map<String, Value>, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Result<Value>,
    {
        if let Some(value) = args.get(key) {
            let value = f(value)?;
            args.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn rewrite_data(&self, model: &str, data: &Value, parent: &Arc<Params>) -> Result<Value> {
        let Value::Object(data) = data else {
            return Ok(data.clone());
        };

        let mut out = Map::new();
        for (key, value) in data {
            let rewritten = match (self.relation(model, key), value) {
                (Some(relation), Value::Object(payload)) => {
                    self.rewrite_relation_writes(relation, payload, parent)?
                }
                _ => value.clone(),
            };
            out.insert(key.clone(), rewritten);
        }

        Ok(Value::Object(out))
    }

    /// One relation field of a `data` payload, e.g. `{ create: .., delete: .. }`.
    fn rewrite_relation_writes(
        &self,
        relation: Relation,
        payload: &Map<String, Value>,
        parent: &Arc<Params>,
    ) -> Result<Value> {
        // operation key -> (entries, keep as list)
        let mut grouped: Vec<(String, Vec<Value>, bool)> = Vec::new();

        for (key, value) in payload {
            let operation = match key.parse::<Operation>() {
                Ok(op) if Operation::NESTED_WRITES.contains(&op) => op,
                _ => {
                    push_entry(&mut grouped, key, value.clone(), false);
                    continue;
                }
            };

            let (items, is_list) = match value {
                Value::Array(items) if operation != Operation::CreateMany => (items.clone(), true),
                item => (vec![item.clone()], false),
            };

            if items.is_empty() {
                push_list(&mut grouped, key);
            }

            for item in items {
                let scope = Scope::new(parent.clone(), relation.clone(), None);
                let params = Params::nested(relation.model.clone(), operation, item, scope);
                let transformed = self.handler.transform(&params, None)?;

                let transformed_params = Arc::new(transformed.params);
                let args = self.rewrite_write_args(&transformed_params)?;

                push_entry(
                    &mut grouped,
                    transformed_params.operation.as_str(),
                    args,
                    is_list,
                );
            }
        }

        let mut out = Map::new();
        for (key, mut entries, is_list) in grouped {
            let value = if is_list || entries.len() > 1 {
                Value::Array(entries)
            } else {
                entries.pop().unwrap_or(Value::Null)
            };
            out.insert(key, value);
        }

        Ok(Value::Object(out))
    }

    /// -----------------------------
    /// Relation filters
    /// -----------------------------

    fn rewrite_where(&self, model: &str, filter: &Value, parent: &Arc<Params>) -> Result<Value> {
        let Value::Object(filter) = filter else {
            return Ok(filter.clone());
        };

        let mut out = Map::new();
        for (key, value) in filter {
            let rewritten = if LOGICAL_OPERATORS.contains(&key.as_str()) {
                match value {
                    Value::Array(items) => Value::Array(
                        items
                            .iter()
                            .map(|item| self.rewrite_where(model, item, parent))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    item => self.rewrite_where(model, item, parent)?,
                }
            } else if let (Some(relation), Value::Object(condition)) =
                (self.relation(model, key), value)
            {
                self.rewrite_relation_filter(relation, condition, parent)?
            } else {
                value.clone()
            };
            out.insert(key.clone(), rewritten);
        }

        Ok(Value::Object(out))
    }

    fn rewrite_relation_filter(
        &self,
        relation: Relation,
        condition: &Map<String, Value>,
        parent: &Arc<Params>,
    ) -> Result<Value> {
        let has_modifier = condition.keys().any(|key| Modifier::from_key(key).is_some());

        if !has_modifier {
            // bare to-one filter, `{ profile: { bio: "x" } }`
            if relation.is_list {
                return Ok(Value::Object(condition.clone()));
            }
            return self.rewrite_filter_operation(
                relation,
                None,
                Value::Object(condition.clone()),
                parent,
            );
        }

        let mut out = Map::new();
        for (key, value) in condition {
            let rewritten = match (Modifier::from_key(key), value) {
                (Some(modifier), Value::Object(_)) => self.rewrite_filter_operation(
                    relation.clone(),
                    Some(modifier),
                    value.clone(),
                    parent,
                )?,
                _ => value.clone(),
            };
            out.insert(key.clone(), rewritten);
        }

        Ok(Value::Object(out))
    }

    fn rewrite_filter_operation(
        &self,
        relation: Relation,
        modifier: Option<Modifier>,
        filter: Value,
        parent: &Arc<Params>,
    ) -> Result<Value> {
        let model = relation.model.clone();
        let scope = Scope::new(parent.clone(), relation, modifier);
        let params = Params::nested(model.clone(), Operation::Where, filter, scope);
        let transformed = self.handler.transform(&params, None)?;

        let transformed_params = Arc::new(transformed.params);
        self.rewrite_where(&model, &transformed_params.args, &transformed_params)
    }

    /// -----------------------------
    /// Reads
    /// -----------------------------

    fn rewrite_reads(
        &self,
        model: &str,
        args: &mut Map<String, Value>,
        parent: &Arc<Params>,
        plans: &mut Vec<ResultPlan>,
    ) -> Result<()> {
        for (key, operation) in [("include", Operation::Include), ("select", Operation::Select)] {
            let Some(Value::Object(selection)) = args.get(key) else {
                continue;
            };

            let mut out = Map::new();
            for (field, value) in selection {
                let relation = match (self.relation(model, field), value) {
                    (Some(relation), Value::Object(_) | Value::Bool(true)) => relation,
                    _ => {
                        out.insert(field.clone(), value.clone());
                        continue;
                    }
                };

                let related = relation.model.clone();
                let scope = Scope::new(parent.clone(), relation, None);
                let params = Params::nested(related.clone(), operation, value.clone(), scope);
                let transformed = self.handler.transform(&params, None)?;

                let transformed_params = Arc::new(transformed.params.clone());
                let mut children = Vec::new();
                let child_args = match &transformed_params.args {
                    Value::Object(child) => {
                        let mut child = child.clone();
                        self.rewrite_key(&mut child, "where", |filter| {
                            self.rewrite_where(&related, filter, &transformed_params)
                        })?;
                        self.rewrite_reads(&related, &mut child, &transformed_params, &mut children)?;
                        Value::Object(child)
                    }
                    other => other.clone(),
                };

                out.insert(field.clone(), child_args);
                plans.push(ResultPlan {
                    relation: field.clone(),
                    transformed,
                    children,
                });
            }

            args.insert(key.to_string(), Value::Object(out));
        }

        Ok(())
    }

    fn relation(&self, model: &str, field: &str) -> Option<Relation> {
        self.schema.relation(model, field).map(|meta| Relation {
            name: meta.name.clone(),
            model: meta.type_name.clone(),
            is_list: meta.is_list,
        })
    }
}

fn push_entry(grouped: &mut Vec<(String, Vec<Value>, bool)>, key: &str, value: Value, is_list: bool) {
    match grouped.iter_mut().find(|(k, _, _)| k == key) {
        Some((_, entries, list)) => {
            entries.push(value);
            *list |= is_list;
        }
        None => grouped.push((key.to_string(), vec![value], is_list)),
    }
}

fn push_list(grouped: &mut Vec<(String, Vec<Value>, bool)>, key: &str) {
    if !grouped.iter().any(|(k, _, _)| k == key) {
        grouped.push((key.to_string(), Vec::new(), true));
    }
}
