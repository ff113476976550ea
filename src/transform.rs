//! Per-operation rewrite rules.
//!
//! Every rule is a pure function of the schema context, the model's soft
//! delete config and the incoming params. Rules never touch their input; a
//! rewrite is a new [`Params`] value.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::params::{Modifier, Operation, Params, TransformContext, Transformed};
use crate::schema::SchemaContext;

pub type TransformFn =
    fn(&SchemaContext, &ModelConfig, &Params, Option<TransformContext>) -> Result<Transformed>;

/// -----------------------------
/// Registry
/// -----------------------------

struct ModelEntry {
    config: ModelConfig,
    transforms: HashMap<Operation, TransformFn>,
}

/// Maps (model, operation) to its rewrite rule. A missing entry means the
/// call passes through untouched.
pub struct Registry {
    models: HashMap<String, ModelEntry>,
}

impl Registry {
    pub fn new(configs: BTreeMap<String, ModelConfig>) -> Self {
        let models = configs
            .into_iter()
            .map(|(model, config)| {
                let entry = ModelEntry {
                    config,
                    transforms: default_transforms(),
                };
                (model, entry)
            })
            .collect();

        Self { models }
    }

    pub fn config(&self, model: &str) -> Option<&ModelConfig> {
        self.models.get(model).map(|entry| &entry.config)
    }

    pub fn lookup(&self, model: &str, operation: Operation) -> Option<(&ModelConfig, TransformFn)> {
        let entry = self.models.get(model)?;
        let transform = entry.transforms.get(&operation)?;
        Some((&entry.config, *transform))
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

fn default_transforms() -> HashMap<Operation, TransformFn> {
    let mut transforms: HashMap<Operation, TransformFn> = HashMap::new();
    transforms.insert(Operation::Delete, transform_delete);
    transforms.insert(Operation::DeleteMany, transform_delete_many);
    transforms.insert(Operation::Update, transform_update);
    transforms.insert(Operation::UpdateMany, transform_update_many);
    transforms.insert(Operation::Upsert, transform_upsert);
    transforms.insert(Operation::FindUnique, transform_find_unique);
    transforms.insert(Operation::FindUniqueOrThrow, transform_find_unique);
    transforms.insert(Operation::FindFirst, transform_read);
    transforms.insert(Operation::FindFirstOrThrow, transform_read);
    transforms.insert(Operation::FindMany, transform_read);
    transforms.insert(Operation::Count, transform_read);
    transforms.insert(Operation::Aggregate, transform_read);
    transforms.insert(Operation::GroupBy, transform_read);
    transforms.insert(Operation::Where, transform_where);
    transforms.insert(Operation::Include, transform_include);
    transforms.insert(Operation::Select, transform_select);
    transforms
}

/// -----------------------------
/// Helpers
/// -----------------------------

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Caller supplied a value for the flag field.
fn mentions_flag(filter: &Map<String, Value>, config: &ModelConfig) -> bool {
    filter.get(&config.field).is_some_and(|v| !v.is_null())
}

/// `{ ...where, [field]: where[field] ?? live }`
fn where_with_flag(filter: Option<&Value>, config: &ModelConfig) -> Value {
    let mut filter = match filter {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    if !mentions_flag(&filter, config) {
        filter.insert(config.field.clone(), config.create_value(false));
    }
    Value::Object(filter)
}

/// Args with the flag injected into their `where`. Non-object args are
/// treated as empty.
fn args_with_flag(args: &Value, config: &ModelConfig) -> Value {
    let mut args = match args {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let filter = where_with_flag(args.get("where"), config);
    args.insert("where".to_string(), filter);
    Value::Object(args)
}

fn flag_data(config: &ModelConfig) -> Value {
    let mut data = Map::new();
    data.insert(config.field.clone(), config.create_value(true));
    Value::Object(data)
}

/// -----------------------------
/// Delete family
/// -----------------------------

pub fn transform_delete(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if params.model.is_none() {
        return Ok(Transformed::unchanged(params));
    }

    match &params.args {
        // delete: false, or nothing to delete at all
        Value::Null | Value::Bool(false) => Ok(Transformed::unchanged(params)),

        Value::Bool(true) => {
            if params.scope.is_none() {
                return Ok(Transformed::unchanged(params));
            }
            Ok(Transformed::with_context(
                params.with_operation(Operation::Update, flag_data(config)),
                TransformContext::PassUpdateThrough,
            ))
        }

        Value::Object(args) => {
            let filter = match args.get("where") {
                // root deletes need a where, let the executor reject it
                Some(Value::Null) | None if params.scope.is_none() => {
                    return Ok(Transformed::unchanged(params));
                }
                Some(filter) => filter.clone(),
                // unconditional nested delete, let the executor reject it
                None if args.is_empty() => return Ok(Transformed::unchanged(params)),
                // nested to-many deletes are keyed by the unique where itself
                None => Value::Object(args.clone()),
            };

            let mut rewritten = Map::new();
            rewritten.insert("where".to_string(), filter);
            rewritten.insert("data".to_string(), flag_data(config));

            Ok(Transformed::new(
                params.with_operation(Operation::Update, Value::Object(rewritten)),
            ))
        }

        _ => Ok(Transformed::unchanged(params)),
    }
}

pub fn transform_delete_many(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if params.model.is_none() {
        return Ok(Transformed::unchanged(params));
    }

    let mut filter = match params.args.get("where") {
        Some(Value::Object(filter)) => filter.clone(),
        Some(_) => Map::new(),
        None => match &params.args {
            Value::Object(filter) => filter.clone(),
            _ => Map::new(),
        },
    };
    // only rows that are not deleted yet
    filter.insert(config.field.clone(), config.create_value(false));

    let mut rewritten = Map::new();
    rewritten.insert("where".to_string(), Value::Object(filter));
    rewritten.insert("data".to_string(), flag_data(config));

    Ok(Transformed::new(
        params.with_operation(Operation::UpdateMany, Value::Object(rewritten)),
    ))
}

/// -----------------------------
/// Update family
/// -----------------------------

pub fn transform_update(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    prior: Option<TransformContext>,
) -> Result<Transformed> {
    let passes_through = prior == Some(TransformContext::PassUpdateThrough);

    if let Some(scope) = &params.scope {
        if !scope.relation.is_list && !config.allow_to_one_updates && !passes_through {
            return Err(Error::ToOneMutation {
                operation: Operation::Update,
                model: params.model_name().to_string(),
                path: scope.relation_path(),
            });
        }
    }

    Ok(Transformed::unchanged(params))
}

pub fn transform_update_many(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if params.args.is_null() {
        return Ok(Transformed::unchanged(params));
    }

    Ok(Transformed::new(
        params.with_args(args_with_flag(&params.args, config)),
    ))
}

pub fn transform_upsert(
    _: &SchemaContext,
    _: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if let Some(scope) = &params.scope {
        if !scope.relation.is_list {
            return Err(Error::ToOneMutation {
                operation: Operation::Upsert,
                model: params.model_name().to_string(),
                path: scope.relation_path(),
            });
        }
    }

    Ok(Transformed::unchanged(params))
}

/// -----------------------------
/// Read family
/// -----------------------------

/// `findFirst`, `findFirstOrThrow`, `findMany`, `count`, `aggregate`, `groupBy`.
pub fn transform_read(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    Ok(Transformed::new(
        params.with_args(args_with_flag(&params.args, config)),
    ))
}

/// `findUnique` / `findUniqueOrThrow` are downgraded to their `findFirst`
/// counterpart so the flag can be filtered on.
pub fn transform_find_unique(
    context: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    let model = params.model_name();

    let Some(Value::Object(filter)) = params.args.get("where") else {
        return Ok(Transformed::unchanged(params));
    };

    let has_unique_key = filter.iter().any(|(key, value)| {
        !value.is_null()
            && (context.is_unique_field(model, key) || context.is_unique_index_field(model, key))
    });
    if !has_unique_key {
        return Ok(Transformed::unchanged(params));
    }

    if !config.allow_compound_unique_index_where {
        if let Some(field) = filter
            .keys()
            .find(|key| context.is_unique_index_field(model, key))
        {
            return Err(Error::CompoundUniqueLookup {
                model: model.to_string(),
                field: field.clone(),
            });
        }
    }

    let operation = match params.operation {
        Operation::FindUniqueOrThrow => Operation::FindFirstOrThrow,
        _ => Operation::FindFirst,
    };

    Ok(Transformed::new(params.with_operation(
        operation,
        args_with_flag(&params.args, config),
    )))
}

/// Relation filters nested in a `where`. Root wheres are handled by the
/// operation that owns them.
pub fn transform_where(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    let Some(scope) = &params.scope else {
        return Ok(Transformed::unchanged(params));
    };
    let Value::Object(filter) = &params.args else {
        return Ok(Transformed::unchanged(params));
    };

    if scope.modifier == Some(Modifier::Every) && !mentions_flag(filter, config) {
        // every related row is either deleted or matches
        let mut not_live = Map::new();
        not_live.insert("not".to_string(), config.create_value(false));
        let mut deleted = Map::new();
        deleted.insert(config.field.clone(), Value::Object(not_live));

        let mut rewritten = Map::new();
        rewritten.insert(
            "OR".to_string(),
            Value::Array(vec![Value::Object(deleted), params.args.clone()]),
        );
        return Ok(Transformed::new(params.with_args(Value::Object(rewritten))));
    }

    Ok(Transformed::new(
        params.with_args(where_with_flag(Some(&params.args), config)),
    ))
}

/// To-one relations cannot be filtered with a `where`; make sure the flag is
/// selected so the result filter can drop deleted records.
fn select_flag_for_to_one(config: &ModelConfig, params: &Params) -> Transformed {
    let Some(Value::Object(select)) = params.args.get("select") else {
        return Transformed::unchanged(params);
    };
    if select.get(&config.field).is_some_and(is_truthy) {
        return Transformed::unchanged(params);
    }

    let mut select = select.clone();
    select.insert(config.field.clone(), Value::Bool(true));
    let mut args = match &params.args {
        Value::Object(args) => args.clone(),
        _ => Map::new(),
    };
    args.insert("select".to_string(), Value::Object(select));

    Transformed::with_context(
        params.with_args(Value::Object(args)),
        TransformContext::FlagFieldAdded,
    )
}

pub fn transform_include(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if params.is_to_one() {
        return Ok(select_flag_for_to_one(config, params));
    }

    Ok(Transformed::new(
        params.with_args(args_with_flag(&params.args, config)),
    ))
}

pub fn transform_select(
    _: &SchemaContext,
    config: &ModelConfig,
    params: &Params,
    _: Option<TransformContext>,
) -> Result<Transformed> {
    if params.is_to_one() {
        return Ok(select_flag_for_to_one(config, params));
    }

    Ok(Transformed::new(
        params.with_args(args_with_flag(&params.args, config)),
    ))
}
