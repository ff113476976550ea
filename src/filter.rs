//! Post-processing of read results: drops soft deleted records and strips
//! flag fields that were only selected to make that possible.

use serde_json::Value;

use crate::config::ModelConfig;
use crate::params::{Params, TransformContext};

/// Records that do not carry the flag field are treated as live.
pub fn is_deleted_record(record: &Value, config: &ModelConfig) -> bool {
    match record {
        Value::Object(map) => map
            .get(&config.field)
            .is_some_and(|value| config.is_deleted(value)),
        _ => false,
    }
}

/// Removes deleted records from a list, or replaces a single deleted record
/// with `null`.
pub fn filter_deleted(result: Value, config: &ModelConfig) -> Value {
    match result {
        Value::Array(records) => Value::Array(
            records
                .into_iter()
                .filter(|record| !is_deleted_record(record, config))
                .collect(),
        ),
        record if is_deleted_record(&record, config) => Value::Null,
        other => other,
    }
}

pub fn strip_flag_field(result: &mut Value, config: &ModelConfig) {
    match result {
        Value::Array(records) => {
            for record in records {
                if let Value::Object(map) = record {
                    map.remove(&config.field);
                }
            }
        }
        Value::Object(map) => {
            map.remove(&config.field);
        }
        _ => {}
    }
}

/// A to-many read whose `where` explicitly asks for deleted rows keeps them.
pub fn should_filter(params: &Params, config: &ModelConfig) -> bool {
    if !params.is_to_many() {
        return true;
    }

    match params
        .args
        .get("where")
        .and_then(|filter| filter.get(&config.field))
    {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(value) => *value == config.create_value(false),
    }
}

/// Filters the result of one include/select position.
pub fn filter_read_result(
    config: &ModelConfig,
    result: Value,
    params: &Params,
    context: Option<TransformContext>,
) -> Value {
    if !should_filter(params, config) {
        return result;
    }

    let mut filtered = filter_deleted(result, config);
    if context == Some(TransformContext::FlagFieldAdded) {
        strip_flag_field(&mut filtered, config);
    }
    filtered
}
