use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

pub const DEFAULT_FIELD: &str = "deleted";

/// Encodes a deletion state into the value stored in the flag field.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlagEncoding {
    /// `true` when deleted, `false` otherwise.
    Boolean,
    /// Deletion time (RFC 3339, UTC) when deleted, `null` otherwise.
    Timestamp,
    /// Arbitrary values, e.g. an enum column.
    Values { deleted: Value, active: Value },
    #[serde(skip_deserializing)]
    Custom(Arc<dyn Fn(bool) -> Value + Send + Sync>),
}

impl FlagEncoding {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(bool) -> Value + Send + Sync + 'static,
    {
        FlagEncoding::Custom(Arc::new(f))
    }

    pub fn create_value(&self, deleted: bool) -> Value {
        match self {
            FlagEncoding::Boolean => Value::Bool(deleted),
            FlagEncoding::Timestamp => {
                if deleted {
                    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
                } else {
                    Value::Null
                }
            }
            FlagEncoding::Values { deleted: d, active } => {
                if deleted {
                    d.clone()
                } else {
                    active.clone()
                }
            }
            FlagEncoding::Custom(f) => f(deleted),
        }
    }

    /// Whether a stored flag value means "deleted".
    ///
    /// Compared against the live encoding, since the deleted encoding of a
    /// timestamp is different every time it is produced.
    pub fn is_deleted(&self, value: &Value) -> bool {
        match self {
            FlagEncoding::Boolean => value == &Value::Bool(true),
            FlagEncoding::Timestamp => !value.is_null(),
            FlagEncoding::Values { deleted, .. } => value == deleted,
            FlagEncoding::Custom(f) => !value.is_null() && *value != f(false),
        }
    }
}

impl fmt::Debug for FlagEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagEncoding::Boolean => write!(f, "Boolean"),
            FlagEncoding::Timestamp => write!(f, "Timestamp"),
            FlagEncoding::Values { deleted, active } => f
                .debug_struct("Values")
                .field("deleted", deleted)
                .field("active", active)
                .finish(),
            FlagEncoding::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// -----------------------------
/// Raw configuration
/// -----------------------------

/// Per-model options as supplied by the caller. Validated into a
/// [`ModelConfig`] when the engine is built.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    pub field: Option<String>,
    pub encoding: Option<FlagEncoding>,
    #[serde(default)]
    pub allow_to_one_updates: bool,
    #[serde(default)]
    pub allow_compound_unique_index_where: bool,
}

impl ModelOptions {
    pub fn new(field: impl Into<String>, encoding: FlagEncoding) -> Self {
        Self {
            field: Some(field.into()),
            encoding: Some(encoding),
            ..Default::default()
        }
    }

    pub fn allow_to_one_updates(mut self, allow: bool) -> Self {
        self.allow_to_one_updates = allow;
        self
    }

    pub fn allow_compound_unique_index_where(mut self, allow: bool) -> Self {
        self.allow_compound_unique_index_where = allow;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelSetting {
    /// `true` applies the default config, `false` leaves the model alone.
    Enabled(bool),
    Options(ModelOptions),
}

impl From<bool> for ModelSetting {
    fn from(enabled: bool) -> Self {
        ModelSetting::Enabled(enabled)
    }
}

impl From<ModelOptions> for ModelSetting {
    fn from(options: ModelOptions) -> Self {
        ModelSetting::Options(options)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub models: BTreeMap<String, ModelSetting>,
    pub default_config: Option<ModelOptions>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, name: impl Into<String>, setting: impl Into<ModelSetting>) -> Self {
        self.models.insert(name.into(), setting.into());
        self
    }

    pub fn default_config(mut self, options: ModelOptions) -> Self {
        self.default_config = Some(options);
        self
    }

    /// Validates the configuration and resolves one [`ModelConfig`] per
    /// enabled model.
    pub fn resolve(&self) -> Result<BTreeMap<String, ModelConfig>> {
        let default = match &self.default_config {
            Some(options) => ModelConfig::from_options("defaultConfig", options)?,
            None => ModelConfig::default(),
        };

        let mut resolved = BTreeMap::new();
        for (model, setting) in &self.models {
            match setting {
                ModelSetting::Enabled(false) => {}
                ModelSetting::Enabled(true) => {
                    resolved.insert(model.clone(), default.clone());
                }
                ModelSetting::Options(options) => {
                    resolved.insert(model.clone(), ModelConfig::from_options(model, options)?);
                }
            }
        }

        Ok(resolved)
    }
}

/// -----------------------------
/// Resolved configuration
/// -----------------------------

/// Soft delete settings of one model. Immutable once the engine is built.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub field: String,
    pub encoding: FlagEncoding,
    pub allow_to_one_updates: bool,
    pub allow_compound_unique_index_where: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD.to_string(),
            encoding: FlagEncoding::Boolean,
            allow_to_one_updates: false,
            allow_compound_unique_index_where: false,
        }
    }
}

impl ModelConfig {
    fn from_options(owner: &str, options: &ModelOptions) -> Result<Self> {
        let field = match options.field.as_deref() {
            Some(field) if !field.trim().is_empty() => field.to_string(),
            _ => {
                return Err(Error::InvalidConfig(format!("{}.field is required", owner)));
            }
        };
        let Some(encoding) = options.encoding.clone() else {
            return Err(Error::InvalidConfig(format!(
                "{}.encoding is required",
                owner
            )));
        };

        Ok(Self {
            field,
            encoding,
            allow_to_one_updates: options.allow_to_one_updates,
            allow_compound_unique_index_where: options.allow_compound_unique_index_where,
        })
    }

    pub fn create_value(&self, deleted: bool) -> Value {
        self.encoding.create_value(deleted)
    }

    pub fn is_deleted(&self, value: &Value) -> bool {
        self.encoding.is_deleted(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_models_use_default_config() {
        let resolved = Config::new()
            .model("User", true)
            .model("Post", false)
            .resolve()
            .unwrap();

        assert_eq!(resolved.len(), 1);
        let user = &resolved["User"];
        assert_eq!(user.field, "deleted");
        assert_eq!(user.create_value(true), json!(true));
        assert_eq!(user.create_value(false), json!(false));
        assert!(!user.allow_to_one_updates);
        assert!(!user.allow_compound_unique_index_where);
    }

    #[test]
    fn test_per_model_options_override_default() {
        let resolved = Config::new()
            .model("User", true)
            .model(
                "Comment",
                ModelOptions::new("deletedAt", FlagEncoding::Timestamp).allow_to_one_updates(true),
            )
            .resolve()
            .unwrap();

        let comment = &resolved["Comment"];
        assert_eq!(comment.field, "deletedAt");
        assert!(comment.allow_to_one_updates);
        assert_eq!(resolved["User"].field, "deleted");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let config = Config::new().default_config(ModelOptions {
            field: None,
            encoding: Some(FlagEncoding::Boolean),
            ..Default::default()
        });

        let err = config.resolve().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("defaultConfig.field is required"));
    }

    #[test]
    fn test_missing_encoding_is_rejected() {
        let config = Config::new().model(
            "User",
            ModelOptions {
                field: Some("deleted".to_string()),
                encoding: None,
                ..Default::default()
            },
        );

        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("User.encoding is required"));
    }

    #[test]
    fn test_timestamp_encoding() {
        let encoding = FlagEncoding::Timestamp;

        assert_eq!(encoding.create_value(false), Value::Null);
        let deleted = encoding.create_value(true);
        assert!(deleted.is_string());
        assert!(encoding.is_deleted(&deleted));
        assert!(encoding.is_deleted(&json!("2020-01-01T00:00:00Z")));
        assert!(!encoding.is_deleted(&Value::Null));
    }

    #[test]
    fn test_values_and_custom_encoding() {
        let values = FlagEncoding::Values {
            deleted: json!("ARCHIVED"),
            active: json!("ACTIVE"),
        };
        assert_eq!(values.create_value(true), json!("ARCHIVED"));
        assert!(values.is_deleted(&json!("ARCHIVED")));
        assert!(!values.is_deleted(&json!("ACTIVE")));

        let custom = FlagEncoding::custom(|deleted| json!(if deleted { 1 } else { 0 }));
        assert_eq!(custom.create_value(true), json!(1));
        assert!(custom.is_deleted(&json!(1)));
        assert!(!custom.is_deleted(&json!(0)));
    }

    #[test]
    fn test_deserialize_config() {
        let config: Config = serde_json::from_value(json!({
            "models": {
                "User": true,
                "Comment": {
                    "field": "status",
                    "encoding": { "type": "values", "deleted": "GONE", "active": "LIVE" },
                    "allowCompoundUniqueIndexWhere": true
                }
            },
            "defaultConfig": { "field": "deletedAt", "encoding": { "type": "timestamp" } }
        }))
        .unwrap();

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved["User"].field, "deletedAt");
        assert_eq!(resolved["Comment"].create_value(false), json!("LIVE"));
        assert!(resolved["Comment"].allow_compound_unique_index_where);
    }
}
