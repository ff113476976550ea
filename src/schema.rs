use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;

use crate::error::{Error, Result};

/// -----------------------------
/// Schema metadata
/// -----------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Scalar,
    Object,
    Enum,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Scalar type name, or the related model for relation fields.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_id: bool,
    #[serde(default)]
    pub is_unique: bool,
}

impl FieldMeta {
    pub fn scalar(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            type_name: type_name.into(),
            is_list: false,
            is_id: false,
            is_unique: false,
        }
    }

    pub fn relation(name: impl Into<String>, model: impl Into<String>, is_list: bool) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Object,
            type_name: model.into(),
            is_list,
            is_id: false,
            is_unique: false,
        }
    }

    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn is_relation(&self) -> bool {
        self.kind == FieldKind::Object
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMeta {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
    /// Field combinations declared unique together.
    #[serde(default)]
    pub unique_fields: Vec<Vec<String>>,
}

impl ModelMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique_fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_together<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_fields
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Relation field by name, `None` for scalars and unknown fields.
    pub fn relation(&self, name: &str) -> Option<&FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.is_relation())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub models: Vec<ModelMeta>,
}

impl Schema {
    pub fn new(models: Vec<ModelMeta>) -> Self {
        Self { models }
    }

    /// Parses DMMF-shaped metadata, either `{ "models": [...] }` or the full
    /// `{ "datamodel": { "models": [...] } }` document.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))?;
        let datamodel = value.get("datamodel").cloned().unwrap_or(value);
        serde_json::from_value(datamodel).map_err(|e| Error::Schema(e.to_string()))
    }

    pub fn model(&self, name: &str) -> Option<&ModelMeta> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn relation(&self, model: &str, field: &str) -> Option<&FieldMeta> {
        self.model(model).and_then(|m| m.relation(field))
    }
}

/// -----------------------------
/// Schema context
/// -----------------------------

/// Uniqueness lookups shared by every transformer call. Built once.
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    unique_fields_by_model: HashMap<String, BTreeSet<String>>,
    unique_index_fields_by_model: HashMap<String, BTreeSet<String>>,
}

impl SchemaContext {
    pub fn new(schema: &Schema) -> Self {
        let mut unique_fields_by_model = HashMap::new();
        let mut unique_index_fields_by_model = HashMap::new();

        for model in &schema.models {
            // compound indexes are addressed by their joined field names
            let index_fields = model
                .unique_fields
                .iter()
                .map(|fields| fields.join("_"))
                .collect();
            unique_index_fields_by_model.insert(model.name.clone(), index_fields);

            let unique_fields = model
                .fields
                .iter()
                .filter(|f| f.is_id || f.is_unique)
                .map(|f| f.name.clone())
                .collect();
            unique_fields_by_model.insert(model.name.clone(), unique_fields);
        }

        Self {
            unique_fields_by_model,
            unique_index_fields_by_model,
        }
    }

    pub fn is_unique_field(&self, model: &str, field: &str) -> bool {
        self.unique_fields_by_model
            .get(model)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn is_unique_index_field(&self, model: &str, field: &str) -> bool {
        self.unique_index_fields_by_model
            .get(model)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn unique_fields(&self, model: &str) -> impl Iterator<Item = &str> {
        self.unique_fields_by_model
            .get(model)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn unique_index_fields(&self, model: &str) -> impl Iterator<Item = &str> {
        self.unique_index_fields_by_model
            .get(model)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
