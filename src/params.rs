use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// -----------------------------
/// Operations
/// -----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    // writes
    Create,
    CreateMany,
    ConnectOrCreate,
    Connect,
    Disconnect,
    Set,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,

    // reads
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
    Count,
    Aggregate,
    GroupBy,

    // nested only
    Where,
    Include,
    Select,
}

impl Operation {
    pub const NESTED_WRITES: &'static [Operation] = &[
        Operation::Create,
        Operation::CreateMany,
        Operation::ConnectOrCreate,
        Operation::Connect,
        Operation::Disconnect,
        Operation::Set,
        Operation::Update,
        Operation::UpdateMany,
        Operation::Upsert,
        Operation::Delete,
        Operation::DeleteMany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::CreateMany => "createMany",
            Operation::ConnectOrCreate => "connectOrCreate",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::Set => "set",
            Operation::Update => "update",
            Operation::UpdateMany => "updateMany",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::DeleteMany => "deleteMany",
            Operation::FindUnique => "findUnique",
            Operation::FindUniqueOrThrow => "findUniqueOrThrow",
            Operation::FindFirst => "findFirst",
            Operation::FindFirstOrThrow => "findFirstOrThrow",
            Operation::FindMany => "findMany",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
            Operation::GroupBy => "groupBy",
            Operation::Where => "where",
            Operation::Include => "include",
            Operation::Select => "select",
        }
    }

    /// Operations whose result is one or more records and may therefore carry
    /// `include`/`select` relation payloads.
    pub fn returns_records(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Update
                | Operation::Upsert
                | Operation::Delete
                | Operation::FindUnique
                | Operation::FindUniqueOrThrow
                | Operation::FindFirst
                | Operation::FindFirstOrThrow
                | Operation::FindMany
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "create" => Operation::Create,
            "createMany" => Operation::CreateMany,
            "connectOrCreate" => Operation::ConnectOrCreate,
            "connect" => Operation::Connect,
            "disconnect" => Operation::Disconnect,
            "set" => Operation::Set,
            "update" => Operation::Update,
            "updateMany" => Operation::UpdateMany,
            "upsert" => Operation::Upsert,
            "delete" => Operation::Delete,
            "deleteMany" => Operation::DeleteMany,
            "findUnique" => Operation::FindUnique,
            "findUniqueOrThrow" => Operation::FindUniqueOrThrow,
            "findFirst" => Operation::FindFirst,
            "findFirstOrThrow" => Operation::FindFirstOrThrow,
            "findMany" => Operation::FindMany,
            "count" => Operation::Count,
            "aggregate" => Operation::Aggregate,
            "groupBy" => Operation::GroupBy,
            "where" => Operation::Where,
            "include" => Operation::Include,
            "select" => Operation::Select,
            other => {
                return Err(Error::UnknownOperation(other.to_string()));
            }
        };
        Ok(op)
    }
}

/// List modifier of a relation filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Some,
    Every,
    None,
    Is,
    IsNot,
}

impl Modifier {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "some" => Some(Modifier::Some),
            "every" => Some(Modifier::Every),
            "none" => Some(Modifier::None),
            "is" => Some(Modifier::Is),
            "isNot" => Some(Modifier::IsNot),
            _ => None,
        }
    }
}

/// -----------------------------
/// Params & Scope
/// -----------------------------

/// The relation a nested operation was reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation field name on the parent model.
    pub name: String,
    /// Related model name.
    pub model: String,
    pub is_list: bool,
}

/// Position of a nested call inside a compound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub parent: Arc<Params>,
    pub modifier: Option<Modifier>,
    pub relation: Relation,
}

impl Scope {
    pub fn new(parent: Arc<Params>, relation: Relation, modifier: Option<Modifier>) -> Self {
        Self {
            parent,
            modifier,
            relation,
        }
    }

    /// `Parent.relation`, used when reporting unsafe relation paths.
    pub fn relation_path(&self) -> String {
        format!(
            "{}.{}",
            self.parent.model.as_deref().unwrap_or_default(),
            self.relation.name
        )
    }
}

/// One operation (root or nested) as seen by the transformer.
///
/// `args` is `Value::Null` when the caller supplied none. Params are never
/// mutated in place, every rewrite produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub model: Option<String>,
    pub operation: Operation,
    pub args: Value,
    pub scope: Option<Scope>,
}

impl Params {
    pub fn root(model: impl Into<String>, operation: Operation, args: Value) -> Self {
        Self {
            model: Some(model.into()),
            operation,
            args,
            scope: None,
        }
    }

    pub fn nested(
        model: impl Into<String>,
        operation: Operation,
        args: Value,
        scope: Scope,
    ) -> Self {
        Self {
            model: Some(model.into()),
            operation,
            args,
            scope: Some(scope),
        }
    }

    pub fn with_operation(&self, operation: Operation, args: Value) -> Self {
        Self {
            model: self.model.clone(),
            operation,
            args,
            scope: self.scope.clone(),
        }
    }

    pub fn with_args(&self, args: Value) -> Self {
        self.with_operation(self.operation, args)
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or_default()
    }

    /// Whether this call sits under a singular relation.
    pub fn is_to_one(&self) -> bool {
        self.scope.as_ref().is_some_and(|s| !s.relation.is_list)
    }

    pub fn is_to_many(&self) -> bool {
        self.scope.as_ref().is_some_and(|s| s.relation.is_list)
    }
}

/// Auxiliary signal returned alongside rewritten params. Consumed by the
/// result filter, or by the transformer of a renamed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformContext {
    /// The flag field was injected into a to-one `select` and must be
    /// stripped from the result.
    FlagFieldAdded,
    /// A boolean `delete: true` became an `update`; the to-one update guard
    /// must let it through.
    PassUpdateThrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub params: Params,
    pub context: Option<TransformContext>,
}

impl Transformed {
    pub fn unchanged(params: &Params) -> Self {
        Self {
            params: params.clone(),
            context: None,
        }
    }

    pub fn new(params: Params) -> Self {
        Self {
            params,
            context: None,
        }
    }

    pub fn with_context(params: Params, context: TransformContext) -> Self {
        Self {
            params,
            context: Some(context),
        }
    }
}
