#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ousia_soft_delete::{Error, Executor, FieldMeta, ModelMeta, Operation, Schema};
use serde_json::Value;

/// One executed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub model: String,
    pub operation: Operation,
    pub args: Value,
}

/// Records every executed call and answers with canned results.
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    calls: Arc<Mutex<Vec<Call>>>,
    responses: Arc<Mutex<HashMap<(String, Operation), Value>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, model: &str, operation: Operation, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert((model.to_string(), operation), result);
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn single_call(&self) -> Call {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one call, got {:?}", calls);
        calls.into_iter().next().unwrap()
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&self, model: &str, operation: Operation, args: Value) -> Result<Value, Error> {
        self.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            operation,
            args,
        });

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Executor(message));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&(model.to_string(), operation))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// User / Post / Comment / Profile, the usual blog schema.
pub fn blog_schema() -> Schema {
    Schema::new(vec![
        ModelMeta::new("User")
            .field(FieldMeta::scalar("id", "Int").id())
            .field(FieldMeta::scalar("email", "String").unique())
            .field(FieldMeta::scalar("name", "String"))
            .field(FieldMeta::scalar("deleted", "Boolean"))
            .field(FieldMeta::scalar("profileId", "Int"))
            .field(FieldMeta::relation("posts", "Post", true))
            .field(FieldMeta::relation("comments", "Comment", true))
            .field(FieldMeta::relation("profile", "Profile", false))
            .unique_together(["email", "name"]),
        ModelMeta::new("Post")
            .field(FieldMeta::scalar("id", "Int").id())
            .field(FieldMeta::scalar("title", "String"))
            .field(FieldMeta::scalar("deleted", "Boolean"))
            .field(FieldMeta::scalar("authorId", "Int"))
            .field(FieldMeta::relation("author", "User", false))
            .field(FieldMeta::relation("comments", "Comment", true)),
        ModelMeta::new("Comment")
            .field(FieldMeta::scalar("id", "Int").id())
            .field(FieldMeta::scalar("content", "String"))
            .field(FieldMeta::scalar("deleted", "Boolean"))
            .field(FieldMeta::relation("post", "Post", false))
            .field(FieldMeta::relation("author", "User", false)),
        ModelMeta::new("Profile")
            .field(FieldMeta::scalar("id", "Int").id())
            .field(FieldMeta::scalar("bio", "String"))
            .field(FieldMeta::scalar("deleted", "Boolean"))
            .field(FieldMeta::relation("users", "User", true)),
    ])
}
