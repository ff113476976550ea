use thiserror::Error;

use crate::params::Operation;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An update or upsert reached a soft deletable model through a singular relation.
    #[error(
        "soft-delete: {operation} of model \"{model}\" through \"{path}\" found. {operation_title}s of soft deleted models through a toOne relation is not supported as it is possible to update a soft deleted record.",
        operation_title = capitalize(.operation.as_str())
    )]
    ToOneMutation {
        operation: Operation,
        model: String,
        path: String,
    },

    /// A unique lookup keyed by a compound unique index on a soft deletable model.
    #[error(
        "soft-delete: query of model \"{model}\" through compound unique index field \"{field}\" found. Queries of soft deleted models through a unique index are not supported. Set \"allowCompoundUniqueIndexWhere\" to true to override this behaviour."
    )]
    CompoundUniqueLookup { model: String, field: String },

    #[error("soft-delete: invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation name no rule or host knows about.
    #[error("soft-delete: unknown operation \"{0}\"")]
    UnknownOperation(String),

    #[error("soft-delete: invalid schema metadata: {0}")]
    Schema(String),

    #[error("executor error: {0}")]
    Executor(String),
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
