mod common;

use common::{MemoryExecutor, blog_schema};
use ousia_soft_delete::{Config, Error, FlagEncoding, ModelOptions, Operation, SoftDelete};
use serde_json::json;

fn setup(config: Config) -> (SoftDelete, MemoryExecutor) {
    let engine = SoftDelete::new(config, blog_schema()).unwrap();
    (engine, MemoryExecutor::new())
}

// ==================== Nested writes ====================

#[tokio::test]
async fn test_to_one_update_is_refused() {
    let (engine, executor) = setup(Config::new().model("User", true));

    let err = engine
        .execute(
            &executor,
            "Post",
            Operation::Update,
            json!({
                "where": { "id": 1 },
                "data": { "author": { "update": { "email": "x" } } }
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ToOneMutation { ref model, ref path, .. } if model == "User" && path == "Post.author"
    ));
    assert_eq!(
        err.to_string(),
        "soft-delete: update of model \"User\" through \"Post.author\" found. Updates of soft deleted models through a toOne relation is not supported as it is possible to update a soft deleted record."
    );
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_to_one_update_allowed_by_config() {
    let config = Config::new().model("User", true).default_config(
        ModelOptions::new("deleted", FlagEncoding::Boolean).allow_to_one_updates(true),
    );
    let (engine, executor) = setup(config);
    let args = json!({
        "where": { "id": 1 },
        "data": { "author": { "update": { "email": "blah" } } }
    });

    engine
        .execute(&executor, "Post", Operation::Update, args.clone())
        .await
        .unwrap();

    assert_eq!(executor.single_call().args, args);
}

#[tokio::test]
async fn test_to_one_upsert_is_refused() {
    let (engine, executor) = setup(Config::new().model("User", true));

    let err = engine
        .execute(
            &executor,
            "Post",
            Operation::Update,
            json!({
                "where": { "id": 1 },
                "data": {
                    "author": {
                        "upsert": { "create": { "email": "a" }, "update": { "email": "a" } }
                    }
                }
            }),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("upsert of model \"User\" through \"Post.author\""));
}

#[tokio::test]
async fn test_to_many_update_is_untouched() {
    let (engine, executor) = setup(Config::new().model("Comment", true));
    let args = json!({
        "where": { "id": 1 },
        "data": {
            "comments": {
                "update": { "where": { "id": 2 }, "data": { "content": "content" } }
            }
        }
    });

    engine
        .execute(&executor, "Post", Operation::Update, args.clone())
        .await
        .unwrap();

    assert_eq!(executor.single_call().args, args);
}

#[tokio::test]
async fn test_nested_deletes_become_updates() {
    let (engine, executor) = setup(Config::new().model("Comment", true).model("Profile", true));

    engine
        .execute(
            &executor,
            "User",
            Operation::Update,
            json!({
                "where": { "id": 1 },
                "data": {
                    "profile": { "delete": true },
                    "comments": {
                        "delete": { "id": 7 },
                        "deleteMany": { "content": "spam" }
                    }
                }
            }),
        )
        .await
        .unwrap();

    let call = executor.single_call();
    assert_eq!(call.operation, Operation::Update);
    assert_eq!(
        call.args,
        json!({
            "where": { "id": 1 },
            "data": {
                "profile": { "update": { "deleted": true } },
                "comments": {
                    "update": { "where": { "id": 7 }, "data": { "deleted": true } },
                    "updateMany": {
                        "where": { "content": "spam", "deleted": false },
                        "data": { "deleted": true }
                    }
                }
            }
        })
    );
}

#[tokio::test]
async fn test_nested_delete_false_is_kept() {
    let (engine, executor) = setup(Config::new().model("Profile", true));
    let args = json!({
        "where": { "id": 1 },
        "data": { "profile": { "delete": false } }
    });

    engine
        .execute(&executor, "User", Operation::Update, args.clone())
        .await
        .unwrap();

    assert_eq!(executor.single_call().args, args);
}

#[tokio::test]
async fn test_deep_nested_writes_in_create() {
    let (engine, executor) = setup(Config::new().model("Comment", true));

    engine
        .execute(
            &executor,
            "User",
            Operation::Create,
            json!({
                "data": {
                    "email": "a@b.c",
                    "posts": {
                        "create": [{
                            "title": "t",
                            "comments": { "create": { "content": "first" } }
                        }],
                        "update": {
                            "where": { "id": 3 },
                            "data": { "comments": { "deleteMany": {} } }
                        }
                    }
                }
            }),
        )
        .await
        .unwrap();

    let call = executor.single_call();
    assert_eq!(
        call.args["data"]["posts"]["create"],
        json!([{ "title": "t", "comments": { "create": { "content": "first" } } }])
    );
    assert_eq!(
        call.args["data"]["posts"]["update"]["data"]["comments"],
        json!({
            "updateMany": { "where": { "deleted": false }, "data": { "deleted": true } }
        })
    );
}

// ==================== Relation filters ====================

#[tokio::test]
async fn test_every_filter_allows_deleted_rows() {
    let (engine, executor) = setup(Config::new().model("Comment", true));

    engine
        .execute(
            &executor,
            "User",
            Operation::FindMany,
            json!({ "where": { "comments": { "every": { "content": "foo" } } } }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({
            "where": {
                "comments": {
                    "every": { "OR": [{ "deleted": { "not": false } }, { "content": "foo" }] }
                }
            }
        })
    );
}

#[tokio::test]
async fn test_some_none_and_is_filters_inject_flag() {
    let (engine, executor) = setup(Config::new().model("Comment", true).model("Profile", true));

    engine
        .execute(
            &executor,
            "User",
            Operation::FindFirst,
            json!({
                "where": {
                    "comments": { "some": { "content": "a" }, "none": { "content": "b" } },
                    "profile": { "is": { "bio": "foo" } },
                    "AND": [{ "profile": { "bio": "bar" } }]
                }
            }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({
            "where": {
                "comments": {
                    "some": { "content": "a", "deleted": false },
                    "none": { "content": "b", "deleted": false }
                },
                "profile": { "is": { "bio": "foo", "deleted": false } },
                "AND": [{ "profile": { "bio": "bar", "deleted": false } }]
            }
        })
    );
}

#[tokio::test]
async fn test_filter_on_root_model_and_relation() {
    let (engine, executor) = setup(Config::new().model("User", true).model("Post", true));

    engine
        .execute(
            &executor,
            "User",
            Operation::Count,
            json!({ "where": { "posts": { "some": { "title": "t" } } } }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({
            "where": {
                "posts": { "some": { "title": "t", "deleted": false } },
                "deleted": false
            }
        })
    );
}

// ==================== Nested reads ====================

#[tokio::test]
async fn test_to_many_include_is_filtered() {
    let (engine, executor) = setup(Config::new().model("Comment", true));
    executor.respond(
        "User",
        Operation::FindMany,
        json!([{
            "id": 1,
            "comments": [
                { "id": 1, "deleted": false },
                { "id": 2, "deleted": true }
            ]
        }]),
    );

    let result = engine
        .execute(
            &executor,
            "User",
            Operation::FindMany,
            json!({ "include": { "comments": true } }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({ "include": { "comments": { "where": { "deleted": false } } } })
    );
    assert_eq!(
        result,
        json!([{ "id": 1, "comments": [{ "id": 1, "deleted": false }] }])
    );
}

#[tokio::test]
async fn test_to_one_select_flag_is_added_then_stripped() {
    let (engine, executor) = setup(Config::new().model("Profile", true));
    executor.respond(
        "User",
        Operation::FindMany,
        json!([
            { "id": 1, "profile": { "bio": "live", "deleted": false } },
            { "id": 2, "profile": { "bio": "gone", "deleted": true } },
            { "id": 3, "profile": null }
        ]),
    );

    let result = engine
        .execute(
            &executor,
            "User",
            Operation::FindMany,
            json!({ "select": { "id": true, "profile": { "select": { "bio": true } } } }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({
            "select": { "id": true, "profile": { "select": { "bio": true, "deleted": true } } }
        })
    );
    assert_eq!(
        result,
        json!([
            { "id": 1, "profile": { "bio": "live" } },
            { "id": 2, "profile": null },
            { "id": 3, "profile": null }
        ])
    );
}

#[tokio::test]
async fn test_requested_flag_is_kept_in_result() {
    let (engine, executor) = setup(Config::new().model("Profile", true));
    executor.respond(
        "User",
        Operation::FindFirst,
        json!({ "id": 1, "profile": { "bio": "live", "deleted": false } }),
    );

    let result = engine
        .execute(
            &executor,
            "User",
            Operation::FindFirst,
            json!({ "include": { "profile": { "select": { "bio": true, "deleted": true } } } }),
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({ "id": 1, "profile": { "bio": "live", "deleted": false } })
    );
}

#[tokio::test]
async fn test_whole_to_one_include_deleted_becomes_null() {
    let (engine, executor) = setup(Config::new().model("User", true));
    executor.respond(
        "Post",
        Operation::FindUnique,
        json!({ "id": 1, "author": { "id": 9, "deleted": true } }),
    );

    let result = engine
        .execute(
            &executor,
            "Post",
            Operation::FindUnique,
            json!({ "where": { "id": 1 }, "include": { "author": true } }),
        )
        .await
        .unwrap();

    // Post itself is not soft deletable
    let call = executor.single_call();
    assert_eq!(call.operation, Operation::FindUnique);
    assert_eq!(call.args["include"], json!({ "author": true }));
    assert_eq!(result, json!({ "id": 1, "author": null }));
}

#[tokio::test]
async fn test_deep_includes_are_filtered_at_every_level() {
    let (engine, executor) = setup(Config::new().model("Post", true).model("Comment", true));
    executor.respond(
        "User",
        Operation::FindFirst,
        json!({
            "id": 1,
            "posts": [
                {
                    "id": 1,
                    "deleted": false,
                    "comments": [{ "id": 1, "deleted": true }, { "id": 2, "deleted": false }]
                },
                { "id": 2, "deleted": true, "comments": [] }
            ]
        }),
    );

    let result = engine
        .execute(
            &executor,
            "User",
            Operation::FindFirst,
            json!({
                "where": { "id": 1 },
                "include": {
                    "posts": {
                        "where": { "title": { "contains": "x" } },
                        "include": { "comments": true }
                    }
                }
            }),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.single_call().args,
        json!({
            "where": { "id": 1 },
            "include": {
                "posts": {
                    "where": { "title": { "contains": "x" }, "deleted": false },
                    "include": { "comments": { "where": { "deleted": false } } }
                }
            }
        })
    );
    assert_eq!(
        result,
        json!({
            "id": 1,
            "posts": [{ "id": 1, "deleted": false, "comments": [{ "id": 2, "deleted": false }] }]
        })
    );
}

#[tokio::test]
async fn test_explicitly_requested_deleted_rows_survive() {
    let (engine, executor) = setup(Config::new().model("Comment", true));
    executor.respond(
        "User",
        Operation::FindFirst,
        json!({ "id": 1, "comments": [{ "id": 2, "deleted": true }] }),
    );

    let result = engine
        .execute(
            &executor,
            "User",
            Operation::FindFirst,
            json!({ "include": { "comments": { "where": { "deleted": true } } } }),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({ "id": 1, "comments": [{ "id": 2, "deleted": true }] }));
}
