//! Command tests against the in-memory provider
//!
//! Each test drives commands through a [`Context`] the same way the binary
//! does and checks both the printed value and the provider state.

use serde_json::{json, Value};
use skyctl::commands::logs::LogsCommand;
use skyctl::commands::objects::ObjectsCommand;
use skyctl::commands::tables::TablesCommand;
use skyctl::commands::topics::{PageArgs, TopicsCommand};
use skyctl::commands::{self, Command, Context};
use skyctl::remote::memory::Op;
use skyctl::remote::{InMemoryService, ResourceRef, ResourceState};
use std::sync::Arc;

fn context() -> (Arc<InMemoryService>, Context) {
    let svc = Arc::new(InMemoryService::new());
    let ctx = Context::new(svc.clone(), "ap-southeast-1");
    (svc, ctx)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

async fn run(ctx: &Context, command: Command) -> Value {
    commands::run(ctx, &command).await.expect("command should succeed")
}

/// Test module for table commands
mod table_tests {
    use super::*;

    fn delete_item(sku: &str) -> Command {
        Command::Tables(TablesCommand::DeleteItem {
            table: "products".into(),
            category: "books".into(),
            sku: sku.into(),
        })
    }

    /// Creating twice reuses the first table
    #[tokio::test(start_paused = true)]
    async fn test_create_table_twice() {
        let (svc, ctx) = context();
        let create = || {
            Command::Tables(TablesCommand::Create {
                name: "products".into(),
                keys: strings(&["category:S", "sku:S"]),
            })
        };

        let first = run(&ctx, create()).await;
        let second = run(&ctx, create()).await;

        assert_eq!(first["created"], true);
        assert_eq!(first["attributes"]["KeySchema"][0]["AttributeName"], "category");
        assert_eq!(second["created"], false);
        assert_eq!(svc.calls(Op::Create), 1);
    }

    /// Invalid key specs fail before any call is made
    #[tokio::test]
    async fn test_create_table_rejects_bad_keys() {
        let (svc, ctx) = context();
        let command = Command::Tables(TablesCommand::Create {
            name: "products".into(),
            keys: strings(&["category"]),
        });
        assert!(commands::run(&ctx, &command).await.is_err());
        assert_eq!(svc.calls(Op::Get), 0);
    }

    /// Put, update, query and delete a single item
    #[tokio::test(start_paused = true)]
    async fn test_item_round_trip() {
        let (_svc, ctx) = context();

        let put = run(
            &ctx,
            Command::Tables(TablesCommand::Put {
                table: "products".into(),
                category: "books".into(),
                sku: "rust-101".into(),
                attributes: strings(&["price=39.5", "title=Rust"]),
            }),
        )
        .await;
        assert_eq!(put["price"], json!(39.5));
        assert_eq!(put["sku"], "rust-101");

        let updated = run(
            &ctx,
            Command::Tables(TablesCommand::Update {
                table: "products".into(),
                category: "books".into(),
                sku: "rust-101".into(),
                attributes: strings(&["price=29"]),
            }),
        )
        .await;
        assert_eq!(updated["price"], json!(29));
        assert_eq!(updated["title"], "Rust");

        let found = run(
            &ctx,
            Command::Tables(TablesCommand::Query {
                table: "products".into(),
                key_condition: "category = books".into(),
                filter: None,
            }),
        )
        .await;
        assert_eq!(found.as_array().map(Vec::len), Some(1));

        let deleted = run(&ctx, delete_item("rust-101")).await;
        assert_eq!(deleted["deleted"], true);
        let again = run(&ctx, delete_item("rust-101")).await;
        assert_eq!(again["deleted"], false);
    }

    /// Batch write keeps the last copy of a repeated key
    #[tokio::test(start_paused = true)]
    async fn test_batch_write_from_file() {
        let (svc, ctx) = context();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("items.json");
        let items: Vec<Value> = (0..30)
            .map(|i| json!({"category": "books", "sku": format!("sku-{i}"), "stock": i}))
            .chain(std::iter::once(json!({"category": "books", "sku": "sku-0", "stock": 99})))
            .collect();
        std::fs::write(&file, serde_json::to_string(&items).unwrap()).unwrap();

        let result = run(
            &ctx,
            Command::Tables(TablesCommand::BatchWrite {
                table: "products".into(),
                file,
                keys: strings(&["category", "sku"]),
            }),
        )
        .await;

        assert_eq!(result["submitted"], 30);
        assert_eq!(result["applied"], 30);
        assert_eq!(result["failed"], 0);
        assert_eq!(svc.chunk_sizes(), vec![25, 5]);

        let stored = svc.container_items(&ResourceRef::table("products"));
        let sku0 = stored.iter().find(|(_, v)| v["sku"] == "sku-0").unwrap();
        assert_eq!(sku0.1["stock"], 99);
    }

    /// Deleting a table waits for it to disappear
    #[tokio::test(start_paused = true)]
    async fn test_delete_table() {
        let (svc, ctx) = context();
        svc.insert(ResourceRef::table("products"), ResourceState::Ready, json!({}));

        let result = run(&ctx, Command::Tables(TablesCommand::Delete { name: "products".into() })).await;
        assert_eq!(result["deleted"], true);
        assert!(!svc.contains(&ResourceRef::table("products")));
    }
}

/// Test module for object store commands
mod object_tests {
    use super::*;

    /// Upload, download and clean up a bucket
    #[tokio::test(start_paused = true)]
    async fn test_bucket_object_lifecycle() {
        let (svc, ctx) = context();
        let dir = tempfile::tempdir().unwrap();

        let created = run(
            &ctx,
            Command::Objects(ObjectsCommand::CreateBucket {
                name: "photos".into(),
                location: None,
            }),
        )
        .await;
        assert_eq!(created["created"], true);

        let file = dir.path().join("cat.txt");
        std::fs::write(&file, "meow").unwrap();
        let uploaded = run(
            &ctx,
            Command::Objects(ObjectsCommand::Put {
                bucket: "photos".into(),
                file,
                key_prefix: Some("pets".into()),
            }),
        )
        .await;
        assert_eq!(uploaded["size"], 4);
        let key = uploaded["key"].as_str().unwrap().to_string();
        assert!(key.starts_with("pets"));

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let downloaded = run(
            &ctx,
            Command::Objects(ObjectsCommand::Get {
                bucket: "photos".into(),
                key: key.clone(),
                dest: Some(out.clone()),
                version_id: None,
            }),
        )
        .await;
        assert_eq!(downloaded["size"], 4);
        assert_eq!(std::fs::read_to_string(out.join("cat.txt")).unwrap(), "meow");

        let versioning = run(
            &ctx,
            Command::Objects(ObjectsCommand::EnableVersioning { bucket: "photos".into() }),
        )
        .await;
        assert_eq!(versioning["versioning"], "Enabled");

        let emptied = run(
            &ctx,
            Command::Objects(ObjectsCommand::DeleteObjects {
                bucket: "photos".into(),
                key_prefix: None,
            }),
        )
        .await;
        assert_eq!(emptied["targets"], 1);
        assert_eq!(emptied["deleted"], 1);
        assert!(!svc.contains(&ResourceRef::object("photos", &key, None)));

        let removed = run(
            &ctx,
            Command::Objects(ObjectsCommand::DeleteBuckets { name: Some("photos".into()) }),
        )
        .await;
        assert_eq!(removed["deleted"], 1);
        assert!(!svc.contains(&ResourceRef::bucket("photos")));
    }

    /// A missing bucket is reported rather than raised
    #[tokio::test(start_paused = true)]
    async fn test_get_missing_bucket() {
        let (svc, ctx) = context();

        let result = run(
            &ctx,
            Command::Objects(ObjectsCommand::GetBucket {
                name: "nope".into(),
                create: false,
            }),
        )
        .await;
        assert_eq!(result["exists"], false);
        assert_eq!(svc.calls(Op::Create), 0);

        let created = run(
            &ctx,
            Command::Objects(ObjectsCommand::GetBucket {
                name: "nope".into(),
                create: true,
            }),
        )
        .await;
        assert_eq!(created["created"], true);
        assert_eq!(
            created["attributes"]["CreateBucketConfiguration"]["LocationConstraint"],
            "ap-southeast-1"
        );
    }

    /// Deleting every bucket reports each one
    #[tokio::test(start_paused = true)]
    async fn test_delete_all_buckets() {
        let (svc, ctx) = context();
        for name in ["a", "b", "c"] {
            svc.insert(ResourceRef::bucket(name), ResourceState::Ready, json!({}));
        }

        let result = run(&ctx, Command::Objects(ObjectsCommand::DeleteBuckets { name: None })).await;
        assert_eq!(result["deleted"], 3);
        assert_eq!(result["failed"], json!([]));
    }

    /// The temp file helper writes into the chosen directory
    #[tokio::test]
    async fn test_create_tempfile_command() {
        let (_svc, ctx) = context();
        let dir = tempfile::tempdir().unwrap();

        let result = run(
            &ctx,
            Command::Objects(ObjectsCommand::CreateTempfile {
                name: Some("fill".into()),
                content: Some("x".into()),
                size: Some(10),
                dir: dir.path().to_path_buf(),
            }),
        )
        .await;
        let path = result["file"].as_str().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x".repeat(10));
    }
}

/// Test module for notification commands
mod topic_tests {
    use super::*;

    /// Create a topic, subscribe, publish and tear down
    #[tokio::test(start_paused = true)]
    async fn test_topic_flow() {
        let (svc, ctx) = context();

        let created = run(&ctx, Command::Topics(TopicsCommand::Create { name: "alerts".into() })).await;
        assert_eq!(created["created"], true);

        let subscribed = run(
            &ctx,
            Command::Topics(TopicsCommand::Subscribe {
                topic_arn: "alerts".into(),
                mobile_number: "+6500000000".into(),
            }),
        )
        .await;
        let subscription = subscribed["subscriptionArn"].as_str().unwrap().to_string();

        let listed = run(
            &ctx,
            Command::Topics(TopicsCommand::ListSubscriptions {
                topic: Some("alerts".into()),
                page: PageArgs::default(),
            }),
        )
        .await;
        assert_eq!(listed["subscriptions"][0]["subscriptionArn"], subscription.as_str());
        assert_eq!(listed["subscriptions"][0]["protocol"], "sms");
        assert!(listed["nextToken"].is_null());

        let published = run(
            &ctx,
            Command::Topics(TopicsCommand::Publish {
                topic_arn: "alerts".into(),
                message: "disk full".into(),
                subject: None,
            }),
        )
        .await;
        assert!(published["messageId"].is_string());

        run(
            &ctx,
            Command::Topics(TopicsCommand::Unsubscribe {
                subscription_arn: subscription.clone(),
            }),
        )
        .await;
        assert!(!svc.contains(&ResourceRef::Subscription { arn: subscription }));

        let deleted = run(&ctx, Command::Topics(TopicsCommand::Delete { topic_arn: "alerts".into() })).await;
        assert_eq!(deleted["deleted"], true);
    }

    /// One page at a time, or everything with --all
    #[tokio::test]
    async fn test_topic_paging() {
        let (svc, ctx) = context();
        for name in ["t1", "t2", "t3"] {
            svc.insert(ResourceRef::topic(name), ResourceState::Ready, json!({}));
        }

        let all = run(
            &ctx,
            Command::Topics(TopicsCommand::List {
                page: PageArgs {
                    next_token: None,
                    all: true,
                },
            }),
        )
        .await;
        assert_eq!(all["topics"].as_array().map(Vec::len), Some(3));

        let first = run(&ctx, Command::Topics(TopicsCommand::List { page: PageArgs::default() })).await;
        assert_eq!(first["topics"][0]["topicArn"], "t1");
    }
}

/// Test module for log commands
mod log_tests {
    use super::*;

    /// Groups are filtered by prefix
    #[tokio::test]
    async fn test_list_groups_with_prefix() {
        let (svc, ctx) = context();
        for name in ["/app/api", "/app/worker", "/infra/lb"] {
            svc.insert(
                ResourceRef::LogGroup { name: name.into() },
                ResourceState::Ready,
                json!({}),
            );
        }

        let groups = run(
            &ctx,
            Command::Logs(LogsCommand::ListGroups {
                prefix: Some("/app".into()),
            }),
        )
        .await;
        assert_eq!(
            groups,
            json!([{"logGroupName": "/app/api"}, {"logGroupName": "/app/worker"}])
        );
    }

    /// A stop time before the start time is rejected without a call
    #[tokio::test]
    async fn test_filter_events_rejects_inverted_range() {
        let (svc, ctx) = context();
        let command = Command::Logs(LogsCommand::FilterEvents {
            group: "/app/api".into(),
            pattern: "ERROR".into(),
            start: Some("2024-01-02T00:00:00Z".into()),
            stop: Some("2024-01-01T00:00:00Z".into()),
            limit: None,
        });

        assert!(commands::run(&ctx, &command).await.is_err());
        assert_eq!(svc.calls(Op::ListPage), 0);
    }
}
