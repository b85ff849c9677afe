//! Integration tests for the gateway provider using wiremock
//!
//! These tests verify the HTTP provider against mocked endpoints, ensuring
//! proper mapping of paths, status codes, cursors and bulk responses.

use serde_json::json;
use skyctl::remote::{
    BatchItem, BatchRequest, Collection, HttpResourceService, ListQuery, RemoteResourceService,
    ResourceRef, ResourceState,
};
use skyctl::resource::{classify, ChunkedBatch, ErrorKind, PagedLister, PollPolicy, ResourceLifecycle};
use std::num::NonZeroUsize;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGION: &str = "us-east-1";

fn service(server: &MockServer) -> HttpResourceService {
    HttpResourceService::new(&server.uri(), REGION).expect("valid endpoint")
}

fn api(path: &str) -> String {
    format!("/v1/regions/{REGION}/{path}")
}

/// Test module for single-resource calls
mod resource_call_tests {
    use super::*;

    /// Test that a wrapped table description is parsed into a state
    #[tokio::test]
    async fn test_get_parses_wrapped_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(api("tables/products")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Table": {"TableName": "products", "TableStatus": "CREATING"}
            })))
            .mount(&server)
            .await;

        let resource = service(&server)
            .get(&ResourceRef::table("products"))
            .await
            .expect("get should succeed");

        assert_eq!(resource.state, ResourceState::Creating);
        assert_eq!(resource.attributes["Table"]["TableName"], "products");
    }

    /// Test 404 with an error envelope becomes a classified NotFound
    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(api("buckets/missing")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "NoSuchBucket", "message": "The bucket does not exist"}
            })))
            .mount(&server)
            .await;

        let err = service(&server)
            .get(&ResourceRef::bucket("missing"))
            .await
            .expect_err("should fail");

        assert_eq!(err.status, Some(404));
        assert_eq!(err.code.as_deref(), Some("NoSuchBucket"));
        assert_eq!(classify(&err).kind, ErrorKind::NotFound);
    }

    /// Test 429 carries the Retry-After hint
    #[tokio::test]
    async fn test_429_carries_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(api("topics/alerts")))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "3")
                    .set_body_json(json!({"__type": "com.amazon#ThrottlingException"})),
            )
            .mount(&server)
            .await;

        let err = service(&server)
            .delete(&ResourceRef::topic("alerts"))
            .await
            .expect_err("should fail");

        let class = classify(&err);
        assert_eq!(err.code.as_deref(), Some("ThrottlingException"));
        assert_eq!(class.kind, ErrorKind::Retryable);
        assert_eq!(class.retry_after, Some(Duration::from_secs(3)));
    }

    /// Test a refused connection is a retryable transport failure
    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let svc = HttpResourceService::new("http://127.0.0.1:9", REGION).unwrap();
        let err = svc
            .get(&ResourceRef::bucket("b"))
            .await
            .expect_err("nothing listens on port 9");
        assert_eq!(err.status, None);
        assert!(classify(&err).kind.is_retryable());
    }

    /// Test upload and download use the raw content endpoint
    #[tokio::test]
    async fn test_object_content_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(api("buckets/photos/objects/cat.txt/content")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"size": 3})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(api("buckets/photos/objects/cat.txt/content")))
            .and(query_param("versionId", "v2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"meow".to_vec()))
            .mount(&server)
            .await;

        let svc = service(&server);
        let upload = skyctl::remote::Action::Upload {
            body: b"abc".to_vec(),
        };
        let meta = svc
            .invoke(&ResourceRef::object("photos", "cat.txt", None), &upload)
            .await
            .unwrap();
        assert_eq!(meta["size"], 3);

        let body = svc
            .download(&ResourceRef::object("photos", "cat.txt", Some("v2")))
            .await
            .unwrap();
        assert_eq!(body, b"meow");
    }
}

/// Test module for paged listing over HTTP
mod listing_tests {
    use super::*;

    /// Test the cursor is threaded through every page until it runs out
    #[tokio::test]
    async fn test_cursor_threads_across_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(api("topics")))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "topics": [{"topicArn": "A"}, {"topicArn": "B"}],
                "nextToken": "t1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(api("topics")))
            .and(query_param("cursor", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "topics": [{"topicArn": "C"}, {"topicArn": "D"}],
                "nextToken": "t2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(api("topics")))
            .and(query_param("cursor", "t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "topics": [{"topicArn": "E"}]
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let query = ListQuery::new(Collection::Topics).with_page_size(2);
        let items = PagedLister::new(&svc).collect_all(&query, None).await.unwrap();

        let arns: Vec<&str> = items.iter().filter_map(|t| t["topicArn"].as_str()).collect();
        assert_eq!(arns, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    /// Test a provider echoing the cursor back stops the listing
    #[tokio::test]
    async fn test_repeated_cursor_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(api("buckets")))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "buckets": [{"name": "a"}],
                "nextToken": "same"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(api("buckets")))
            .and(query_param("cursor", "same"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "buckets": [{"name": "b"}],
                "nextToken": "same"
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let query = ListQuery::new(Collection::Buckets);
        let err = PagedLister::new(&svc)
            .collect_all(&query, None)
            .await
            .expect_err("listing must not loop");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}

/// Test module for bulk requests over HTTP
mod batch_tests {
    use super::*;

    /// Test the quiet bulk response maps errors back onto the right items
    #[tokio::test]
    async fn test_quiet_delete_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(api("buckets/photos/batch")))
            .and(body_partial_json(json!({"quiet": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [
                    {"key": "b", "code": "AccessDenied", "message": "denied"},
                    {"key": "c", "code": "NoSuchKey", "message": "gone"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(&server);
        let request = BatchRequest::new(
            ResourceRef::bucket("photos"),
            vec![
                BatchItem::delete("a"),
                BatchItem::delete("b"),
                BatchItem::delete("c").with_version(Some("v1".to_string())),
            ],
        );
        let result = ChunkedBatch::new(&svc, PollPolicy::fixed(Duration::from_millis(1), 2))
            .submit(&request, NonZeroUsize::new(1000).unwrap())
            .await;

        assert_eq!(result.len(), 3);
        assert_eq!(result.applied(), 1);
        assert_eq!(result.skipped(), 1);
        let failed: Vec<usize> = result.failures().map(|(i, _)| i).collect();
        assert_eq!(failed, vec![1]);
    }
}

/// Test module for create-and-wait over HTTP
mod lifecycle_tests {
    use super::*;

    /// Test a missing table is created once and polled until active
    #[tokio::test]
    async fn test_create_then_poll_until_active() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(api("tables/products")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "__type": "com.amazonaws.dynamodb#ResourceNotFoundException"
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(api("tables/products")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "TableDescription": {"TableName": "products"},
                "status": "CREATING"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(api("tables/products")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Table": {"TableName": "products", "TableStatus": "ACTIVE"}
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let lifecycle = ResourceLifecycle::new(&svc, PollPolicy::fixed(Duration::from_millis(10), 3));
        let (table, created) = lifecycle
            .get_or_create(
                &ResourceRef::table("products"),
                Some(&json!({"KeySchema": []})),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(created);
        assert_eq!(table.state, ResourceState::Ready);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
