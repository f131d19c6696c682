//! Reconciliation over HTTP against a mock Okapi gateway.

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use folio_client::{OkapiAuth, OkapiClient, RetryPolicy};
use folio_import::{
    CancelFlag, ImportConfig, ImportJob, InputRow, ProtectionSet, RecordStatus, ResourceProfile,
    SchemaRules,
};

fn client(server: &MockServer) -> Arc<OkapiClient> {
    let auth = OkapiAuth::new("diku", "test-token-123").unwrap();
    Arc::new(OkapiClient::with_http_client(server.uri(), auth, reqwest::Client::new()).unwrap())
}

fn job(server: &MockServer, protection: &str) -> ImportJob {
    let mut profile = ResourceProfile::users().with_rules(SchemaRules::passthrough());
    profile.sidecars.clear();
    profile.references.clear();
    let config = ImportConfig {
        protection: ProtectionSet::parse(protection),
        concurrency: 2,
        retry: RetryPolicy::new(2, 1),
        ..ImportConfig::for_profile(&profile)
    };
    ImportJob::new(client(server), profile, config, CancelFlag::new()).unwrap()
}

fn lookup(key: &str) -> String {
    format!(r#"externalSystemId=="{key}""#)
}

#[tokio::test]
async fn test_create_and_protected_update_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("x-okapi-tenant", "diku"))
        .and(query_param("query", lookup("E-1")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"users": [], "totalRecords": 0})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_partial_json(json!({"externalSystemId": "E-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "u-1",
            "externalSystemId": "E-1",
            "email": "new@x.org"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("query", lookup("E-2")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": "u-2", "externalSystemId": "E-2", "email": "old@x.org", "active": true}],
            "totalRecords": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/u-2"))
        .and(header("x-okapi-token", "test-token-123"))
        .and(body_partial_json(json!({
            "id": "u-2",
            "email": "old@x.org",
            "barcode": "B-2",
            "active": true
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let rows = vec![
        InputRow::new(2)
            .with("externalSystemId", "E-1")
            .with("email", "new@x.org"),
        InputRow::new(3)
            .with("externalSystemId", "E-2")
            .with("email", "changed@x.org")
            .with("barcode", "B-2"),
    ];
    let report = job(&server, "email").run(rows).await;

    assert_eq!((report.created, report.updated, report.failed), (1, 1, 0));
    assert_eq!(report.results[0].remote_id.as_deref(), Some("u-1"));
    assert_eq!(report.results[1].remote_id.as_deref(), Some("u-2"));
}

#[tokio::test]
async fn test_already_exists_on_create_retries_as_update() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("query", lookup("E-3")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"users": [], "totalRecords": 0})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("query", lookup("E-3")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": "u-3", "externalSystemId": "E-3"}],
            "totalRecords": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{"message": "User with this externalSystemId already exists"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/u-3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let rows = vec![InputRow::new(2).with("externalSystemId", "E-3")];
    let report = job(&server, "").run(rows).await;

    assert_eq!(report.results[0].status, RecordStatus::Updated);
    assert_eq!(report.results[0].remote_id.as_deref(), Some("u-3"));
}

#[tokio::test]
async fn test_rejected_update_fails_record_with_folio_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": "u-4", "externalSystemId": "E-4"}],
            "totalRecords": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/u-4"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Unrecognized field \"bogus\""))
        .expect(1)
        .mount(&server)
        .await;

    let rows = vec![InputRow::new(2)
        .with("externalSystemId", "E-4")
        .with("bogus", "x")];
    let report = job(&server, "").run(rows).await;

    assert_eq!(report.failed, 1);
    let failure = &report.results[0];
    assert_eq!(failure.error_kind.as_deref(), Some("fatal"));
    assert!(failure.message.as_deref().unwrap().contains("Unrecognized field"));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let rows = vec![InputRow::new(2).with("externalSystemId", "E-5")];
    let report = job(&server, "").run(rows).await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.results[0].error_kind.as_deref(), Some("transient"));
}
