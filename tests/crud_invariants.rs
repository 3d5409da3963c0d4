//! Row Operation Invariant Tests
//!
//! Row operations against a mock backend:
//! - insert, select and delete observe each other's effects
//! - predicates are rendered into the query string in caller order
//! - invalid input is rejected before any request is sent
//! - transport and backend failures surface as classified errors

use std::time::{Duration, Instant};

use aerodb_client::observability::CallObserver;
use aerodb_client::{Client, ClientConfig, ErrorFamily, ErrorKind, Fields, Filter};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

// =============================================================================
// Helper Functions
// =============================================================================

fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::new(server.uri(), "anon-key")
        .with_log_dir(None)
        .with_console_log(false);
    Client::with_observer(config, CallObserver::disabled()).unwrap()
}

fn prefer_is(expected: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |req: &Request| {
        req.headers
            .get("prefer")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    }
}

fn pg_error(code: &str, message: &str) -> Value {
    json!({"code": code, "message": message, "details": null, "hint": null})
}

// =============================================================================
// Round Trip
// =============================================================================

/// Insert, read back, delete, read again.
#[tokio::test]
async fn test_insert_select_delete_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/widgets"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .and(prefer_is("return=representation"))
        .and(body_json(json!({"name": "sprocket", "qty": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1, "name": "sprocket", "qty": 3}])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("select", "*"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "sprocket", "qty": 3}])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("id", "eq.1"))
        .and(prefer_is("return=representation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let by_id = [Filter::eq("id", 1)];

    let inserted = client
        .insert("widgets", json!({"name": "sprocket", "qty": 3}), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inserted["id"], json!(1));

    let rows = client.select("widgets", &Fields::All, &by_id).await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("sprocket"));

    assert!(client.delete("widgets", &by_id).await.unwrap());

    let rows = client.select("widgets", &Fields::All, &by_id).await.unwrap().unwrap();
    assert!(rows.is_empty());
}

/// Upsert asks the backend to merge duplicates.
#[tokio::test]
async fn test_upsert_sets_merge_preference() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/widgets"))
        .and(prefer_is("return=representation,resolution=merge-duplicates"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1, "name": "gear"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let row = client
        .insert("widgets", json!({"id": 1, "name": "gear"}), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["name"], json!("gear"));
}

/// Field selection and multiple predicates reach the query string.
#[tokio::test]
async fn test_select_renders_fields_and_predicates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("select", "id,name"))
        .and(query_param("qty", "gt.5"))
        .and(query_param("name", "ilike.*gear*"))
        .and(query_param("tag", "in.(red,blue)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 2, "name": "Big Gear"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let filters = vec![
        Filter::gt("qty", 5),
        Filter::parse("name", "ilike", "*gear*").unwrap(),
        Filter::in_list("tag", vec![json!("red"), json!("blue")]),
    ];
    let rows = client
        .select("widgets", &Fields::columns(["id", "name"]), &filters)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows[0]["id"], json!(2));
}

/// Update sends only the changed columns, filtered.
#[tokio::test]
async fn test_update_patches_matching_rows() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("id", "eq.7"))
        .and(body_json(json!({"qty": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7, "qty": 0}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let row = client
        .update("widgets", json!({"qty": 0}), &[Filter::eq("id", 7)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["qty"], json!(0));
}

/// A delete that matched nothing reports false.
#[tokio::test]
async fn test_delete_without_matches_is_false() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(!client.delete("widgets", &[Filter::eq("id", 404)]).await.unwrap());
}

// =============================================================================
// Local Validation
// =============================================================================

/// Unencodable predicates and unfiltered writes never reach the backend.
#[tokio::test]
async fn test_invalid_input_sends_no_request() {
    let server = MockServer::start().await;

    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client
        .select("widgets", &Fields::All, &[Filter::parse("tag", "in", "red").unwrap()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.update("widgets", json!({"qty": 1}), &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.delete("widgets", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.insert("", json!({"a": 1}), false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(
        Filter::parse("id", "between", 1).unwrap_err().message(),
        "Unsupported operator: between"
    );
}

// =============================================================================
// Failure Classification
// =============================================================================

/// Unique violations are duplicates, with the backend code kept as cause.
#[tokio::test]
async fn test_unique_violation_is_duplicate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/widgets"))
        .respond_with(ResponseTemplate::new(409).set_body_json(pg_error(
            "23505",
            "duplicate key value violates unique constraint \"widgets_pkey\"",
        )))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .insert("widgets", json!({"id": 1}), false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(err.family(), ErrorFamily::Database);
    assert_eq!(err.code(), "AERO_CLIENT_DUPLICATE");
    assert_eq!(err.transport().and_then(|t| t.api_code()), Some("23505"));
    assert_eq!(err.transport().and_then(|t| t.status()), Some(409));
}

/// A single-row lookup that finds nothing is not-found.
#[tokio::test]
async fn test_select_one_no_rows_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .and(header("accept", "application/vnd.pgrst.object+json"))
        .respond_with(ResponseTemplate::new(406).set_body_json(pg_error(
            "PGRST116",
            "JSON object requested, multiple (or no) rows returned",
        )))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .select_one("widgets", &Fields::All, &[Filter::eq("id", 99)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.is_database());
}

/// A single-row lookup returns the object body.
#[tokio::test]
async fn test_select_one_returns_object() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .and(query_param("id", "eq.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3, "name": "cog"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let row = client
        .select_one("widgets", &Fields::All, &[Filter::eq("id", 3)])
        .await
        .unwrap();
    assert_eq!(row["name"], json!("cog"));
}

/// Unknown backend codes and server errors fall back to query errors.
#[tokio::test]
async fn test_unknown_backend_failure_is_query_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.select("widgets", &Fields::All, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Query);
    assert!(err.message().starts_with("Failed to select from table"));
    assert_eq!(err.transport().and_then(|t| t.status()), Some(500));
}

/// An unreachable backend is a query error with the transport failure as cause.
#[tokio::test]
async fn test_unreachable_backend_is_query_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(format!("http://{}", addr), "anon-key")
        .with_log_dir(None)
        .with_console_log(false);
    let client = Client::with_observer(config, CallObserver::disabled()).unwrap();

    let err = client.select("widgets", &Fields::All, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
    assert!(err.transport().is_some());
}

/// A backend slower than the configured timeout fails fast as a query error.
#[tokio::test]
async fn test_slow_backend_times_out_as_query_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig::new(server.uri(), "anon-key")
        .with_log_dir(None)
        .with_console_log(false)
        .with_timeout(Duration::from_secs(1));
    let client = Client::with_observer(config, CallObserver::disabled()).unwrap();

    let started = Instant::now();
    let err = client.select("widgets", &Fields::All, &[]).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(err.family(), ErrorFamily::Database);
    assert!(err.transport().unwrap().is_timeout());
}

/// A non-array body is reported as "no row list", not as empty.
#[tokio::test]
async fn test_select_non_array_body_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.select("widgets", &Fields::All, &[]).await.unwrap().is_none());
}
