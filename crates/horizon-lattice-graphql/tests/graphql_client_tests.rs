//! Integration tests for the HTTP GraphQL client.

use std::time::Duration;

use http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest, NetworkError};

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn only_request(server: &MockServer) -> wiremock::Request {
    let mut requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    requests.remove(0)
}

fn header<'a>(request: &'a wiremock::Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_query_sends_json_body_and_headers() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"data": {"user": {"name": "Ada"}}})),
    )
    .await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .header("X-Api-Key", "key-1")
        .build()
        .unwrap();

    let request = GraphQLRequest::query("query($id: ID!) { user(id: $id) { name } }")
        .variable("id", "1")
        .header("X-Request-Id", "abc");
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.field::<Value>("user").unwrap(), json!({"name": "Ada"}));

    let received = only_request(&server).await;
    assert_eq!(header(&received, "content-type"), "application/json; charset=utf-8");
    assert_eq!(header(&received, "accept"), "application/json; charset=utf-8");
    assert_eq!(header(&received, "x-api-key"), "key-1");
    assert_eq!(header(&received, "x-request-id"), "abc");
    assert_eq!(
        received.body_json::<Value>().unwrap(),
        json!({"query": "query($id: ID!) { user(id: $id) { name } }", "variables": {"id": "1"}})
    );
}

#[tokio::test]
async fn test_run_decodes_data() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"data": {"items": [{"id": "a"}, {"id": "b"}]}})),
    )
    .await;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
    }

    #[derive(Debug, Deserialize)]
    struct Items {
        items: Vec<Item>,
    }

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let items: Items = client.query("{ items { id } }").await.unwrap();
    let ids: Vec<&str> = items.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);

    let again: Items = client
        .mutate_with_variables("mutation($x: Int) { items(x: $x) { id } }", json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(again.items.len(), 2);
}

#[tokio::test]
async fn test_run_accepts_null_data() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_json(json!({"data": null}))).await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let deleted: Option<Value> = client.mutate("mutation { deleteAll }").await.unwrap();
    assert_eq!(deleted, None);
}

#[tokio::test]
async fn test_first_graphql_error_is_returned() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "miscellaneous message"}, {"message": "second"}]
        })),
    )
    .await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let err = client
        .execute(GraphQLRequest::query("{ broken }"))
        .await
        .unwrap_err();

    match &err {
        NetworkError::Graph(error) => assert_eq!(error.message, "miscellaneous message"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.to_string(), "graphql: miscellaneous message");
}

#[tokio::test]
async fn test_graphql_errors_on_error_status() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({"errors": [{"message": "syntax error"}]})),
    )
    .await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let result = client.execute(GraphQLRequest::query("{")).await;
    assert!(matches!(result, Err(NetworkError::Graph(e)) if e.message == "syntax error"));
}

#[tokio::test]
async fn test_non_json_error_status() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(502).set_body_string("bad gateway")).await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let result = client.execute(GraphQLRequest::query("{ a }")).await;
    match result {
        Err(NetworkError::HttpStatus { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message.as_deref(), Some("bad gateway"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_ok_status() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let result = client.execute(GraphQLRequest::query("{ a }")).await;
    assert!(matches!(result, Err(NetworkError::Json(_))));
}

#[tokio::test]
async fn test_multipart_upload() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"data": {"upload": true}})),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "from disk").unwrap();

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .use_multipart_form()
        .build()
        .unwrap();
    let request = GraphQLRequest::mutation("mutation($a: Upload!, $b: Upload!) { upload(a: $a, b: $b) }")
        .file("variables.a", "raw.bin", b"raw bytes".to_vec(), None)
        .file_path("variables.b", &path, Some("text/plain"))
        .unwrap();

    client.execute(request).await.unwrap();

    let received = only_request(&server).await;
    assert!(header(&received, "content-type").starts_with("multipart/form-data; boundary="));
    assert_eq!(header(&received, "accept"), "application/json; charset=utf-8");

    let body = String::from_utf8_lossy(&received.body).to_string();
    let lower = body.to_lowercase();
    assert!(body.contains(r#"name="operations""#));
    assert!(body.contains(
        r#"{"query":"mutation($a: Upload!, $b: Upload!) { upload(a: $a, b: $b) }","variables":null}"#
    ));
    assert!(body.contains(r#"name="map""#));
    assert!(body.contains(r#"{"0":["variables.a"],"1":["variables.b"]}"#));
    assert!(body.contains(r#"name="0"; filename="raw.bin""#));
    assert!(body.contains(r#"name="1"; filename="notes.txt""#));
    assert!(lower.contains("content-type: application/octet-stream"));
    assert!(lower.contains("content-type: text/plain"));
    assert!(body.contains("raw bytes"));
    assert!(body.contains("from disk"));
}

#[tokio::test]
async fn test_multipart_without_files_has_no_map() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"data": {"ok": true}})),
    )
    .await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .use_multipart_form()
        .build()
        .unwrap();
    client.execute(GraphQLRequest::query("{ ok }")).await.unwrap();

    let received = only_request(&server).await;
    let body = String::from_utf8_lossy(&received.body).to_string();
    assert!(body.contains(r#"name="operations""#));
    assert!(!body.contains(r#"name="map""#));
}

#[tokio::test]
async fn test_files_require_multipart() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_json(json!({"data": {}}))).await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .build()
        .unwrap();
    let request = GraphQLRequest::mutation("mutation($f: Upload!) { upload(f: $f) }")
        .file("variables.f", "f.bin", vec![0u8; 4], None);

    let result = client.execute(request).await;
    assert!(matches!(result, Err(NetworkError::FilesRequireMultipart)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_header_builder_sees_operations() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_json(json!({"data": {"a": 1}}))).await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .close_connection()
        .header_builder(|operations| {
            let mut headers = HeaderMap::new();
            headers.insert("x-body-length", operations.len().into());
            headers
        })
        .build()
        .unwrap();
    client.execute(GraphQLRequest::query("{ a }")).await.unwrap();

    let received = only_request(&server).await;
    assert_eq!(
        header(&received, "x-body-length"),
        received.body.len().to_string()
    );
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"data": {}}))
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let client = GraphQLClient::new(format!("{}/graphql", server.uri()))
        .request_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let result = client.execute(GraphQLRequest::query("{ slow }")).await;
    assert!(matches!(result, Err(NetworkError::Timeout)));
}
