//! `HttpTransport` against a mock HTTP server

use std::error::Error as _;

use http::Method;
use pretty_assertions::assert_eq;
use reflow_remote::{
    HttpTransport, HttpTransportConfig, RemoteError, RemoteRequest, RemoteTransport,
    TOO_LARGE_MESSAGE, TransportError, probe,
};
use semver::Version;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn probes_version_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "node-1",
            "version": {"number": "1.7.5", "lucene_version": "4.10.4"},
            "tagline": "You Know, for Search"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let version = probe(&transport(&server)).await.unwrap();

    assert_eq!(version, Version::new(1, 7, 5));
}

#[tokio::test]
async fn sends_query_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/src/_search"))
        .and(query_param("scroll", "60000ms"))
        .and(header("X-Opaque-Id", "reindex-1"))
        .and(body_json(json!({"size": 10})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = RemoteRequest::new(Method::POST, "/src/_search")
        .with_query("scroll", "60000ms")
        .with_body(json!({"size": 10}));
    request.headers.insert("X-Opaque-Id".into(), "reindex-1".into());

    let response = transport(&server).perform(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.content_type.unwrap().starts_with("application/json"));
}

#[tokio::test]
async fn oversized_body_is_reported_as_too_large() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;
    let mut config = HttpTransportConfig::new(server.uri());
    config.max_response_bytes = 1024;
    let transport = HttpTransport::new(config).unwrap();

    let err = probe(&transport).await.unwrap_err();

    assert!(matches!(err, RemoteError::TooLarge { .. }));
    assert_eq!(err.to_string(), TOO_LARGE_MESSAGE);
    let source = err.source().and_then(|s| s.downcast_ref::<TransportError>());
    assert_eq!(source, Some(&TransportError::BodyTooLarge { limit: 1024 }));
}

#[tokio::test]
async fn rejection_status_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = probe(&transport(&server)).await.unwrap_err();

    match err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "body=slow down");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn closed_transport_refuses_requests() {
    let server = MockServer::start().await;
    let transport = transport(&server);

    transport.close().await.unwrap();

    let err = transport
        .perform(RemoteRequest::new(Method::GET, "/"))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Closed);
    assert_eq!(transport.close().await, Err(TransportError::Closed));
}
