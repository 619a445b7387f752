//! Remote scroll source against a scripted transport

mod common;

use std::error::Error as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Scripted, main_response, rejected};
use http::Method;
use pretty_assertions::assert_eq;
use reflow_remote::{
    RemoteError, RemoteResponse, RemoteScrollSource, RemoteSearch, RemoteTransport, RequestContext,
    RetryCounter, TOO_LARGE_MESSAGE, TransportError,
};
use reflow_resilience::BackoffPolicy;
use semver::Version;
use serde_json::json;

const KEEP_ALIVE: Duration = Duration::from_secs(300);

fn first_page() -> Result<RemoteResponse, TransportError> {
    Ok(RemoteResponse::json(
        200,
        json!({
            "_scroll_id": "scroll-1",
            "timed_out": false,
            "hits": {"total": 3, "hits": [
                {"_index": "src", "_id": "1", "_source": {"n": 1}},
                {"_index": "src", "_id": "2", "_source": {"n": 2}}
            ]}
        })
        .to_string(),
    ))
}

fn last_page() -> Result<RemoteResponse, TransportError> {
    Ok(RemoteResponse::json(
        200,
        json!({
            "_scroll_id": "scroll-2",
            "hits": {"total": 3, "hits": [{"_index": "src", "_id": "3"}]}
        })
        .to_string(),
    ))
}

fn counter() -> (RetryCounter, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    (
        Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
        count,
    )
}

fn source(transport: &Arc<Scripted>, retries: u32, on_retry: RetryCounter) -> RemoteScrollSource {
    RemoteScrollSource::new(
        Arc::clone(transport) as Arc<dyn RemoteTransport>,
        RemoteSearch::new(vec!["src".into()], 2),
        BackoffPolicy::constant(Duration::from_millis(50), retries),
        KEEP_ALIVE,
        on_retry,
    )
}

#[tokio::test]
async fn start_probes_version_then_searches() {
    let transport = Arc::new(Scripted::new([main_response("5.0.0-alpha3"), first_page()]));
    let (on_retry, retries) = counter();
    let mut source = source(&transport, 3, on_retry);

    let page = source.start().await.unwrap();

    assert_eq!(source.remote_version(), Some(&Version::parse("5.0.0-alpha3").unwrap()));
    assert_eq!(page.scroll_id.as_deref(), Some("scroll-1"));
    assert_eq!(page.total_hits, 3);
    assert_eq!(page.hits.len(), 2);
    assert_eq!(retries.load(Ordering::SeqCst), 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/");
    assert_eq!(requests[1].path_and_query(), "/src/_search?scroll=300000ms");
}

#[tokio::test]
async fn known_version_skips_the_probe() {
    let transport = Arc::new(Scripted::new([first_page(), last_page()]));
    let (on_retry, _) = counter();
    let mut source = source(&transport, 0, on_retry).with_remote_version(Version::new(2, 3, 3));

    let first = source.start().await.unwrap();
    let next = source
        .continue_scroll(first.scroll_id.as_deref().unwrap(), KEEP_ALIVE)
        .await
        .unwrap();

    assert_eq!(next.hits[0].id, "3");
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].path, "/_search/scroll");
    assert_eq!(
        requests[1].body,
        Some(json!({"scroll": "300000ms", "scroll_id": "scroll-1"}))
    );
}

#[tokio::test(start_paused = true)]
async fn each_retry_is_counted_once() {
    let transport = Arc::new(Scripted::new([
        rejected(),
        rejected(),
        first_page(),
        rejected(),
        last_page(),
    ]));
    let (on_retry, retries) = counter();
    let mut source = source(&transport, 5, on_retry).with_remote_version(Version::new(5, 0, 0));

    source.start().await.unwrap();
    assert_eq!(retries.load(Ordering::SeqCst), 2);

    source.continue_scroll("scroll-1", KEEP_ALIVE).await.unwrap();
    assert_eq!(retries.load(Ordering::SeqCst), 3);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_the_rejection() {
    let transport = Arc::new(Scripted::new([rejected(), rejected(), rejected()]));
    let (on_retry, retries) = counter();
    let mut source = source(&transport, 2, on_retry).with_remote_version(Version::new(5, 0, 0));

    let err = source.start().await.unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn server_errors_fail_without_retry() {
    let transport = Arc::new(Scripted::new([
        Ok(RemoteResponse::json(500, r#"{"error":"boom"}"#)),
        first_page(),
    ]));
    let (on_retry, retries) = counter();
    let mut source = source(&transport, 5, on_retry).with_remote_version(Version::new(5, 0, 0));

    let err = source.start().await.unwrap_err();

    assert!(matches!(err, RemoteError::Status { status: 500, .. }));
    assert_eq!(retries.load(Ordering::SeqCst), 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn context_reaches_requests_and_retry_callback() {
    let transport = Arc::new(Scripted::new([rejected(), first_page()]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let on_retry: RetryCounter = {
        let seen = Arc::clone(&seen);
        Arc::new(move || {
            let context = RequestContext::current();
            seen.lock().unwrap().push(context);
        })
    };
    let mut source = source(&transport, 1, on_retry).with_remote_version(Version::new(5, 0, 0));
    let context = Arc::new(RequestContext::new().with_header("X-Opaque-Id", "reindex-7"));

    Arc::clone(&context)
        .scope(async { source.start().await.unwrap() })
        .await;

    assert_eq!(seen.lock().unwrap().as_slice(), &[Some(context)]);
    for request in transport.requests() {
        assert_eq!(request.headers.get("X-Opaque-Id").map(String::as_str), Some("reindex-7"));
    }
}

#[tokio::test]
async fn cleanup_runs_callback_even_when_close_fails() {
    let transport = Arc::new(Scripted::new([]).failing_close());
    let (on_retry, _) = counter();
    let source = source(&transport, 0, on_retry);
    let done = AtomicBool::new(false);

    source.cleanup(|| done.store(true, Ordering::SeqCst)).await;

    assert!(transport.was_closed());
    assert!(done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn clear_scroll_swallows_failures() {
    let transport = Arc::new(Scripted::new([Err(TransportError::Io("reset".into()))]));
    let (on_retry, _) = counter();
    let source = source(&transport, 0, on_retry);

    source.clear_scroll("scroll-1").await;

    let requests = transport.requests();
    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].body, Some(json!({"scroll_id": ["scroll-1"]})));
}

#[tokio::test]
async fn oversized_first_page_reports_the_size_bound() {
    let cause = TransportError::BodyTooLarge { limit: 512 };
    let transport = Arc::new(Scripted::new([Ok(RemoteResponse {
        status: 200,
        content_type: Some("application/json".into()),
        body: Err(cause.clone()),
    })]));
    let (on_retry, retries) = counter();
    let mut source = source(&transport, 3, on_retry).with_remote_version(Version::new(5, 0, 0));

    let err = source.start().await.unwrap_err();

    assert!(matches!(err, RemoteError::TooLarge { .. }));
    assert_eq!(err.to_string(), TOO_LARGE_MESSAGE);
    let wrapped = err.source().and_then(|s| s.downcast_ref::<TransportError>());
    assert_eq!(wrapped, Some(&cause));
    assert_eq!(retries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_scroll_page_reports_the_size_bound() {
    let cause = TransportError::BodyTooLarge { limit: 512 };
    let transport = Arc::new(Scripted::new([Err(cause.clone())]));
    let (on_retry, _) = counter();
    let source = source(&transport, 3, on_retry).with_remote_version(Version::new(5, 0, 0));

    let err = source.continue_scroll("scroll-1", KEEP_ALIVE).await.unwrap_err();

    assert_eq!(err.to_string(), TOO_LARGE_MESSAGE);
    let wrapped = err.source().and_then(|s| s.downcast_ref::<TransportError>());
    assert_eq!(wrapped, Some(&cause));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn unparseable_pages_are_incompatible() {
    let transport = Arc::new(Scripted::new([
        Ok(RemoteResponse::json(200, "<html>proxy error</html>")),
        Ok(RemoteResponse::json(200, r#"{"hits": "#)),
    ]));
    let (on_retry, _) = counter();
    let mut source = source(&transport, 3, on_retry).with_remote_version(Version::new(5, 0, 0));

    let first = source.start().await.unwrap_err();
    let next = source.continue_scroll("scroll-1", KEEP_ALIVE).await.unwrap_err();

    for err in [first, next] {
        assert!(matches!(err, RemoteError::Incompatible { .. }));
        assert!(err.to_string().contains("not a compatible server instance"));
        assert!(err.source().is_some_and(|s| s.is::<serde_json::Error>()));
    }
    assert_eq!(transport.calls(), 2);
}
