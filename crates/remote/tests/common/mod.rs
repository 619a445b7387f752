//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reflow_remote::{RemoteRequest, RemoteResponse, RemoteTransport, TransportError};

/// Answers requests from a script, recording every request it sees.
#[derive(Debug, Default)]
pub struct Scripted {
    responses: Mutex<VecDeque<Result<RemoteResponse, TransportError>>>,
    requests: Mutex<Vec<RemoteRequest>>,
    calls: AtomicUsize,
    fail_close: AtomicBool,
    closed: AtomicBool,
}

impl Scripted {
    pub fn new(responses: impl IntoIterator<Item = Result<RemoteResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn failing_close(self) -> Self {
        self.fail_close.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for Scripted {
    async fn perform(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Closed))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            Err(TransportError::Io("socket already gone".into()))
        } else {
            Ok(())
        }
    }
}

pub fn rejected() -> Result<RemoteResponse, TransportError> {
    Ok(RemoteResponse::json(429, r#"{"error":"too many requests"}"#))
}

pub fn main_response(version: &str) -> Result<RemoteResponse, TransportError> {
    Ok(RemoteResponse::json(
        200,
        format!(r#"{{"name":"node","version":{{"number":"{version}"}},"tagline":"You Know, for Search"}}"#),
    ))
}
