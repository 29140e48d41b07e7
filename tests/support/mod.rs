//! In-memory fakes shared by the test suites

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use umbrella_activity_downloader::downloader::{EngineConfig, QuotaGovernor};
use umbrella_activity_downloader::fetcher::pagination::WindowPaginator;
use umbrella_activity_downloader::fetcher::{
    ActivityApi, AuthError, BearerToken, PageQuery, PageResponse, RetryErrorType,
    TokenAuthority, TransportError,
};
use umbrella_activity_downloader::window::TimeWindow;

/// A page request as the fake API saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub window: TimeWindow,
    pub offset: usize,
    pub limit: usize,
    pub token: String,
}

type Responder = dyn Fn(&PageQuery, usize) -> Result<PageResponse, TransportError> + Send + Sync;

/// Activity API answering from a closure and recording every call
pub struct FakeApi {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeApi {
    /// Answer with `responder(query, call_index)`
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&PageQuery, usize) -> Result<PageResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answer with `script` in order, then with empty pages
    pub fn scripted(script: Vec<Result<PageResponse, TransportError>>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(script));
        Self::new(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page(0, 0)))
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn offsets(&self) -> Vec<usize> {
        self.calls().into_iter().map(|c| c.offset).collect()
    }
}

#[async_trait]
impl ActivityApi for FakeApi {
    async fn fetch_page(
        &self,
        query: &PageQuery,
        token: &BearerToken,
    ) -> Result<PageResponse, TransportError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                window: query.window,
                offset: query.offset,
                limit: query.limit,
                token: token.secret().expose_secret().to_string(),
            });
            calls.len() - 1
        };
        (self.responder)(query, index)
    }

    fn endpoint(&self) -> &str {
        "fake://activity"
    }
}

/// Token authority minting `token-1`, `token-2`, ... after `failures` failed attempts
pub struct FakeAuthority {
    failures: usize,
    attempts: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeAuthority {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        })
    }

    /// Every acquire call, failed or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Tokens handed out
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenAuthority for FakeAuthority {
    async fn acquire(&self) -> Result<BearerToken, AuthError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(AuthError::Network("token endpoint unreachable".to_string()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BearerToken::new(format!("token-{n}")))
    }
}

/// HTTP 200 page with `count` events whose ids start at `first_id`
pub fn page(count: usize, first_id: usize) -> PageResponse {
    let data: Vec<Value> = (first_id..first_id + count)
        .map(|id| json!({"id": id, "destination": format!("host-{id}.example.com")}))
        .collect();
    PageResponse::new(200, json!({ "data": data }).to_string())
}

/// Bare status response
pub fn status(code: u16) -> PageResponse {
    PageResponse::new(code, format!("{{\"message\":\"status {code}\"}}"))
}

/// Transient transport failure
pub fn timeout() -> TransportError {
    TransportError::new(RetryErrorType::NetworkTimeout, "operation timed out")
}

/// Ids of the events, in order
pub fn ids(events: &[umbrella_activity_downloader::ActivityEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| e.field("id").and_then(Value::as_u64))
        .collect()
}

/// Paginator over the fakes with the default engine configuration
pub fn paginator(
    api: Arc<FakeApi>,
    authority: Arc<FakeAuthority>,
    config: EngineConfig,
) -> WindowPaginator<Arc<FakeApi>, Arc<FakeAuthority>> {
    let governor = QuotaGovernor::new(config.quota_requests, config.quota_period);
    WindowPaginator::new(api, authority, governor, config)
}

pub fn initial_token() -> BearerToken {
    BearerToken::new("token-0")
}
