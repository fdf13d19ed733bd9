//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use simple_tracker::{EventRecord, StaticEnvironment, Transport};
use wiremock::{MockServer, Request};

/// Transport that records every post instead of sending it.
#[derive(Default)]
pub struct CaptureTransport {
    posts: Mutex<Vec<(String, EventRecord)>>,
}

impl Transport for CaptureTransport {
    fn post(&self, endpoint: &str, record: &EventRecord) {
        self.posts
            .lock()
            .unwrap()
            .push((endpoint.to_string(), record.clone()));
    }
}

impl CaptureTransport {
    /// Records posted so far, as JSON values.
    pub fn records(&self) -> Vec<Value> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| Value::Object(record.clone()))
            .collect()
    }

    /// Endpoints posted to so far.
    pub fn endpoints(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }
}

/// Environment with fixed facts, as a browser page would report them.
pub fn page_environment() -> Arc<StaticEnvironment> {
    Arc::new(
        StaticEnvironment::new("https://shop.example.com/checkout")
            .with_user_agent(Some("Mozilla/5.0 (test)".to_string()))
            .with_platform(Some("Linux x86_64".to_string())),
    )
}

/// Polls the mock server until it has seen `count` requests or a few
/// seconds have passed.
pub async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

/// In-memory log sink for asserting on emitted warnings.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber writing WARN and above into the returned buffer.
pub fn capture_warnings<F: FnOnce()>(f: F) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, f);
    buffer.contents()
}
