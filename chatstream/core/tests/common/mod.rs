//! Test backends shared by the integration tests

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;

use chatstream_core::{ByteStream, ChatBackend, ChatRequest, TransportError};

/// Replays a fixed list of chunks on every request
pub struct ScriptedBackend {
    chunks: Vec<Vec<u8>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let chunks: Vec<_> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Hands out a body fed by the test through a channel (one request only)
pub struct ChannelBackend {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>>>,
}

impl ChannelBackend {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl ChatBackend for ChannelBackend {
    fn name(&self) -> &str {
        "Channel"
    }

    async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("ChannelBackend serves a single request");
        Ok(rx.boxed())
    }
}

/// Fails every request before any body is read
pub struct RefusingBackend;

#[async_trait]
impl ChatBackend for RefusingBackend {
    fn name(&self) -> &str {
        "Refusing"
    }

    async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
        Err(TransportError::Connect {
            url: "http://localhost:1/api/chat/stream".to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// Accepts every request and never answers it
pub struct StallingBackend;

#[async_trait]
impl ChatBackend for StallingBackend {
    fn name(&self) -> &str {
        "Stalling"
    }

    async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
        futures::future::pending().await
    }
}

/// Encode a chunk record line
pub fn chunk_line(text: &str) -> String {
    format!("data: {}\n", serde_json::json!({ "chunk": text }))
}
