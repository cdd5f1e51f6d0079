//! Mock transport for testing. No real network calls.

use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::Url;
use std::sync::Mutex;

/// One item of a scripted response body.
#[derive(Debug, Clone)]
pub enum MockChunk {
    Data(Bytes),
    /// The read fails with a network error.
    Fault(String),
}

/// A scripted reply to one `open` call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Stream {
        status: u16,
        /// Final URL to report; defaults to the requested URL.
        url: Option<Url>,
        chunks: Vec<MockChunk>,
        /// Never end the stream after the last chunk.
        hang: bool,
    },
    /// The request itself fails.
    Fault(String),
    /// The request never completes.
    Pending,
}

impl MockResponse {
    /// A 200 response whose body is the given chunks, then end of stream.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::Stream {
            status: 200,
            url: None,
            chunks: chunks
                .into_iter()
                .map(|c| MockChunk::Data(Bytes::copy_from_slice(c.as_ref())))
                .collect(),
            hang: false,
        }
    }

    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self::Stream {
            status,
            url: None,
            chunks: Vec::new(),
            hang: false,
        }
    }

    /// Report `url` as the final (redirected) URL.
    pub fn redirected_to(mut self, target: Url) -> Self {
        if let Self::Stream { url, .. } = &mut self {
            *url = Some(target);
        }
        self
    }

    /// Append a read fault after the scripted chunks.
    pub fn then_fault(mut self, message: impl Into<String>) -> Self {
        if let Self::Stream { chunks, .. } = &mut self {
            chunks.push(MockChunk::Fault(message.into()));
        }
        self
    }

    /// Keep the stream open after the scripted chunks.
    pub fn then_hang(mut self) -> Self {
        if let Self::Stream { hang, .. } = &mut self {
            *hang = true;
        }
        self
    }
}

/// Mock transport for tests. Supply a sequence of responses; each `open`
/// consumes the next one. Requests are recorded for inspection.
pub struct MockTransport {
    responses: Mutex<Vec<MockResponse>>,
    requests: Mutex<Vec<OpenRequest>>,
}

impl MockTransport {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a single 200 response with the given body chunks.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::new(vec![MockResponse::chunks(chunks)])
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_response(&self) -> Option<MockResponse> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if responses.is_empty() {
            None
        } else {
            Some(responses.remove(0))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: &OpenRequest) -> Result<Response, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        match self.next_response() {
            None => Err(TransportError::Network("no more mock responses".into())),
            Some(MockResponse::Fault(message)) => Err(TransportError::Network(message)),
            Some(MockResponse::Pending) => {
                futures::future::pending::<()>().await;
                Err(TransportError::Cancelled)
            }
            Some(MockResponse::Stream {
                status,
                url,
                chunks,
                hang,
            }) => {
                let items = chunks.into_iter().map(|chunk| match chunk {
                    MockChunk::Data(bytes) => Ok(bytes),
                    MockChunk::Fault(message) => Err(TransportError::Network(message)),
                });
                let body = stream::iter(items);
                let body = if hang {
                    body.chain(stream::pending()).boxed()
                } else {
                    body.boxed()
                };
                Ok(Response {
                    status,
                    url: url.unwrap_or_else(|| request.url.clone()),
                    body,
                })
            }
        }
    }
}
