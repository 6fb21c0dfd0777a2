//! I/O traits and implementations for the TMS client
//!
//! This module provides trait abstractions for HTTP requests and for the
//! notification WebSocket. The traits enable mockall-based testing without
//! requiring actual network operations; the default implementations use
//! reqwest and tokio-tungstenite for production use.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Result, TmsError};

// ============================================================================
// HttpClient trait and implementations
// ============================================================================

/// HTTP method of a request descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
            Method::Patch => write!(f, "PATCH"),
        }
    }
}

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a request with a JSON body and explicit headers
    ///
    /// Headers are sent exactly as given; the resolver is responsible for
    /// merging in defaults. The timeout bounds this single attempt.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

/// Production HTTP client using reqwest
#[derive(Debug, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        debug!("{} {}", method, url);

        let mut builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
            Method::Patch => self.client.patch(url),
        };
        builder = builder.timeout(timeout);

        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TmsError::Http(format!("Invalid header name {:?}: {}", name, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| TmsError::Http(format!("Invalid header value for {}: {}", name, e)))?;
            let _ = header_map.insert(name, value);
        }
        builder = builder.headers(header_map);

        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(&body)?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TmsError::Timeout(format!("{} {} timed out", method, url))
            } else {
                TmsError::Http(format!("{} {} failed: {}", method, url, e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TmsError::Http(format!("Reading response body: {}", e)))?;

        debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Socket traits and implementations
// ============================================================================

/// Reader/writer pair for an established notification socket
pub struct SocketPair {
    /// Reader for inbound frames
    pub reader: Box<dyn FrameReader>,
    /// Writer for outbound frames
    pub writer: Box<dyn FrameWriter>,
}

impl std::fmt::Debug for SocketPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPair").finish_non_exhaustive()
    }
}

/// Trait for reading text frames from the notification socket
///
/// Returns `Ok(Some(frame))` for the next text frame, `Ok(None)` once the
/// peer closed the connection, or an error if the transport failed.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameReader: Send {
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// Trait for writing text frames to the notification socket
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FrameWriter: Send {
    async fn send_frame(&mut self, frame: &str) -> Result<()>;

    /// Shut the outbound half down
    async fn close(&mut self) -> Result<()>;
}

/// Trait for dialing the notification socket
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SocketFactory: Send + Sync {
    /// Attempt to connect to the given `ws://` or `wss://` URL
    async fn connect(&self, url: &str, timeout: Duration) -> Result<SocketPair>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of FrameReader
pub struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Transport-level ping/pong and binary frames are not part of
                // the notification protocol
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TmsError::Socket(e.to_string())),
            }
        }
    }
}

/// WebSocket implementation of FrameWriter
pub struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn send_frame(&mut self, frame: &str) -> Result<()> {
        self.sink
            .send(Message::text(frame))
            .await
            .map_err(|e| TmsError::SendError(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| TmsError::Socket(e.to_string()))
    }
}

/// WebSocket implementation of SocketFactory using tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WsSocketFactory;

impl WsSocketFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketFactory for WsSocketFactory {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<SocketPair> {
        debug!("Connecting to {} with timeout {:?}", url, timeout);

        let (stream, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TmsError::Timeout(format!("Connection to {} timed out", url)))?
                .map_err(|e| {
                    TmsError::ConnectionFailed(format!("Failed to connect to {}: {}", url, e))
                })?;

        debug!("WebSocket connection established to {}", url);

        let (sink, stream) = stream.split();

        Ok(SocketPair {
            reader: Box::new(WsFrameReader { stream }),
            writer: Box::new(WsFrameWriter { sink }),
        })
    }
}
