//! HTTP seam between the controller client and the network.
//!
//! [`Transport`] exposes the two request shapes the OctoPrint API needs.
//! Non-2xx statuses are returned as ordinary responses; interpreting them
//! is left to the caller. Only failures to complete the exchange at all
//! are errors.

use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;

/// Upper bound on response bodies (webcam snapshots included).
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Errors that prevent a request from completing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("request to {path} failed: {message}")]
    Request {
        /// Request path.
        path: String,
        /// Underlying failure.
        message: String,
    },

    /// The response body could not be read.
    #[error("failed to read response from {path}: {source}")]
    Body {
        /// Request path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The response body was not the expected JSON.
    #[error("unexpected response body from {path}: {source}")]
    Json {
        /// Request path.
        path: String,
        /// Decoding error.
        source: serde_json::Error,
    },
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Json`] if the body does not decode into
    /// `T`.
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|source| TransportError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

/// Blocking HTTP access to one server.
pub trait Transport {
    /// `GET` a path relative to the server root.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no response was received.
    fn get(&self, path: &str) -> Result<HttpResponse, TransportError>;

    /// `POST` a JSON body to a path relative to the server root.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no response was received.
    fn post_json(&self, path: &str, body: &serde_json::Value)
    -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        (**self).get(path)
    }

    fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        (**self).post_json(path, body)
    }
}

/// [`Transport`] over `ureq`, authenticating with an OctoPrint API key.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    /// Create a transport for the server at `base_url`.
    ///
    /// `timeout` bounds each whole request.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn finish(
        path: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<HttpResponse, TransportError> {
        let response = match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(TransportError::Request {
                    path: path.to_owned(),
                    message: transport.to_string(),
                });
            }
        };
        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|source| TransportError::Body {
                path: path.to_owned(),
                source,
            })?;
        tracing::trace!(path, status, bytes = body.len(), "response");
        Ok(HttpResponse { status, body })
    }
}

impl Transport for UreqTransport {
    fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        let result = self
            .agent
            .get(&self.url(path))
            .set("X-Api-Key", &self.api_key)
            .call();
        Self::finish(path, result)
    }

    fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        let result = self
            .agent
            .post(&self.url(path))
            .set("X-Api-Key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());
        Self::finish(path, result)
    }
}
